// Short-lived cache of upstream responses for idempotent requests. Staleness up
// to the TTL is accepted; entries are never invalidated explicitly.
use crate::config::CacheConfig;
use crate::metrics_defs::{CACHE_HIT, CACHE_MISS};
use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode, Version};
use moka::sync::Cache;
use shared::counter;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

#[derive(Clone, Debug)]
pub struct CachedResponse {
    pub status: StatusCode,
    pub version: Version,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub struct ResponseCache {
    cache: Option<Cache<String, Arc<CachedResponse>>>,
}

impl ResponseCache {
    pub fn new(config: &CacheConfig) -> Self {
        let cache = config.enabled.then(|| {
            Cache::builder()
                .max_capacity(config.max_entries)
                .time_to_live(Duration::from_secs(config.ttl_secs))
                .build()
        });

        ResponseCache { cache }
    }

    /// Cache key for a request, or None if the request must not be cached.
    pub fn key(&self, method: &Method, url: &Url) -> Option<String> {
        if self.cache.is_none() || method != Method::GET {
            return None;
        }
        Some(format!("{method} {url}"))
    }

    pub fn get(&self, key: &str, tenant_id: &str) -> Option<Arc<CachedResponse>> {
        let cache = self.cache.as_ref()?;

        let cached = cache.get(key);
        let metric_def = if cached.is_some() {
            CACHE_HIT
        } else {
            CACHE_MISS
        };
        counter!(metric_def, "tenant" => tenant_id.to_string()).increment(1);
        cached
    }

    /// Stores successful responses only.
    pub fn insert(&self, key: String, response: CachedResponse) {
        if let Some(cache) = &self.cache
            && response.status.is_success()
        {
            cache.insert(key, Arc::new(response));
        }
    }
}
