use crate::cache::{CachedResponse, ResponseCache};
use crate::config::Config;
use crate::directory::UpstreamDirectory;
use crate::errors::GatewayError;
use crate::headers::{
    CacheStatus, PROXY_ERROR, add_gateway_headers, prepare_request_headers,
    prepare_response_headers,
};
use crate::metrics_defs::{REQUEST_DURATION, REQUESTS_INFLIGHT, UNKNOWN_TENANT, UPSTREAM_ERRORS};
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue, Method, Uri, Version};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Incoming};
use hyper::service::Service as HyperService;
use hyper::{Request, Response, StatusCode};
use shared::http::make_json_error_response;
use shared::{counter, gauge, histogram};
use std::fmt::Display;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

const ROUTE_PREFIX: &str = "/proxy/";

/// Metric tag for tenant ids that are not in the directory.
const UNKNOWN_TENANT_TAG: &str = "unknown";

/// A request addressed to `/proxy/{tenant_id}/{*path}`.
#[derive(Debug, PartialEq)]
struct ProxyRoute {
    tenant_id: String,
    path: String,
    query: Option<String>,
}

impl ProxyRoute {
    fn parse(uri: &Uri) -> Option<Self> {
        let rest = uri.path().strip_prefix(ROUTE_PREFIX)?;
        let (tenant_id, path) = rest.split_once('/').unwrap_or((rest, ""));
        if tenant_id.is_empty() {
            return None;
        }

        Some(ProxyRoute {
            tenant_id: tenant_id.to_string(),
            path: path.to_string(),
            query: uri.query().map(String::from),
        })
    }
}

pub struct ProxyService {
    inner: Arc<ProxyInner>,
}

struct ProxyInner {
    directory: UpstreamDirectory,
    client: reqwest::Client,
    cache: ResponseCache,
}

impl ProxyService {
    pub fn try_new(directory: UpstreamDirectory, config: &Config) -> Result<Self, GatewayError> {
        // Redirects are relayed to the caller rather than followed
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .redirect(reqwest::redirect::Policy::none())
            .build()?;

        Ok(Self {
            inner: Arc::new(ProxyInner {
                directory,
                client,
                cache: ResponseCache::new(&config.cache),
            }),
        })
    }
}

impl HyperService<Request<Incoming>> for ProxyService {
    type Response = Response<BoxBody<Bytes, GatewayError>>;
    type Error = GatewayError;
    type Future =
        Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

    fn call(&self, req: Request<Incoming>) -> Self::Future {
        let inner = self.inner.clone();

        Box::pin(async move {
            let response = inner.handle(req).await;
            Ok(response.map(|body| Full::new(body).map_err(|e| match e {}).boxed()))
        })
    }
}

impl ProxyInner {
    async fn handle<B>(&self, request: Request<B>) -> Response<Bytes>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        let Some(route) = ProxyRoute::parse(request.uri()) else {
            let error = GatewayError::NoRoute(request.uri().path().to_string());
            tracing::debug!(error = %error, "Rejected request");
            return error_response(&error);
        };

        let started = Instant::now();
        gauge!(REQUESTS_INFLIGHT).increment(1);

        let response = match self.forward(&route, request).await {
            Ok(response) => response,
            Err(error) => {
                if error.status_code().is_server_error() {
                    counter!(UPSTREAM_ERRORS, "tenant" => route.tenant_id.clone()).increment(1);
                    tracing::error!(tenant = %route.tenant_id, error = %error, "Proxy error");
                } else {
                    tracing::warn!(tenant = %route.tenant_id, error = %error, "Rejected request");
                }
                error_response(&error)
            }
        };

        gauge!(REQUESTS_INFLIGHT).decrement(1);
        histogram!(
            REQUEST_DURATION,
            "status" => response.status().as_str().to_string(),
            "tenant" => self.tenant_tag(&route.tenant_id),
        )
        .record(started.elapsed().as_secs_f64());

        response
    }

    // Tags come from the directory so callers cannot mint new series
    fn tenant_tag(&self, tenant_id: &str) -> String {
        match self.directory.resolve(tenant_id) {
            Ok(upstream) => upstream.tenant_id.clone(),
            Err(_) => UNKNOWN_TENANT_TAG.to_string(),
        }
    }

    async fn forward<B>(
        &self,
        route: &ProxyRoute,
        request: Request<B>,
    ) -> Result<Response<Bytes>, GatewayError>
    where
        B: Body<Data = Bytes>,
        B::Error: Display,
    {
        // Resolution happens before anything is read or sent
        let upstream = self.directory.resolve(&route.tenant_id).inspect_err(|_| {
            counter!(UNKNOWN_TENANT).increment(1);
        })?;
        let url = upstream.target_url(&route.path, route.query.as_deref())?;

        let (mut parts, body) = request.into_parts();
        let body = read_body(&parts.method, &parts.headers, body).await?;

        let cache_key = self.cache.key(&parts.method, &url);
        if let Some(key) = &cache_key
            && let Some(cached) = self.cache.get(key, &route.tenant_id)
        {
            tracing::debug!(tenant = %route.tenant_id, url = %url, "Serving cached response");
            return Ok(relay(
                cached.status,
                cached.version,
                cached.headers.clone(),
                cached.body.clone(),
                CacheStatus::Hit,
            ));
        }

        let upstream_id = url.host_str().unwrap_or(url.as_str()).to_string();
        prepare_request_headers(&mut parts.headers, parts.version);

        let mut upstream_request = self
            .client
            .request(parts.method, url)
            .headers(parts.headers);
        if let Some(body) = body {
            upstream_request = upstream_request.body(body);
        }

        let response = upstream_request
            .send()
            .await
            .map_err(|e| upstream_error(&upstream_id, e))?;

        let status = response.status();
        let version = response.version();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                GatewayError::UpstreamTimeout(upstream_id.clone())
            } else {
                GatewayError::ResponseBody(upstream_id.clone(), e.to_string())
            }
        })?;

        if let Some(key) = cache_key {
            self.cache.insert(
                key,
                CachedResponse {
                    status,
                    version,
                    headers: headers.clone(),
                    body: body.clone(),
                },
            );
        }

        Ok(relay(status, version, headers, body, CacheStatus::Miss))
    }
}

/// Reads the body of methods that carry one. JSON bodies are decoded and
/// re-encoded; anything else is forwarded as opaque bytes.
async fn read_body<B>(
    method: &Method,
    headers: &HeaderMap,
    body: B,
) -> Result<Option<Bytes>, GatewayError>
where
    B: Body<Data = Bytes>,
    B::Error: Display,
{
    if !matches!(*method, Method::POST | Method::PUT | Method::PATCH) {
        return Ok(None);
    }

    let bytes = body
        .collect()
        .await
        .map_err(|e| GatewayError::RequestBody(e.to_string()))?
        .to_bytes();

    if bytes.is_empty() || !is_json(headers) {
        return Ok(Some(bytes));
    }

    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| GatewayError::InvalidJsonBody(e.to_string()))?;
    let normalized =
        serde_json::to_vec(&value).map_err(|e| GatewayError::InvalidJsonBody(e.to_string()))?;

    Ok(Some(Bytes::from(normalized)))
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"))
}

fn upstream_error(upstream_id: &str, error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::UpstreamTimeout(upstream_id.to_string())
    } else {
        GatewayError::UpstreamRequestFailed(upstream_id.to_string(), error.to_string())
    }
}

fn relay(
    status: StatusCode,
    version: Version,
    mut headers: HeaderMap,
    body: Bytes,
    cache_status: CacheStatus,
) -> Response<Bytes> {
    prepare_response_headers(&mut headers, version);
    add_gateway_headers(&mut headers, cache_status);

    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn error_response(error: &GatewayError) -> Response<Bytes> {
    let mut response = make_json_error_response(error.status_code(), &error.to_string());
    let headers = response.headers_mut();
    add_gateway_headers(headers, CacheStatus::Miss);
    headers.insert(PROXY_ERROR, HeaderValue::from_static(error.kind()));
    response
}
