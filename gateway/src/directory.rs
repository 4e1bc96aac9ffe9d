//! Upstream Directory
//!
//! Maps tenant ids to the upstream API that serves them:
//!
//! ```text
//! "nuzp" → Upstream { base_url: "https://api.zp.edu.ua" }
//! "knu"  → Upstream { base_url: "https://api.knu.ua" }
//! ```
//!
//! The directory is built once at startup from configuration and remains
//! immutable during request processing. A tenant that is not in the directory
//! is never routed anywhere else.

use indexmap::IndexMap;
use shared::tenant::Tenant;
use url::Url;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum DirectoryError {
    #[error("tenant '{0}' is not supported")]
    NotFound(String),

    #[error("duplicate tenant id: {0}")]
    DuplicateTenant(String),

    #[error("empty tenant id")]
    EmptyTenantId,

    #[error("upstream for tenant '{0}' must be an absolute http(s) URL")]
    InvalidUpstreamUrl(String),

    #[error("path '{0}' leaves the upstream base path")]
    PathTraversal(String),

    #[error("could not build upstream URL: {0}")]
    InvalidTargetUrl(#[from] url::ParseError),
}

#[derive(Clone, Debug)]
pub struct Upstream {
    pub tenant_id: String,
    pub display_name: String,
    pub base_url: Url,
}

impl Upstream {
    /// Builds `{base_url}/{path}` with exactly one slash between the two parts,
    /// appending the query string verbatim. Paths with `.` or `..` segments are
    /// refused, since URL parsing would resolve them against the base path.
    pub fn target_url(&self, path: &str, query: Option<&str>) -> Result<Url, DirectoryError> {
        if path.split(['/', '\\']).any(is_dot_segment) {
            return Err(DirectoryError::PathTraversal(path.to_string()));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');

        let mut target = format!("{base}/{path}");
        if let Some(query) = query.filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }

        Ok(Url::parse(&target)?)
    }
}

// Parsers treat "%2e" like "." when resolving segments
fn is_dot_segment(segment: &str) -> bool {
    let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
    decoded == "." || decoded == ".."
}

impl TryFrom<Tenant> for Upstream {
    type Error = DirectoryError;

    fn try_from(tenant: Tenant) -> Result<Self, Self::Error> {
        if tenant.id.is_empty() {
            return Err(DirectoryError::EmptyTenantId);
        }

        let url = tenant.upstream_url;
        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(DirectoryError::InvalidUpstreamUrl(tenant.id));
        }

        Ok(Upstream {
            tenant_id: tenant.id,
            display_name: tenant.display_name,
            base_url: url,
        })
    }
}

pub struct UpstreamDirectory {
    // Preserves configuration order
    upstreams: IndexMap<String, Upstream>,
}

impl UpstreamDirectory {
    pub fn try_new(tenants: Vec<Tenant>) -> Result<Self, DirectoryError> {
        let mut upstreams = IndexMap::with_capacity(tenants.len());

        for tenant in tenants {
            let upstream = Upstream::try_from(tenant)?;
            if upstreams.contains_key(&upstream.tenant_id) {
                return Err(DirectoryError::DuplicateTenant(upstream.tenant_id));
            }
            upstreams.insert(upstream.tenant_id.clone(), upstream);
        }

        Ok(UpstreamDirectory { upstreams })
    }

    pub fn resolve(&self, tenant_id: &str) -> Result<&Upstream, DirectoryError> {
        self.upstreams
            .get(tenant_id)
            .ok_or_else(|| DirectoryError::NotFound(tenant_id.to_string()))
    }

}
