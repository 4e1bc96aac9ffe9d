//! Tenants are the universities the viewer can talk to. Each one is reached
//! through the gateway under `/proxy/{id}/` and backed by its own upstream API.

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_TENANT_ID: &str = "nuzp";

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Tenant {
    /// Short identifier used in gateway paths (e.g. "nuzp")
    pub id: String,
    /// Base URL of the university API
    pub upstream_url: Url,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl Tenant {
    fn builtin(
        id: &str,
        upstream_url: &str,
        display_name: &str,
        description: &str,
    ) -> Option<Self> {
        Some(Tenant {
            id: id.to_string(),
            upstream_url: Url::parse(upstream_url).ok()?,
            display_name: display_name.to_string(),
            description: Some(description.to_string()),
        })
    }
}

/// Catalog used when the configuration does not list any tenants.
pub fn builtin_tenants() -> Vec<Tenant> {
    [
        Tenant::builtin(
            "nuzp",
            "https://api.zp.edu.ua",
            "НУ \"Запорізька політехніка\"",
            "Національний університет «Запорізька політехніка»",
        ),
        Tenant::builtin(
            "knu",
            "https://api.knu.ua",
            "КНУ ім. Тараса Шевченка",
            "Київський національний університет імені Тараса Шевченка",
        ),
        Tenant::builtin(
            "lpnu",
            "https://api.lpnu.ua",
            "НУ \"Львівська політехніка\"",
            "Національний університет «Львівська політехніка»",
        ),
    ]
    .into_iter()
    .flatten()
    .collect()
}

pub fn find<'a>(tenants: &'a [Tenant], id: &str) -> Option<&'a Tenant> {
    tenants.iter().find(|t| t.id == id)
}
