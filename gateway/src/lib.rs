//! Multi-tenant proxy gateway. Requests to `/proxy/{tenant_id}/{*path}` are
//! forwarded to the tenant's upstream schedule API and relayed back with
//! CORS and cache headers added.
mod cache;
pub mod config;
pub mod directory;
pub mod errors;
mod headers;
pub mod metrics_defs;
mod proxy_service;

use config::Config;
use directory::UpstreamDirectory;
use errors::GatewayError;
use proxy_service::ProxyService;
use shared::admin_service::AdminService;
use shared::http::run_http_service;
use shared::tenant::Tenant;

pub async fn run(config: Config, tenants: Vec<Tenant>) -> Result<(), GatewayError> {
    config.validate()?;

    let tenant_count = tenants.len();
    let directory = UpstreamDirectory::try_new(tenants)?;
    tracing::info!(tenants = tenant_count, "Loaded upstream directory");

    let proxy_service = ProxyService::try_new(directory, &config)?;
    let proxy_task = run_http_service(
        &config.listener.host,
        config.listener.port,
        proxy_service,
    );

    let admin_service: AdminService<_, GatewayError> = AdminService::new(|| true);
    let admin_task = run_http_service(
        &config.admin_listener.host,
        config.admin_listener.port,
        admin_service,
    );

    tokio::try_join!(proxy_task, admin_task)?;
    Ok(())
}
