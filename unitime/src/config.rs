use gateway::config::Config as GatewayConfig;
use serde::Deserialize;
use shared::tenant::{DEFAULT_TENANT_ID, Tenant, builtin_tenants};
use std::fs::File;
use std::path::{Path, PathBuf};
use url::Url;

#[derive(Debug, Deserialize)]
pub struct MetricsConfig {
    pub statsd_host: String,
    pub statsd_port: u16,
}

#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    pub sentry_dsn: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CommonConfig {
    pub metrics: Option<MetricsConfig>,
    pub logging: Option<LoggingConfig>,
}

/// Settings for the client commands.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    pub gateway_url: String,
    /// Where the persisted client state is kept
    pub state_path: PathBuf,
    /// Tenant used until the user picks one
    pub default_tenant: String,
    pub max_range_days: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            gateway_url: "http://127.0.0.1:3000".to_string(),
            state_path: PathBuf::from("unitime-state.json"),
            default_tenant: DEFAULT_TENANT_ID.to_string(),
            max_range_days: schedule::timetable::MAX_RANGE_DAYS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(flatten)]
    pub common: CommonConfig,
    #[serde(default = "builtin_tenants")]
    pub tenants: Vec<Tenant>,
    pub gateway: Option<GatewayConfig>,
    #[serde(default)]
    pub client: ClientConfig,
}

impl ClientConfig {
    pub fn gateway_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.gateway_url)
            .map_err(|e| ConfigError::InvalidGatewayUrl(self.gateway_url.clone(), e))
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            common: CommonConfig::default(),
            tenants: builtin_tenants(),
            gateway: None,
            client: ClientConfig::default(),
        }
    }
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        let config: Config = serde_yaml::from_reader(file)?;
        config.validate()?;

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.tenants.iter().any(|t| t.id == self.client.default_tenant) {
            return Err(ConfigError::UnknownDefaultTenant(
                self.client.default_tenant.clone(),
            ));
        }
        self.client.gateway_url()?;
        if self.client.max_range_days == 0 {
            return Err(ConfigError::InvalidMaxRange);
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("could not load config from file: {0}")]
    LoadError(#[from] std::io::Error),
    #[error("could not parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),
    #[error("default tenant '{0}' is not configured")]
    UnknownDefaultTenant(String),
    #[error("invalid gateway URL '{0}': {1}")]
    InvalidGatewayUrl(String, url::ParseError),
    #[error("max_range_days cannot be 0")]
    InvalidMaxRange,
}
