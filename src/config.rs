use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::AzureSqlError;

pub const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
pub const DEFAULT_RESOURCE_MANAGER: &str = "https://management.azure.com";
pub const SQL_API_VERSION: &str = "2021-11-01";
pub const SQL_SERVER_DOMAIN_SUFFIX: &str = "database.windows.net";
pub const SQL_SERVER_PORT: u16 = 1433;
pub const CONFIG_FILE: &str = "azure_sql.toml";
pub const ENV_PREFIX: &str = "AZURE_SQL_";

/// Layered configuration: defaults, then `azure_sql.toml`, then `AZURE_SQL_*` env vars.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub target: TargetConfig,
    #[serde(default)]
    pub cloud: CloudConfig,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
}

/// Service principal used against Azure AD and the management API.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
    pub client_id: String,
    pub client_secret: String,
    pub subscription_id: String,
    pub tenant_id: String,
}

/// SQL login used in the ODBC connection string.
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub driver: Option<String>,
}

/// Selectors pre-set on the client at start-up.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub resource_group_name: Option<String>,
    #[serde(default)]
    pub database_name: Option<String>,
}

/// Endpoints of the Azure cloud in use. Public cloud by default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudConfig {
    #[serde(default = "default_authority_host")]
    pub authority_host: String,
    #[serde(default = "default_resource_manager")]
    pub resource_manager: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: IdentityConfig::default(),
            database: DatabaseConfig::default(),
            target: TargetConfig::default(),
            cloud: CloudConfig::default(),
            loglevel: default_loglevel(),
        }
    }
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            authority_host: default_authority_host(),
            resource_manager: default_resource_manager(),
            api_version: default_api_version(),
        }
    }
}

fn default_authority_host() -> String {
    DEFAULT_AUTHORITY_HOST.to_string()
}

fn default_resource_manager() -> String {
    DEFAULT_RESOURCE_MANAGER.to_string()
}

fn default_api_version() -> String {
    SQL_API_VERSION.to_string()
}

fn default_loglevel() -> String {
    "info".to_string()
}

impl Config {
    /// Load from `azure_sql.toml` in the working directory and the environment.
    pub fn load() -> Result<Self, AzureSqlError> {
        Self::load_from(CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, AzureSqlError> {
        let cfg = Self::figment(path).extract()?;
        Ok(cfg)
    }

    pub fn figment(path: impl AsRef<Path>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

impl fmt::Debug for IdentityConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityConfig")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("subscription_id", &self.subscription_id)
            .field("tenant_id", &self.tenant_id)
            .finish()
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("driver", &self.driver)
            .finish()
    }
}
