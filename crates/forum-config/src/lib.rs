//! # forum-config
//!
//! Layered settings: built-in defaults, then an optional `config/forum.*`
//! file, then `FORUM_*` environment variables (`__` separates sections,
//! e.g. `FORUM_SERVER__PORT=9000`).

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use forum_core::models::OrphanPolicy;
use secrecy::SecretString;
use serde::Deserialize;

const CONFIG_FILE: &str = "config/forum";
const ENV_PREFIX: &str = "FORUM";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub session: SessionConfig,
    pub threads: ThreadsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    /// May carry credentials for non-file stores; never printed.
    pub url: SecretString,
    pub max_connections: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub ttl_hours: i64,
    pub cookie_name: String,
    pub cookie_secure: bool,
    /// 0 disables the background sweep; expiry is still enforced on read.
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ThreadsConfig {
    pub orphan_policy: OrphanPolicy,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env first so its values are visible to the environment source
        dotenvy::dotenv().ok();

        let builder = defaults()?
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(environment());
        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self, ConfigError> {
        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Invalid("server.port must be non-zero".into()));
        }
        if self.session.ttl_hours <= 0 {
            return Err(ConfigError::Invalid("session.ttl_hours must be positive".into()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "database.max_connections must be positive".into(),
            ));
        }
        if self.session.cookie_name.trim().is_empty() {
            return Err(ConfigError::Invalid("session.cookie_name must not be empty".into()));
        }
        Ok(())
    }

    pub fn bind_addr(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(Config::builder()
        .set_default("server.host", "127.0.0.1")?
        .set_default("server.port", 8080)?
        .set_default("database.url", "sqlite://forum.db")?
        .set_default("database.max_connections", 5)?
        .set_default("session.ttl_hours", 24)?
        .set_default("session.cookie_name", "session")?
        .set_default("session.cookie_secure", false)?
        .set_default("session.sweep_interval_secs", 0)?
        .set_default("threads.orphan_policy", "drop")?
        .set_default("log.filter", "info")?
        .set_default("log.format", "pretty")?)
}

fn environment() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
