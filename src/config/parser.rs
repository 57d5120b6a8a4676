use super::ConfigError;
use crate::db::Dialect;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Driver-prefixed url, e.g. `postgres://...`, `sqlite3://lcp.sqlite`.
    pub url: String,
    #[serde(default)]
    pub max_connections: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
    #[serde(default = "default_connection_timeout_secs")]
    pub connection_timeout_secs: u64,
}

impl DatabaseConfig {
    pub fn dialect(&self) -> Dialect {
        Dialect::from_driver_name(&self.url)
    }

    pub fn connection_string(&self) -> String {
        self.url.trim().to_string()
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let Dialect::Sqlite = self.dialect() {
            let url = self.connection_string();
            let path = url
                .strip_prefix("sqlite3://")
                .or_else(|| url.strip_prefix("sqlite://"))
                .unwrap_or(&url);
            Some(path.to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> u32 {
        self.max_connections.unwrap_or(match self.dialect() {
            Dialect::Sqlite => 4,
            Dialect::Postgres | Dialect::Mysql => 10,
        })
    }

    pub fn min_connections(&self) -> u32 {
        self.min_connections.unwrap_or(1).min(self.max_connections())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(alias = "console", default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("LCP_DATABASE_URL") {
            self.database.url = value;
        }
    }
}

fn default_connection_timeout_secs() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}
