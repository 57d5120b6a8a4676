use thiserror::Error;

use super::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database.url cannot be empty".to_string(),
            ));
        }

        if self.database.connection_timeout_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "database.connection_timeout_secs must be at least 1".to_string(),
            ));
        }

        if self.database.max_connections == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "database.max_connections must be at least 1".to_string(),
            ));
        }

        if let (Some(min), Some(max)) = (self.database.min_connections, self.database.max_connections) {
            if min > max {
                return Err(ConfigError::InvalidConfig(format!(
                    "database.min_connections ({min}) exceeds database.max_connections ({max})"
                )));
            }
        }

        match self.logging.format.as_str() {
            "pretty" | "json" => Ok(()),
            other => Err(ConfigError::InvalidConfig(format!(
                "logging.format must be pretty or json, got {other}"
            ))),
        }
    }
}
