use crate::constants;
use crate::error::{ApiError, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub chat: ChatConfig,
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: "data/sale.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub group: String,
    /// Messages buffered per group before slow members start skipping.
    pub capacity: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            group: constants::CHAT_GROUP.to_string(),
            capacity: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: String,
    pub file_name: String,
    pub filter: String,
    pub json_file: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            file_name: "sale_backend.log".to_string(),
            filter: "sale_backend=info".to_string(),
            json_file: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 9898,
        }
    }
}

impl Config {
    /// Load `path` if it exists (defaults otherwise), then apply environment overrides.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let content = fs::read_to_string(path).map_err(|e| {
                ApiError::Config(format!(
                    "Failed to read config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
            Self::from_toml(&content)?
        } else {
            Self::default()
        };
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(host) = env::var("SALE_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = env::var("SALE_PORT") {
            self.server.port = parse_port("SALE_PORT", &port)?;
        }
        if let Ok(path) = env::var("SALE_DATABASE_PATH") {
            self.database.path = path;
        }
        if let Ok(port) = env::var("SALE_METRICS_PORT") {
            self.metrics.port = parse_port("SALE_METRICS_PORT", &port)?;
            self.metrics.enabled = true;
        }
        Ok(())
    }
}

fn parse_port(name: &str, value: &str) -> Result<u16> {
    value
        .trim()
        .parse()
        .map_err(|_| ApiError::Config(format!("{name} must be a port number, got '{value}'")))
}
