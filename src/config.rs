//! Application configuration

use std::net::SocketAddr;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::AisLiveError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub feed: FeedConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct FeedConfig {
    pub url: String,
    pub api_key: String,
    /// Areas of interest as `[[lat, lon], [lat, lon]]`, latitude first
    #[serde(default = "default_bounding_boxes")]
    pub bounding_boxes: Vec<[[f64; 2]; 2]>,
    #[serde(default = "default_message_types")]
    pub message_types: Vec<String>,
    /// Maximum wait for the peer to acknowledge a close
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    #[serde(default = "default_timeout")]
    pub close_timeout: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub path: String,
    #[serde_as(as = "serde_with::DurationMilliSeconds<u64>")]
    pub tick_interval: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub recency_window: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub query_timeout: Duration,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL URL; positions are kept in memory when unset
    pub url: Option<String>,
    pub max_connections: u32,
}

fn default_bounding_boxes() -> Vec<[[f64; 2]; 2]> {
    // New York to Boston
    vec![[[40.0, -74.5], [42.0, -68.0]]]
}

fn default_message_types() -> Vec<String> {
    vec!["PositionReport".to_string()]
}

fn default_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_max_connections() -> u32 {
    5
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8080)),
            path: "/ais".to_string(),
            tick_interval: Duration::from_secs(1),
            recency_window: Duration::from_secs(120),
            query_timeout: default_timeout(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from("config/default")
    }

    /// Load from an optional config file, overridden by `AISLIVE__*`
    /// environment variables
    pub fn load_from(file: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(file).required(false))
            .add_source(
                Environment::with_prefix("AISLIVE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("feed.message_types"),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), AisLiveError> {
        self.feed.validate()?;
        self.server.validate()?;
        self.database.validate()?;
        Ok(())
    }
}

fn invalid(message: &str) -> AisLiveError {
    AisLiveError::ConfigurationError {
        message: message.to_string(),
    }
}

impl FeedConfig {
    pub fn validate(&self) -> Result<(), AisLiveError> {
        if self.url.trim().is_empty() {
            return Err(invalid("Feed URL cannot be empty"));
        }
        if self.api_key.trim().is_empty() {
            return Err(invalid("Feed API key cannot be empty"));
        }
        if self.bounding_boxes.is_empty() {
            return Err(invalid("At least one feed bounding box is required"));
        }
        if self.close_timeout.is_zero() {
            return Err(invalid("Close timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), AisLiveError> {
        if !self.path.starts_with('/') {
            return Err(invalid("Server path must start with '/'"));
        }
        if self.tick_interval.is_zero() {
            return Err(invalid("Tick interval must be greater than zero"));
        }
        if self.recency_window.is_zero() {
            return Err(invalid("Recency window must be greater than zero"));
        }
        if self.query_timeout.is_zero() {
            return Err(invalid("Query timeout must be greater than zero"));
        }
        Ok(())
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), AisLiveError> {
        if let Some(url) = &self.url {
            if url.trim().is_empty() {
                return Err(invalid("Database URL cannot be empty"));
            }
        }
        if self.max_connections == 0 {
            return Err(invalid("Max connections must be greater than zero"));
        }
        Ok(())
    }
}
