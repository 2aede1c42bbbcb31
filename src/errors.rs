//! Errors for the AIS live service
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AisLiveError {
    #[error("Feed connection error: {0}")]
    FeedError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Configuration error")]
    ConfigError(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    ConfigurationError { message: String },

    #[error("IO error")]
    IoError(#[from] std::io::Error),

    #[error("Invalid MMSI: {0}")]
    InvalidMmsi(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Store query exceeded deadline of {0:?}")]
    QueryTimeout(Duration),

    #[error("Database error: {0}")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Database migration error: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),
}
