//! Shared handles passed to every component at construction

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use crate::{
    config::ServerConfig,
    database::PositionStore,
    errors::AisLiveError,
    geo::{BoundingBox, FeatureCollection},
};

/// Timing of subscription sessions
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub tick_interval: Duration,
    pub recency_window: TimeDelta,
    pub query_timeout: Duration,
}

impl TryFrom<&ServerConfig> for SessionSettings {
    type Error = AisLiveError;

    fn try_from(config: &ServerConfig) -> Result<Self, Self::Error> {
        let recency_window = TimeDelta::from_std(config.recency_window).map_err(|e| {
            AisLiveError::ConfigurationError {
                message: format!("Recency window out of range: {}", e),
            }
        })?;

        Ok(Self {
            tick_interval: config.tick_interval,
            recency_window,
            query_timeout: config.query_timeout,
        })
    }
}

/// Process-wide context: the store handle and session settings.
///
/// Cloning is cheap; every session gets its own clone.
#[derive(Clone)]
pub struct AppContext {
    pub store: Arc<dyn PositionStore>,
    pub settings: SessionSettings,
}

impl AppContext {
    pub fn new(store: Arc<dyn PositionStore>, settings: SessionSettings) -> Self {
        Self { store, settings }
    }

    /// Recent positions inside `bbox`, bounded by the query deadline
    pub async fn snapshot(&self, bbox: &BoundingBox) -> Result<FeatureCollection, AisLiveError> {
        let since = Utc::now() - self.settings.recency_window;
        let records = tokio::time::timeout(
            self.settings.query_timeout,
            self.store.query_within(bbox, since),
        )
        .await
        .map_err(|_| AisLiveError::QueryTimeout(self.settings.query_timeout))??;

        Ok(FeatureCollection::from_records(&records))
    }
}
