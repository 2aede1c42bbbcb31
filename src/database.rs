//! Position store: latest report per vessel with bounding-box queries

mod memory;
mod models;
mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::{config::DatabaseConfig, errors::AisLiveError, geo::BoundingBox, models::PositionRecord};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Upsert-by-MMSI table with a geospatial range query.
///
/// Every call is atomic on its own; there are no multi-key transactions.
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// Replace the record for `record.mmsi()`, creating it if absent
    async fn upsert(&self, record: &PositionRecord) -> Result<(), AisLiveError>;

    /// Records inside `bbox` (edges included) reported at or after `since`
    async fn query_within(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
    ) -> Result<Vec<PositionRecord>, AisLiveError>;
}

/// Open the store selected by configuration
pub async fn open(config: &DatabaseConfig) -> Result<Arc<dyn PositionStore>, AisLiveError> {
    match &config.url {
        Some(url) => Ok(Arc::new(PgStore::connect(url, config.max_connections).await?)),
        None => {
            info!("No database URL configured, keeping positions in memory");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}
