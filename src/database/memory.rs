// src/database/memory.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::PositionStore;
use crate::{
    errors::AisLiveError,
    geo::BoundingBox,
    models::{Mmsi, PositionRecord},
};

/// In-process store, one record per MMSI behind a read/write lock
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<Mmsi, PositionRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, mmsi: Mmsi) -> Option<PositionRecord> {
        self.records.read().await.get(&mmsi).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl PositionStore for MemoryStore {
    async fn upsert(&self, record: &PositionRecord) -> Result<(), AisLiveError> {
        self.records
            .write()
            .await
            .insert(record.mmsi(), record.clone());
        Ok(())
    }

    async fn query_within(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
    ) -> Result<Vec<PositionRecord>, AisLiveError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|r| r.time_utc() >= since)
            .filter(|r| r.geometry.is_some_and(|p| bbox.contains(&p)))
            .cloned()
            .collect())
    }
}
