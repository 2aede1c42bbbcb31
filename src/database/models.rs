// src/database/models.rs
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use sqlx::types::Json;
use tracing::warn;

use crate::{
    errors::AisLiveError,
    geo::GeoPoint,
    models::{MessageBody, MetaData, Mmsi, PositionRecord},
};

#[derive(Debug, sqlx::FromRow)]
pub struct PositionRow {
    pub mmsi: i32,
    pub message_type: String,
    pub message: Json<Map<String, Value>>,
    pub ship_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub time_utc: DateTime<Utc>,
    /// `ST_AsGeoJSON(geom, 15)`
    pub geometry: Option<String>,
}

impl TryFrom<PositionRow> for PositionRecord {
    type Error = AisLiveError;

    fn try_from(row: PositionRow) -> Result<Self, Self::Error> {
        let mmsi = Mmsi::try_from(row.mmsi)?;
        let geometry = row.geometry.as_deref().and_then(GeoPoint::from_geojson);
        if geometry.is_none() {
            warn!("Stored geometry for MMSI {} is unreadable", mmsi);
        }

        Ok(Self {
            message: MessageBody::decode(&row.message_type, row.message.0),
            message_type: row.message_type,
            metadata: MetaData {
                mmsi,
                ship_name: row.ship_name,
                latitude: row.latitude,
                longitude: row.longitude,
                time_utc: row.time_utc,
            },
            geometry,
        })
    }
}
