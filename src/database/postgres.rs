// src/database/postgres.rs
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgPoolOptions, types::Json, Pool, Postgres};
use tracing::{info, warn};

use super::{models::PositionRow, PositionStore};
use crate::{errors::AisLiveError, geo::BoundingBox, models::PositionRecord};

/// PostGIS-backed store.
///
/// Table `positions` is keyed by MMSI, with a GiST index on `geom` and a
/// B-tree index on `time_utc`.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool<Postgres>,
}

impl PgStore {
    /// Connect and run migrations
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, AisLiveError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!("Connected to PostgreSQL, max_connections={}", max_connections);

        Self::new(pool).await
    }

    /// Wrap an existing pool and run migrations
    pub async fn new(pool: Pool<Postgres>) -> Result<Self, AisLiveError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("Database migrations completed");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &Pool<Postgres> {
        &self.pool
    }
}

#[async_trait]
impl PositionStore for PgStore {
    async fn upsert(&self, record: &PositionRecord) -> Result<(), AisLiveError> {
        let mmsi = i32::try_from(record.mmsi().value())
            .map_err(|_| AisLiveError::InvalidMmsi(record.mmsi().to_string()))?;
        let meta = &record.metadata;

        // Geometry is x = longitude, y = latitude
        sqlx::query(
            "INSERT INTO positions (
                mmsi, message_type, message, ship_name,
                latitude, longitude, time_utc, geom
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, ST_SetSRID(ST_MakePoint($6, $5), 4326))
            ON CONFLICT (mmsi) DO UPDATE SET
                message_type = EXCLUDED.message_type,
                message = EXCLUDED.message,
                ship_name = EXCLUDED.ship_name,
                latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                time_utc = EXCLUDED.time_utc,
                geom = EXCLUDED.geom",
        )
        .bind(mmsi)
        .bind(&record.message_type)
        .bind(Json(&record.message))
        .bind(&meta.ship_name)
        .bind(meta.latitude)
        .bind(meta.longitude)
        .bind(meta.time_utc)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn query_within(
        &self,
        bbox: &BoundingBox,
        since: DateTime<Utc>,
    ) -> Result<Vec<PositionRecord>, AisLiveError> {
        let polygon = bbox.to_geojson_polygon().to_string();

        let rows: Vec<PositionRow> = sqlx::query_as(
            "SELECT mmsi, message_type, message, ship_name, latitude, longitude,
                    time_utc, ST_AsGeoJSON(geom, 15) AS geometry
            FROM positions
            WHERE ST_Covers(ST_SetSRID(ST_GeomFromGeoJSON($1), 4326), geom)
              AND time_utc >= $2",
        )
        .bind(polygon)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let mmsi = row.mmsi;
            match PositionRecord::try_from(row) {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping stored position for MMSI {}: {}", mmsi, e),
            }
        }
        Ok(records)
    }
}
