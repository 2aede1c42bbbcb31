//! GeoJSON shapes and bounding boxes.
//!
//! Everything here is `[longitude, latitude]` ordered. The only lat-first
//! coordinates in the system are the feed subscription boxes, see
//! [`crate::feed::SubscriptionRequest`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Mmsi, PositionRecord};

/// GeoJSON point, `[longitude, latitude]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", rename = "Point")]
pub struct GeoPoint {
    pub coordinates: [f64; 2],
}

impl GeoPoint {
    pub fn new(lon: f64, lat: f64) -> Self {
        Self {
            coordinates: [lon, lat],
        }
    }

    pub fn lon(&self) -> f64 {
        self.coordinates[0]
    }

    pub fn lat(&self) -> f64 {
        self.coordinates[1]
    }

    /// Parse a GeoJSON point, None if it is not a point with two finite
    /// coordinates
    pub fn from_geojson(text: &str) -> Option<Self> {
        let raw: RawGeometry = serde_json::from_str(text).ok()?;
        match (raw.kind.as_str(), raw.coordinates.as_slice()) {
            ("Point", [lon, lat]) if lon.is_finite() && lat.is_finite() => {
                Some(Self::new(*lon, *lat))
            }
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<f64>,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("Bounding box must contain exactly 2 coordinate pairs [lon, lat]")]
pub struct InvalidBoundingBox;

/// Axis-aligned box given by two opposite `[lon, lat]` corners.
///
/// Corners may arrive in any order; they are stored as min/max.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min_lon: f64,
    min_lat: f64,
    max_lon: f64,
    max_lat: f64,
}

impl BoundingBox {
    pub fn from_corners(a: [f64; 2], b: [f64; 2]) -> Self {
        Self {
            min_lon: a[0].min(b[0]),
            min_lat: a[1].min(b[1]),
            max_lon: a[0].max(b[0]),
            max_lat: a[1].max(b[1]),
        }
    }

    /// Closed membership test; points on the edge are inside.
    pub fn contains(&self, point: &GeoPoint) -> bool {
        (self.min_lon..=self.max_lon).contains(&point.lon())
            && (self.min_lat..=self.max_lat).contains(&point.lat())
    }

    /// Closed ring: bottom-left, bottom-right, top-right, top-left, bottom-left
    pub fn ring(&self) -> [[f64; 2]; 5] {
        [
            [self.min_lon, self.min_lat],
            [self.max_lon, self.min_lat],
            [self.max_lon, self.max_lat],
            [self.min_lon, self.max_lat],
            [self.min_lon, self.min_lat],
        ]
    }

    /// GeoJSON polygon of [`BoundingBox::ring`]
    pub fn to_geojson_polygon(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "Polygon",
            "coordinates": [self.ring()],
        })
    }
}

impl TryFrom<&[Vec<f64>]> for BoundingBox {
    type Error = InvalidBoundingBox;

    fn try_from(corners: &[Vec<f64>]) -> Result<Self, Self::Error> {
        match corners {
            [a, b] => match (a.as_slice(), b.as_slice()) {
                ([lon1, lat1], [lon2, lat2]) => {
                    Ok(Self::from_corners([*lon1, *lat1], [*lon2, *lat2]))
                }
                _ => Err(InvalidBoundingBox),
            },
            _ => Err(InvalidBoundingBox),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureProperties {
    pub mmsi: Mmsi,
    pub ship_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub heading: Option<u16>,
    pub time_utc: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub struct Feature {
    pub geometry: GeoPoint,
    pub properties: FeatureProperties,
}

impl Feature {
    /// Project a stored record, None if it has no usable geometry
    pub fn from_record(record: &PositionRecord) -> Option<Self> {
        let geometry = record.geometry?;
        Some(Self {
            geometry,
            properties: FeatureProperties {
                mmsi: record.mmsi(),
                ship_name: record.metadata.ship_name.clone(),
                heading: record.message.heading(),
                time_utc: record.time_utc(),
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(tag = "type")]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

impl FeatureCollection {
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a PositionRecord>) -> Self {
        Self {
            features: records.into_iter().filter_map(Feature::from_record).collect(),
        }
    }
}
