//! Data models.
//!
//! Feed messages arrive as
//! `{"MessageType": ..., "Message": {<MessageType>: {...}}, "MetaData": {...}}`.
//! They are decoded into a [`PositionRecord`], the unit the position store
//! keeps one of per vessel.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{ser::SerializeMap, Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::debug;

use crate::{errors::AisLiveError, geo::GeoPoint};
use serde_helpers::*;

/// Class A position report message type
pub const POSITION_REPORT: &str = "PositionReport";
/// Class B position report message type
pub const CLASS_B_POSITION_REPORT: &str = "StandardClassBPositionReport";

/// Heading value meaning "not available"
pub const HEADING_NOT_AVAILABLE: u16 = 511;

/// Format of the feed's `time_utc` field, e.g. `2024-06-01 12:30:05.123456 +0000 UTC`.
///
/// Fractional seconds are optional.
pub const TIME_UTC_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z UTC";

/// Maritime Mobile Service Identity (MMSI)
///
/// A unique nine-digit number for identifying vessels in AIS messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Mmsi(u32);

impl TryFrom<u32> for Mmsi {
    type Error = AisLiveError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        if value > 999_999_999 {
            return Err(AisLiveError::InvalidMmsi(value.to_string()));
        }
        Ok(Self(value))
    }
}

impl TryFrom<i32> for Mmsi {
    type Error = AisLiveError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        let value = u32::try_from(value).map_err(|_| AisLiveError::InvalidMmsi(value.to_string()))?;
        Self::try_from(value)
    }
}

impl From<Mmsi> for u32 {
    fn from(mmsi: Mmsi) -> Self {
        mmsi.0
    }
}

impl fmt::Display for Mmsi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Mmsi {
    /// Get the raw MMSI value
    pub fn value(&self) -> u32 {
        self.0
    }
}

/// Metadata block attached to every feed message
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MetaData {
    #[serde(rename = "MMSI")]
    pub mmsi: Mmsi,
    /// Name of the vessel, None if blank or missing
    #[serde(
        rename = "ShipName",
        default,
        deserialize_with = "deserialize_trimmed_string"
    )]
    pub ship_name: Option<String>,
    pub latitude: f64,
    pub longitude: f64,
    /// Report time, normalised to UTC
    #[serde(deserialize_with = "deserialize_time_utc")]
    pub time_utc: DateTime<Utc>,
}

/// Position report body shared by class A and class B reports.
///
/// Only the integer-coded fields are typed; everything else is kept as
/// received so that the body re-encodes to the same JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PositionReport {
    /// Heading in degrees (0-359), 511 = not available
    #[serde(
        rename = "TrueHeading",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub true_heading: Option<u16>,
    /// Navigational status (0-15), class A only
    #[serde(
        rename = "NavigationalStatus",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub navigational_status: Option<u8>,
    #[serde(flatten)]
    pub other: Map<String, Value>,
}

impl PositionReport {
    /// Heading, None if not reported or not available (511)
    pub fn heading(&self) -> Option<u16> {
        self.true_heading.filter(|h| *h != HEADING_NOT_AVAILABLE)
    }
}

/// Type-specific message payload, keyed by message type.
///
/// Message types without a typed representation are kept as an opaque
/// JSON object.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageBody {
    PositionReport(PositionReport),
    StandardClassBPositionReport(PositionReport),
    Opaque(Map<String, Value>),
}

impl MessageBody {
    /// Decode the `Message` object of a feed message of type `message_type`.
    ///
    /// A typed body must look like `{<message_type>: {...}}` with fields of
    /// the expected types; anything else is kept as [`MessageBody::Opaque`].
    pub fn decode(message_type: &str, body: Map<String, Value>) -> Self {
        let wrap: fn(PositionReport) -> Self = match message_type {
            POSITION_REPORT => Self::PositionReport,
            CLASS_B_POSITION_REPORT => Self::StandardClassBPositionReport,
            _ => return Self::Opaque(body),
        };

        let typed = match body.get(message_type) {
            Some(inner) if body.len() == 1 => PositionReport::deserialize(inner),
            _ => return Self::Opaque(body),
        };

        match typed {
            Ok(report) => wrap(report),
            Err(e) => {
                debug!("Keeping {} body untyped: {}", message_type, e);
                Self::Opaque(body)
            }
        }
    }

    /// Position report carried by this body, if any
    pub fn position_report(&self) -> Option<&PositionReport> {
        match self {
            Self::PositionReport(report) | Self::StandardClassBPositionReport(report) => {
                Some(report)
            }
            Self::Opaque(_) => None,
        }
    }

    /// Vessel heading, if the message type carries one
    pub fn heading(&self) -> Option<u16> {
        self.position_report().and_then(PositionReport::heading)
    }
}

// Serialize back to the feed's `{<MessageType>: {...}}` shape
impl Serialize for MessageBody {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::PositionReport(report) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(POSITION_REPORT, report)?;
                map.end()
            }
            Self::StandardClassBPositionReport(report) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(CLASS_B_POSITION_REPORT, report)?;
                map.end()
            }
            Self::Opaque(body) => body.serialize(serializer),
        }
    }
}

/// Message as received from the feed
#[derive(Debug, Clone, Deserialize)]
pub struct FeedMessage {
    #[serde(rename = "MessageType")]
    pub message_type: String,
    #[serde(rename = "Message")]
    pub message: Map<String, Value>,
    #[serde(rename = "MetaData")]
    pub metadata: MetaData,
}

/// Latest known state of one vessel
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRecord {
    pub message_type: String,
    pub message: MessageBody,
    pub metadata: MetaData,
    /// Point in `[longitude, latitude]` order.
    ///
    /// None only when a stored geometry could not be read back.
    pub geometry: Option<GeoPoint>,
}

impl PositionRecord {
    /// Vessel identifier, the store key
    pub fn mmsi(&self) -> Mmsi {
        self.metadata.mmsi
    }

    /// Report timestamp
    pub fn time_utc(&self) -> DateTime<Utc> {
        self.metadata.time_utc
    }
}

impl TryFrom<FeedMessage> for PositionRecord {
    type Error = AisLiveError;

    fn try_from(feed: FeedMessage) -> Result<Self, Self::Error> {
        let message = MessageBody::decode(&feed.message_type, feed.message);
        // Metadata is lat/lon, geometry is lon/lat
        let geometry = GeoPoint::new(feed.metadata.longitude, feed.metadata.latitude);

        Ok(Self {
            message_type: feed.message_type,
            message,
            metadata: feed.metadata,
            geometry: Some(geometry),
        })
    }
}

/// Parse a feed timestamp such as `2024-06-01 12:30:05 +0200 UTC`
pub fn parse_time_utc(value: &str) -> Result<DateTime<Utc>, AisLiveError> {
    DateTime::parse_from_str(value, TIME_UTC_FORMAT)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AisLiveError::InvalidTimestamp(format!("{value:?}: {e}")))
}

/// Custom deserializers
mod serde_helpers {
    use chrono::{DateTime, Utc};
    use serde::{self, de::Error, Deserialize, Deserializer};

    pub fn deserialize_trimmed_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        Ok(s.and_then(|s| {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }))
    }

    pub fn deserialize_time_utc<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        super::parse_time_utc(&s).map_err(D::Error::custom)
    }
}
