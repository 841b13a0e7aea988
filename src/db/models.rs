//! Entity structs and their wire views.
//!
//! Ownership is always child→parent-id; no entity holds a live list of its
//! children. Serialization is explicit per entity so internal-only columns
//! (raw content bytes) never leak onto the wire.

use chrono::{DateTime, FixedOffset};
use serde::Serialize;

use crate::errors::{IngestError, Result};

#[derive(Debug, Clone, Serialize)]
pub struct Trip {
    pub id: i64,
    pub name: String,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub zone: String,
    pub title: Option<String>,
    pub brief: Option<String>,
    pub description: Option<String>,
}

/// Fields for creating a trip. The zone defaults to UTC when not given.
#[derive(Debug, Clone, Default)]
pub struct NewTrip {
    pub name: String,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub zone: Option<String>,
    pub title: Option<String>,
    pub brief: Option<String>,
    pub description: Option<String>,
}

/// Partial trip update; `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct TripUpdate {
    pub name: Option<String>,
    pub start: Option<DateTime<FixedOffset>>,
    pub end: Option<DateTime<FixedOffset>>,
    pub zone: Option<String>,
    pub title: Option<String>,
    pub brief: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Track {
    pub id: i64,
    pub trip_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackSegment {
    pub id: i64,
    pub track_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrackPoint {
    pub id: i64,
    pub segment_id: i64,
    pub time: Option<DateTime<FixedOffset>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Waypoint {
    pub id: i64,
    pub trip_id: i64,
    pub name: Option<String>,
    pub description: Option<String>,
    pub time: Option<DateTime<FixedOffset>>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub elevation: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: i64,
    pub trip_id: i64,
    pub name: String,
    pub format: String,
    pub time: Option<DateTime<FixedOffset>>,
    pub description: Option<String>,
}

/// Discriminator for the two renditions a photo may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Original,
    Web,
}

impl ContentKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ContentKind::Original => "original",
            ContentKind::Web => "web",
        }
    }

    pub fn from_db(value: &str) -> Result<Self> {
        match value {
            "original" => Ok(ContentKind::Original),
            "web" => Ok(ContentKind::Web),
            other => Err(IngestError::Parse(format!("unknown content kind {other:?}"))),
        }
    }
}

/// Stored photo bytes plus their digest. Deliberately not serializable;
/// wire consumers get [`PhotoContentInfo`].
#[derive(Debug, Clone)]
pub struct PhotoContent {
    pub id: i64,
    pub photo_id: i64,
    pub kind: ContentKind,
    pub size_bytes: i64,
    pub sha256: String,
    pub data: Vec<u8>,
}

/// Wire view of a content row: size, kind and digest, never the bytes.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoContentInfo {
    pub id: i64,
    pub photo_id: i64,
    pub kind: ContentKind,
    pub size_bytes: i64,
    pub sha256: String,
}

impl From<&PhotoContent> for PhotoContentInfo {
    fn from(content: &PhotoContent) -> Self {
        Self {
            id: content.id,
            photo_id: content.photo_id,
            kind: content.kind,
            size_bytes: content.size_bytes,
            sha256: content.sha256.clone(),
        }
    }
}

/// Created-entity counts reported back after a GPX import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportCounts {
    #[serde(rename = "wpts")]
    pub waypoints: usize,
    pub tracks: usize,
    pub segments: usize,
    pub points: usize,
}
