//! Location data model and its GeoJSON wire format.
//!
//! Publishers send each fix as a GeoJSON `Feature<Point>`:
//!
//! ```text
//! {
//!   "type": "Feature",
//!   "geometry": { "type": "Point", "coordinates": [lon, lat, alt] },
//!   "properties": { "accuracyHorizontal", "altitude", "bearing", "speed", "time" }
//! }
//! ```
//!
//! Note the coordinate order: longitude first.

use crate::error::{Result, TrackingError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// DOMAIN TYPES
// ============================================================================

/// A single position fix produced by the publisher. Never mutated here.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "GeoJsonFeature", into = "GeoJsonFeature")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,

    /// Meters above sea level
    pub altitude: f64,

    /// Degrees clockwise from north, [0, 360)
    pub bearing: f64,

    /// Horizontal accuracy radius in meters
    pub accuracy_horizontal: f64,

    /// Meters per second
    pub speed: f64,

    /// Fix time, milliseconds since the Unix epoch
    pub timestamp: f64,
}

impl Location {
    /// Creates a location with zeroed altitude, speed and timestamp.
    pub fn new(latitude: f64, longitude: f64, bearing: f64, accuracy_horizontal: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            bearing,
            accuracy_horizontal,
            speed: 0.0,
            timestamp: 0.0,
        }
    }

    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// The subset of the fix the animator renders.
    pub fn position(&self) -> Position {
        Position {
            latitude: self.latitude,
            longitude: self.longitude,
            bearing: self.bearing,
            accuracy: self.accuracy_horizontal,
        }
    }
}

/// Whether a location was measured or extrapolated by the publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationUpdateType {
    Predicted,
    Actual,
}

/// One delivery from the publisher: the newest fix plus any fixes that were
/// held back while the publisher could not transmit.
///
/// `skipped_locations` are chronological and strictly older than `location`;
/// together they form one contiguous path segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationUpdate {
    pub location: Location,

    #[serde(default, alias = "intermediateLocations")]
    pub skipped_locations: Vec<Location>,

    #[serde(rename = "type")]
    pub update_type: LocationUpdateType,
}

impl LocationUpdate {
    pub fn new(location: Location) -> Self {
        Self {
            location,
            skipped_locations: Vec::new(),
            update_type: LocationUpdateType::Actual,
        }
    }

    pub fn with_skipped(mut self, skipped: Vec<Location>) -> Self {
        self.skipped_locations = skipped;
        self
    }

    /// Skipped locations followed by the newest location.
    pub fn path(&self) -> impl Iterator<Item = &Location> {
        self.skipped_locations
            .iter()
            .chain(std::iter::once(&self.location))
    }

    /// Decodes a channel payload into updates, preserving order.
    ///
    /// Accepts a single update, an array of updates, or either of those
    /// encoded as a JSON string. Fails as a whole if any element is malformed.
    pub fn parse_batch(data: &Value) -> Result<Vec<LocationUpdate>> {
        match data {
            Value::String(encoded) => {
                let decoded: Value = serde_json::from_str(encoded)?;
                if decoded.is_string() {
                    return Err(TrackingError::MalformedPayload(
                        "doubly encoded payload".to_string(),
                    ));
                }
                Self::parse_batch(&decoded)
            }
            Value::Array(items) => items
                .iter()
                .map(|item| LocationUpdate::deserialize(item).map_err(TrackingError::from))
                .collect(),
            other => Ok(vec![LocationUpdate::deserialize(other)?]),
        }
    }
}

/// A renderable marker state: where, which way, how uncertain.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    pub bearing: f64,
    pub accuracy: f64,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64, bearing: f64, accuracy: f64) -> Self {
        Self {
            latitude,
            longitude,
            bearing,
            accuracy,
        }
    }
}

// ============================================================================
// GEOJSON WIRE FORMAT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoJsonFeature {
    #[serde(rename = "type")]
    kind: String,
    geometry: GeoJsonPoint,
    properties: GeoJsonProperties,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeoJsonPoint {
    #[serde(rename = "type")]
    kind: String,
    coordinates: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeoJsonProperties {
    accuracy_horizontal: f64,
    #[serde(default)]
    altitude: Option<f64>,
    bearing: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    time: f64,
}

impl TryFrom<GeoJsonFeature> for Location {
    type Error = String;

    fn try_from(feature: GeoJsonFeature) -> std::result::Result<Self, Self::Error> {
        if feature.kind != "Feature" {
            return Err(format!("expected a GeoJSON Feature, got {}", feature.kind));
        }
        if feature.geometry.kind != "Point" {
            return Err(format!("expected Point geometry, got {}", feature.geometry.kind));
        }
        let coordinates = &feature.geometry.coordinates;
        if coordinates.len() < 2 {
            return Err("Point geometry needs at least [lon, lat]".to_string());
        }
        let properties = feature.properties;
        Ok(Location {
            latitude: coordinates[1],
            longitude: coordinates[0],
            altitude: properties
                .altitude
                .or_else(|| coordinates.get(2).copied())
                .unwrap_or(0.0),
            bearing: properties.bearing,
            accuracy_horizontal: properties.accuracy_horizontal,
            speed: properties.speed,
            timestamp: properties.time,
        })
    }
}

impl From<Location> for GeoJsonFeature {
    fn from(location: Location) -> Self {
        GeoJsonFeature {
            kind: "Feature".to_string(),
            geometry: GeoJsonPoint {
                kind: "Point".to_string(),
                coordinates: vec![location.longitude, location.latitude, location.altitude],
            },
            properties: GeoJsonProperties {
                accuracy_horizontal: location.accuracy_horizontal,
                altitude: Some(location.altitude),
                bearing: location.bearing,
                speed: location.speed,
                time: location.timestamp,
            },
        }
    }
}
