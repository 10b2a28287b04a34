//! Resolution negotiation and presence payload types.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The accuracy of the geographical coordinates sent by the asset publisher.
///
/// Ordered from lowest to highest power cost: `Minimum < Low < Balanced < High < Maximum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Accuracy {
    /// Best possible with zero additional power consumption (1-20 km)
    Minimum,
    /// Coarse "city" level, circa 10 km
    Low,
    /// Coarse "block" level, circa 100 m
    Balanced,
    /// Most accurate locations that are available
    High,
    /// Navigation-grade, significant extra power cost
    Maximum,
}

/// How often and how precisely the publisher should sample and transmit.
///
/// Immutable value: renegotiation replaces it wholesale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub accuracy: Accuracy,

    /// Desired time between location updates, in milliseconds
    pub desired_interval: u64,

    /// Minimum distance moved before a new fix is sent, in meters
    pub minimum_displacement: f64,
}

impl Resolution {
    pub fn new(accuracy: Accuracy, desired_interval: u64, minimum_displacement: f64) -> Self {
        Self {
            accuracy,
            desired_interval,
            minimum_displacement,
        }
    }
}

/// Role of a channel member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClientType {
    Subscriber,
    Publisher,
}

/// Presence payload attached to every channel member.
///
/// Subscribers announce the resolution they *request*; the publisher
/// announces the resolution it has *applied*.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceData {
    #[serde(rename = "type")]
    pub client_type: ClientType,

    #[serde(default)]
    pub resolution: Option<Resolution>,
}

impl PresenceData {
    pub fn subscriber(resolution: Option<Resolution>) -> Self {
        Self {
            client_type: ClientType::Subscriber,
            resolution,
        }
    }

    pub fn publisher(resolution: Option<Resolution>) -> Self {
        Self {
            client_type: ClientType::Publisher,
            resolution,
        }
    }

    pub fn is_publisher(&self) -> bool {
        self.client_type == ClientType::Publisher
    }

    /// Decodes presence data that may arrive as a JSON object or as a
    /// JSON document encoded in a string.
    pub fn from_value(value: &Value) -> Result<Self> {
        match value {
            Value::String(encoded) => Ok(serde_json::from_str(encoded)?),
            other => Ok(Self::deserialize(other)?),
        }
    }

    pub fn to_value(&self) -> Value {
        // Plain enums and numbers: serialization cannot fail
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accuracy_ordering() {
        assert!(Accuracy::Minimum < Accuracy::Low);
        assert!(Accuracy::Low < Accuracy::Balanced);
        assert!(Accuracy::Balanced < Accuracy::High);
        assert!(Accuracy::High < Accuracy::Maximum);
    }

    #[test]
    fn test_presence_data_wire_format() {
        let data = PresenceData::subscriber(Some(Resolution::new(Accuracy::Low, 3, 4.0)));
        assert_eq!(
            data.to_value(),
            json!({
                "type": "SUBSCRIBER",
                "resolution": {"accuracy": "LOW", "desiredInterval": 3, "minimumDisplacement": 4.0}
            })
        );
    }

    #[test]
    fn test_presence_data_without_resolution() {
        let data = PresenceData::from_value(&json!({"type": "PUBLISHER"})).unwrap();
        assert!(data.is_publisher());
        assert_eq!(data.resolution, None);
    }

    #[test]
    fn test_presence_data_from_encoded_string() {
        let encoded = json!(r#"{"type":"PUBLISHER","resolution":{"accuracy":"HIGH","desiredInterval":1000,"minimumDisplacement":1}}"#);
        let data = PresenceData::from_value(&encoded).unwrap();
        assert_eq!(data.resolution.map(|r| r.desired_interval), Some(1000));
        assert_eq!(data.resolution.map(|r| r.accuracy), Some(Accuracy::High));
    }

    #[test]
    fn test_presence_data_rejects_unknown_role() {
        assert!(PresenceData::from_value(&json!({"type": "OBSERVER"})).is_err());
        assert!(PresenceData::from_value(&json!("not json")).is_err());
    }
}
