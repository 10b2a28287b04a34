//! Common types for the TrackView environment abstraction.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Identity of a participant on the realtime network.
///
/// Presence enter/leave calls are made on behalf of this identity, so it is
/// always passed explicitly rather than read from ambient client state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClientId(String);

impl ClientId {
    /// Creates a ClientId from an application-provided string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a new random ClientId (UUID v4).
    pub fn random() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Creates a deterministic ClientId from a seed (for simulation).
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&seed.to_le_bytes());
        bytes[8..16].copy_from_slice(&seed.wrapping_mul(0x517cc1b727220a95).to_le_bytes());
        Self(Uuid::from_bytes(bytes).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Options applied when a channel is obtained from the client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Number of most recent messages replayed on attach (`None` = no rewind)
    pub rewind: Option<u32>,
}

impl ChannelOptions {
    /// Options requesting the last `count` messages on attach.
    pub fn with_rewind(count: u32) -> Self {
        Self {
            rewind: Some(count),
        }
    }
}

/// A data message received on a channel.
///
/// `data` is left undecoded: it may be a JSON object, a JSON array (batch) or
/// a JSON document encoded as a string, depending on the publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelMessage {
    /// Event class the message was published under (e.g. `enhanced`)
    pub name: String,

    /// Message payload
    pub data: Value,

    /// Publishing client, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<ClientId>,
}

impl ChannelMessage {
    pub fn new(name: impl Into<String>, data: Value) -> Self {
        Self {
            name: name.into(),
            data,
            client_id: None,
        }
    }
}

/// Presence membership change reported by the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceAction {
    /// Member is no longer present (inventory replay)
    Absent,
    /// Member was already present when we subscribed (inventory replay)
    Present,
    /// Member joined
    Enter,
    /// Member left
    Leave,
    /// Member changed its presence data
    Update,
}

impl PresenceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Absent => "absent",
            Self::Present => "present",
            Self::Enter => "enter",
            Self::Leave => "leave",
            Self::Update => "update",
        }
    }
}

impl std::fmt::Display for PresenceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A presence event for one channel member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceMessage {
    pub action: PresenceAction,

    /// Member the event refers to
    pub client_id: ClientId,

    /// Application-defined member payload (raw; may be a JSON string)
    #[serde(default)]
    pub data: Value,
}

impl PresenceMessage {
    pub fn new(action: PresenceAction, client_id: ClientId, data: Value) -> Self {
        Self {
            action,
            client_id,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_id_from_seed_is_deterministic() {
        assert_eq!(ClientId::from_seed(7), ClientId::from_seed(7));
        assert_ne!(ClientId::from_seed(7), ClientId::from_seed(8));
    }

    #[test]
    fn test_random_client_ids_differ() {
        assert_ne!(ClientId::random(), ClientId::random());
    }

    #[test]
    fn test_presence_action_wire_names() {
        let json = serde_json::to_string(&PresenceAction::Present).unwrap();
        assert_eq!(json, "\"present\"");

        let parsed: PresenceAction = serde_json::from_str("\"leave\"").unwrap();
        assert_eq!(parsed, PresenceAction::Leave);
    }
}
