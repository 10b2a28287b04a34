//! Error taxonomy for tracking sessions.

use thiserror::Error;
use trackview_env::EnvError;

/// Errors surfaced by subscribers, assets and their sessions.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TrackingError {
    /// Configuration error: presence calls need a local client identity.
    #[error("No clientId provided; a client identity is required to enter channel presence")]
    MissingClientId,

    /// Usage error: the operation needs an active session.
    #[error("Cannot change resolution; asset {tracking_id} is not currently being tracked")]
    NotStarted { tracking_id: String },

    /// Protocol error: an inbound payload could not be decoded.
    ///
    /// Only produced while parsing; dispatch logs and drops these.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The transport rejected or failed an operation.
    #[error("Transport error: {0}")]
    Transport(#[from] EnvError),
}

impl From<serde_json::Error> for TrackingError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedPayload(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TrackingError>;
