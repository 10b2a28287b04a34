//! Error types for the TrackView environment abstraction.

use thiserror::Error;

/// Errors reported by the realtime transport and the execution context.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EnvError {
    /// The underlying connection is gone (closed, failed or suspended).
    #[error("Connection closed")]
    ConnectionClosed,

    /// The transport refused the operation (e.g. presence enter not permitted)
    #[error("Operation rejected: {0}")]
    Rejected(String),

    /// Channel-level failure (attach failed, channel released, etc.)
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Payload serialization/deserialization failed
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Operation timed out
    #[error("Timeout after {0}ms")]
    Timeout(u64),
}

impl EnvError {
    /// Creates a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }

    /// Creates a channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::ChannelError(msg.into())
    }

    /// Returns true when the failure only means the connection is already gone.
    ///
    /// Callers tearing a session down treat this as success.
    pub fn is_connection_closed(&self) -> bool {
        matches!(self, Self::ConnectionClosed)
    }
}

impl From<serde_json::Error> for EnvError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_closed_detection() {
        assert!(EnvError::ConnectionClosed.is_connection_closed());
        assert!(!EnvError::rejected("nope").is_connection_closed());
        assert!(!EnvError::Timeout(10).is_connection_closed());
    }

    #[test]
    fn test_display() {
        assert_eq!(
            EnvError::rejected("presence denied").to_string(),
            "Operation rejected: presence denied"
        );
        assert_eq!(EnvError::Timeout(250).to_string(), "Timeout after 250ms");
    }
}
