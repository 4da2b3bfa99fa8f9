//! Error types for the gauge-protocol crate.

/// Errors raised while moving messages on or off the wire.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A received line was not a valid message
    #[error("Malformed message: {source}")]
    MalformedMessage {
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// A message could not be serialized
    #[error("Failed to encode {kind} message: {source}")]
    Encode {
        /// Kind of the message that failed
        kind: &'static str,
        /// The underlying JSON error
        #[source]
        source: serde_json::Error,
    },
}

/// Convenience type alias for Results using ProtocolError.
pub type Result<T> = std::result::Result<T, ProtocolError>;
