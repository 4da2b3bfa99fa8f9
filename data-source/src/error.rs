//! Error types for the data-source crate.

/// Errors raised by data-source adapters and the registry.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// The upstream could not be reached; callers retry after a delay
    #[error("Data source '{source_name}' unavailable: {reason}")]
    Unavailable {
        /// Name of the adapter
        source_name: String,
        /// What went wrong
        reason: String,
    },

    /// No adapter is registered under the requested name
    #[error("Unknown data source '{name}' (available: {})", .available.join(", "))]
    UnknownSource {
        /// The requested name
        name: String,
        /// Names that are registered
        available: Vec<String>,
    },

    /// An operation that needs a live link was called before `connect`
    #[error("Data source '{0}' is not connected")]
    NotConnected(String),

    /// `listen` was invoked a second time
    #[error("Data source '{0}' is already listening")]
    AlreadyListening(String),

    /// `sourceOptions` could not be understood by the adapter
    #[error("Invalid options for data source '{source_name}': {reason}")]
    InvalidOptions {
        /// Name of the adapter
        source_name: String,
        /// What was wrong with the options
        reason: String,
    },
}

/// Convenience type alias for Results using SourceError.
pub type Result<T> = std::result::Result<T, SourceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_error_display() {
        let error = SourceError::Unavailable {
            source_name: "simconnect".to_string(),
            reason: "simulator not running".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Data source 'simconnect' unavailable: simulator not running"
        );

        let error = SourceError::UnknownSource {
            name: "xplane".to_string(),
            available: vec!["cpu".to_string(), "emulator".to_string()],
        };
        assert_eq!(
            error.to_string(),
            "Unknown data source 'xplane' (available: cpu, emulator)"
        );

        let error = SourceError::AlreadyListening("emulator".to_string());
        assert_eq!(error.to_string(), "Data source 'emulator' is already listening");
    }
}
