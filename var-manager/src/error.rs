use data_source::SourceError;
use gauge_protocol::VariableKey;
use thiserror::Error;

/// Errors that can occur while managing variable subscriptions
#[derive(Error, Debug)]
pub enum VarManagerError {
    /// The data source refused a registration
    #[error("Failed to subscribe to {key}: {source}")]
    Subscribe {
        key: VariableKey,
        #[source]
        source: SourceError,
    },

    /// The data source refused to drop a registration
    #[error("Failed to unsubscribe from {key}: {source}")]
    Unsubscribe {
        key: VariableKey,
        #[source]
        source: SourceError,
    },
}

/// Result type for subscription manager operations
pub type Result<T> = std::result::Result<T, VarManagerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_names_key() {
        let error = VarManagerError::Subscribe {
            key: VariableKey::new("INDICATED ALTITUDE", Some("feet")),
            source: SourceError::NotConnected("emulator".to_string()),
        };
        let message = error.to_string();
        assert!(message.contains("INDICATED ALTITUDE (feet)"));
        assert!(message.contains("emulator"));
    }
}
