use std::path::PathBuf;

use broadcast_server::BroadcastError;
use data_source::SourceError;
use thiserror::Error;

/// Errors surfaced by the OpenGauge server process
#[derive(Error, Debug)]
pub enum ServerError {
    /// An explicitly requested config file does not exist
    #[error("Config file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The config file exists but could not be read
    #[error("Failed to read config file {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`ServerConfig`](crate::ServerConfig)
    #[error("Config file {} is invalid: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A config value is out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Data source error: {0}")]
    Source(#[from] SourceError),

    #[error("Broadcast server error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// An operator console line could not be understood
    #[error("{0}")]
    Command(String),
}

pub type Result<T> = std::result::Result<T, ServerError>;
