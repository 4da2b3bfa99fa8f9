use std::net::SocketAddr;

use gauge_protocol::ProtocolError;
use thiserror::Error;

/// Errors produced by the broadcast server
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// The listening socket could not be bound; fatal at startup
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// I/O fault on the listener or a session
    #[error("Transport error: {0}")]
    Io(#[from] std::io::Error),

    /// An outbound message could not be serialized
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, BroadcastError>;
