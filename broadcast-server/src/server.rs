//! TCP listener, accept loop and per-session read/write tasks.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use gauge_protocol::decode_line;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;

use crate::error::{BroadcastError, Result};
use crate::session::{SessionEvent, SessionHandle, SessionId, SessionSet};

/// Longest inbound line accepted; longer lines are discarded as malformed.
pub const MAX_LINE_LENGTH: usize = 1024 * 1024;

/// Default number of outbound lines a session may have waiting before it is
/// disconnected as not keeping up
pub const OUTBOUND_QUEUE_LENGTH: usize = 1024;

/// Listener for rendering clients
///
/// `bind` claims the port up front so that a bind failure aborts startup
/// before anything else runs. `run` then accepts connections until the
/// shutdown token fires.
pub struct BroadcastServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    sessions: SessionSet,
    events: mpsc::UnboundedSender<SessionEvent>,
    next_id: AtomicU64,
    queue_length: usize,
}

impl BroadcastServer {
    /// Bind the listening socket
    ///
    /// # Arguments
    ///
    /// * `addr` - Address and port to listen on (port 0 picks a free port)
    /// * `events` - Channel receiving connects, messages and disconnects
    pub async fn bind(
        addr: SocketAddr,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| BroadcastError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Broadcast server listening on {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            sessions: SessionSet::new(),
            events,
            next_id: AtomicU64::new(1),
            queue_length: OUTBOUND_QUEUE_LENGTH,
        })
    }

    /// Set how many outbound lines a session may have waiting
    ///
    /// A session that falls this far behind is disconnected.
    pub fn with_queue_length(mut self, length: usize) -> Self {
        self.queue_length = length.max(1);
        self
    }

    /// Address actually bound
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Handle on the live session set, for sending
    pub fn sessions(&self) -> SessionSet {
        self.sessions.clone()
    }

    /// Accept connections until `shutdown` fires
    ///
    /// A failed `accept` is logged and the loop carries on. Session tasks watch
    /// the same token and close their connections on shutdown.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.start_session(stream, peer, &shutdown),
                    Err(e) => tracing::warn!("Failed to accept connection: {}", e),
                },
            }
        }

        tracing::info!(
            "Broadcast server on {} stopped with {} session(s) open",
            self.local_addr,
            self.sessions.len()
        );
        Ok(())
    }

    fn start_session(&self, stream: TcpStream, peer: SocketAddr, shutdown: &CancellationToken) {
        let id = SessionId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!("Could not disable Nagle for {}: {}", id, e);
        }

        let (reader, writer) = stream.into_split();
        let (outbound, outbound_rx) = mpsc::channel(self.queue_length);
        let closer = shutdown.child_token();

        self.sessions.insert(
            id,
            SessionHandle {
                peer,
                outbound,
                closer: closer.clone(),
            },
        );
        tracing::info!("Client {} connected from {}", id, peer);
        let _ = self.events.send(SessionEvent::Connected { id, peer });

        tokio::spawn(write_loop(id, writer, outbound_rx, closer.clone()));
        tokio::spawn(read_loop(
            id,
            reader,
            self.sessions.clone(),
            self.events.clone(),
            closer,
        ));
    }
}

/// Drain queued lines onto the socket until the session is dropped, the
/// socket fails or the session is closed
async fn write_loop(
    id: SessionId,
    mut writer: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<String>,
    closer: CancellationToken,
) {
    loop {
        let line = tokio::select! {
            _ = closer.cancelled() => break,
            line = outbound.recv() => match line {
                Some(line) => line,
                None => break,
            },
        };

        let written = tokio::select! {
            _ = closer.cancelled() => break,
            written = writer.write_all(line.as_bytes()) => written,
        };
        if let Err(e) = written {
            tracing::debug!("Write to {} failed, dropping its queue: {}", id, e);
            closer.cancel();
            return;
        }
    }

    let _ = writer.shutdown().await;
}

/// Decode one message per line until EOF, an I/O fault, eviction or shutdown,
/// then remove the session and report the disconnect
async fn read_loop(
    id: SessionId,
    reader: OwnedReadHalf,
    sessions: SessionSet,
    events: mpsc::UnboundedSender<SessionEvent>,
    closer: CancellationToken,
) {
    let mut lines = FramedRead::new(reader, LinesCodec::new_with_max_length(MAX_LINE_LENGTH));

    loop {
        let next = tokio::select! {
            _ = closer.cancelled() => break,
            next = lines.next() => next,
        };

        match next {
            Some(Ok(line)) if line.trim().is_empty() => {}
            Some(Ok(line)) => match decode_line(&line) {
                Ok(message) => {
                    tracing::debug!("{} sent {}", id, message.kind());
                    let _ = events.send(SessionEvent::Message { id, message });
                }
                Err(e) => tracing::warn!("Dropping malformed message from {}: {}", id, e),
            },
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                tracing::warn!(
                    "Dropping line from {} longer than {} bytes",
                    id,
                    MAX_LINE_LENGTH
                );
            }
            Some(Err(LinesCodecError::Io(e))) => {
                tracing::info!("Client {} disconnected: {}", id, e);
                break;
            }
            None => {
                tracing::info!("Client {} closed the connection", id);
                break;
            }
        }
    }

    // Dropping the handle closes the outbound queue, which ends the write loop
    closer.cancel();
    if sessions.remove(id) {
        let _ = events.send(SessionEvent::Disconnected { id });
    }
}
