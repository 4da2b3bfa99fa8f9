//! Session identity and the live session set.

use std::net::SocketAddr;
use std::sync::Arc;

use dashmap::DashMap;
use gauge_protocol::{encode_line, Message};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Unique identifier for an accepted connection
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SessionId(u64);

impl SessionId {
    /// Create a new SessionId with the given value
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Who an outbound message goes to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    One(SessionId),
    All,
}

/// What the server reports about its sessions
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// A connection was accepted and joined the session set
    Connected { id: SessionId, peer: SocketAddr },

    /// A well-formed message arrived on a session
    Message { id: SessionId, message: Message },

    /// The session left the session set. Sent exactly once per session.
    Disconnected { id: SessionId },
}

pub(crate) struct SessionHandle {
    pub(crate) peer: SocketAddr,
    pub(crate) outbound: mpsc::Sender<String>,
    /// Cancelling this ends both of the session's tasks
    pub(crate) closer: CancellationToken,
}

impl SessionHandle {
    /// Queue `line` without waiting; a full queue evicts the session
    fn enqueue(&self, id: SessionId, line: String) -> bool {
        match self.outbound.try_send(line) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                if !self.closer.is_cancelled() {
                    tracing::warn!(
                        "{} ({}) is not reading its messages; disconnecting it",
                        id,
                        self.peer
                    );
                    self.closer.cancel();
                }
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// The live set of sessions, shared by the accept loop, the read tasks and
/// whoever broadcasts
#[derive(Clone, Default)]
pub struct SessionSet {
    sessions: Arc<DashMap<SessionId, SessionHandle>>,
}

impl SessionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&self, id: SessionId, handle: SessionHandle) {
        self.sessions.insert(id, handle);
    }

    /// Remove a session, returning whether it was present
    pub(crate) fn remove(&self, id: SessionId) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Serialize `message` once and queue it for every targeted session
    ///
    /// Sessions whose writer has already gone away are skipped. A session whose
    /// outbound queue is full is disconnected instead of queuing more. Returns
    /// the number of sessions the message was queued for; a missing
    /// [`Target::One`] session yields `0`, not an error.
    pub fn send(&self, target: Target, message: &Message) -> Result<usize> {
        let line = encode_line(message)?;

        let queued = match target {
            Target::One(id) => match self.sessions.get(&id) {
                Some(handle) => usize::from(handle.enqueue(id, line)),
                None => {
                    tracing::debug!("Dropping {} for {}: not connected", message.kind(), id);
                    0
                }
            },
            Target::All => self
                .sessions
                .iter()
                .filter(|entry| entry.value().enqueue(*entry.key(), line.clone()))
                .count(),
        };

        tracing::trace!("Queued {} for {} session(s)", message.kind(), queued);
        Ok(queued)
    }

    /// Ids of every live session, sorted
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        ids
    }

    pub fn peer(&self, id: SessionId) -> Option<SocketAddr> {
        self.sessions.get(&id).map(|handle| handle.peer)
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauge_protocol::VariableKey;
    use serde_json::json;

    fn handle_with_queue(length: usize) -> (SessionHandle, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(length);
        let peer = "127.0.0.1:50000".parse().unwrap();
        let closer = CancellationToken::new();
        (SessionHandle { peer, outbound, closer }, rx)
    }

    fn handle() -> (SessionHandle, mpsc::Receiver<String>) {
        handle_with_queue(16)
    }

    #[test]
    fn test_session_id_display() {
        assert_eq!(SessionId::new(7).to_string(), "session-7");
        assert_eq!(SessionId::new(7).as_u64(), 7);
    }

    #[test]
    fn test_send_to_all_skips_closed_writers() {
        let sessions = SessionSet::new();
        let (first, mut first_rx) = handle();
        let (second, second_rx) = handle();
        let (third, mut third_rx) = handle();
        sessions.insert(SessionId::new(1), first);
        sessions.insert(SessionId::new(2), second);
        sessions.insert(SessionId::new(3), third);

        // Writer for session 2 is gone
        drop(second_rx);

        let message = Message::var(&VariableKey::new("ALT", Some("feet")), json!(100));
        assert_eq!(sessions.send(Target::All, &message).unwrap(), 2);

        let expected = gauge_protocol::encode_line(&message).unwrap();
        assert_eq!(first_rx.try_recv().unwrap(), expected);
        assert_eq!(third_rx.try_recv().unwrap(), expected);
    }

    #[test]
    fn test_send_to_one() {
        let sessions = SessionSet::new();
        let (first, mut first_rx) = handle();
        let (second, mut second_rx) = handle();
        sessions.insert(SessionId::new(1), first);
        sessions.insert(SessionId::new(2), second);

        let message = Message::re_init(Some("Cessna Skyhawk".to_string()));
        assert_eq!(sessions.send(Target::One(SessionId::new(2)), &message).unwrap(), 1);
        assert!(first_rx.try_recv().is_err());
        assert!(second_rx.try_recv().unwrap().contains("ReInit"));

        assert_eq!(sessions.send(Target::One(SessionId::new(9)), &message).unwrap(), 0);
    }

    #[test]
    fn test_full_queue_closes_only_that_session() {
        let sessions = SessionSet::new();
        let (stalled, _stalled_rx) = handle_with_queue(2);
        let (healthy, mut healthy_rx) = handle_with_queue(2);
        let stalled_closer = stalled.closer.clone();
        let healthy_closer = healthy.closer.clone();
        sessions.insert(SessionId::new(1), stalled);
        sessions.insert(SessionId::new(2), healthy);

        let message = Message::var(&VariableKey::new("ALT", Some("feet")), json!(100));
        for _ in 0..2 {
            assert_eq!(sessions.send(Target::All, &message).unwrap(), 2);
            healthy_rx.try_recv().unwrap();
        }

        // Session 1 never drained its queue
        assert_eq!(sessions.send(Target::All, &message).unwrap(), 1);
        assert!(stalled_closer.is_cancelled());
        assert!(!healthy_closer.is_cancelled());
        assert!(healthy_rx.try_recv().is_ok());

        assert_eq!(sessions.send(Target::One(SessionId::new(1)), &message).unwrap(), 0);
    }

    #[test]
    fn test_remove() {
        let sessions = SessionSet::new();
        let (first, _rx) = handle();
        sessions.insert(SessionId::new(4), first);

        assert_eq!(sessions.ids(), vec![SessionId::new(4)]);
        assert!(sessions.peer(SessionId::new(4)).is_some());
        assert!(sessions.remove(SessionId::new(4)));
        assert!(!sessions.remove(SessionId::new(4)));
        assert!(sessions.is_empty());
    }
}
