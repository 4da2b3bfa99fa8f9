//! # broadcast-server
//!
//! Accepts rendering clients over raw TCP and speaks newline-delimited JSON
//! with them.
//!
//! - [`BroadcastServer`] owns the listener and runs the accept loop. Every
//!   accepted connection gets its own read task and its own write task.
//! - [`SessionSet`] is the live set of sessions. It is cheap to clone and is
//!   how the rest of the process sends messages to one client or to all of
//!   them.
//! - [`SessionEvent`] is what the server reports back: connects, decoded
//!   messages and disconnects, in order per session, over an unbounded channel.
//!
//! A slow or broken client never holds up the others: sends only enqueue onto
//! the target session's bounded write queue. A session whose socket fails, or
//! whose queue fills up because it stopped reading, is disconnected.
//!
//! ```rust,ignore
//! use broadcast_server::{BroadcastServer, SessionEvent, Target};
//! use tokio::sync::mpsc;
//!
//! let (events_tx, mut events_rx) = mpsc::unbounded_channel();
//! let server = BroadcastServer::bind("0.0.0.0:1234".parse()?, events_tx).await?;
//! let sessions = server.sessions();
//! tokio::spawn(server.run(shutdown.clone()));
//!
//! while let Some(event) = events_rx.recv().await {
//!     if let SessionEvent::Message { id, message } = event {
//!         sessions.send(Target::One(id), &message)?;
//!     }
//! }
//! ```

pub mod error;
pub mod server;
pub mod session;

pub use error::{BroadcastError, Result};
pub use server::{BroadcastServer, MAX_LINE_LENGTH, OUTBOUND_QUEUE_LENGTH};
pub use session::{SessionEvent, SessionId, SessionSet, Target};
