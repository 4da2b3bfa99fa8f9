//! Session protocol
//!
//! Drives every client session through `Connected → AwaitingInit → Synced`:
//!
//! - An `Init` whose vehicle matches the authoritative context is acknowledged
//!   to every session and its variables are subscribed. Each delivery is
//!   broadcast as a `Var` message to every session.
//! - An `Init` whose vehicle differs, or any `Init` while the upstream context
//!   is unknown, makes every session re-initialize (`ReInit`). Nothing is
//!   subscribed.
//! - An upstream vehicle change makes every session re-initialize.
//! - A disconnect releases the session's share of its subscriptions.
//! - Values of a variable are logged while any synced session asked for it
//!   with `debug: true`.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use broadcast_server::{SessionEvent, SessionId, SessionSet, Target};
use dashmap::DashMap;
use gauge_protocol::{InitPayload, Message, VariableKey};
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use var_manager::{HolderId, ResolvedCallback, SubscriptionManager};

/// Where a session is in the init handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepted, no Init seen yet
    Connected,
    /// Told to (re-)initialize; waiting for an Init with the right vehicle
    AwaitingInit,
    /// Init accepted; receiving Var messages
    Synced,
}

/// Wires the broadcast server to the subscription manager
pub struct Orchestrator {
    manager: SubscriptionManager,
    sessions: SessionSet,
    states: DashMap<SessionId, SessionState>,
    /// Sessions that asked for each variable to be logged
    debug_vars: Arc<DashMap<VariableKey, HashSet<SessionId>>>,
}

fn holder(id: SessionId) -> HolderId {
    id.as_u64()
}

impl Orchestrator {
    /// Create the orchestrator and start tracking vehicle changes
    pub fn new(manager: SubscriptionManager, sessions: SessionSet) -> Arc<Self> {
        let orchestrator = Arc::new(Self {
            manager,
            sessions,
            states: DashMap::new(),
            debug_vars: Arc::new(DashMap::new()),
        });

        let weak: Weak<Self> = Arc::downgrade(&orchestrator);
        orchestrator
            .manager
            .subscribe_vehicle(Arc::new(move |vehicle: Option<String>| {
                if let Some(orchestrator) = weak.upgrade() {
                    orchestrator.vehicle_changed(vehicle);
                }
            }));

        orchestrator
    }

    pub fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    /// Consume session events until shutdown or until the server goes away
    pub async fn run(
        self: Arc<Self>,
        mut events: mpsc::UnboundedReceiver<SessionEvent>,
        shutdown: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                },
            }
        }
        tracing::debug!("Session protocol stopped");
    }

    pub fn handle_event(&self, event: SessionEvent) {
        match event {
            SessionEvent::Connected { id, .. } => {
                self.states.insert(id, SessionState::Connected);
            }
            SessionEvent::Message {
                id,
                message: Message::Init(payload),
            } => self.handle_init(id, payload),
            SessionEvent::Message { id, message } => {
                tracing::debug!("Ignoring {} from {}", message.kind(), id);
            }
            SessionEvent::Disconnected { id } => self.handle_disconnect(id),
        }
    }

    fn handle_init(&self, id: SessionId, payload: InitPayload) {
        let current = self.manager.current_vehicle();
        tracing::debug!(
            "{} wants to initialize with vehicle {:?}, {} var(s)",
            id,
            payload.vehicle_name,
            payload.vars.len()
        );

        if current.is_none() || payload.vehicle_name != current {
            tracing::info!(
                "{} has vehicle {:?} but it is currently {:?}; telling clients to re-init",
                id,
                payload.vehicle_name,
                current
            );
            self.states.insert(id, SessionState::AwaitingInit);
            self.broadcast(&Message::re_init(current));
            return;
        }

        self.broadcast(&Message::init_ack(current));
        self.states.insert(id, SessionState::Synced);

        let keys = payload.keys();
        tracing::info!("{} synced; subscribing to {} var(s)", id, keys.len());

        self.forget_debug(id);
        for var in payload.vars.iter().filter(|var| var.is_debug()) {
            self.debug_vars.entry(var.key()).or_default().insert(id);
        }

        for key in &keys {
            if let Err(e) = self
                .manager
                .subscribe_var(key, holder(id), self.var_broadcaster())
            {
                tracing::warn!("{}", e);
            }
        }

        let released = self.manager.unsubscribe_unused(holder(id), &keys);
        if released > 0 {
            tracing::debug!("{} no longer needs {} var(s)", id, released);
        }
    }

    /// Delivery callback: broadcast every resolved value to every session
    fn var_broadcaster(&self) -> ResolvedCallback {
        let sessions = self.sessions.clone();
        let debug_vars = Arc::clone(&self.debug_vars);
        Arc::new(move |key: &VariableKey, value: Value| {
            if debug_vars.contains_key(key) {
                tracing::info!("Var {} => {}", key, value);
            }
            if let Err(e) = sessions.send(Target::All, &Message::var(key, value)) {
                tracing::warn!("Failed to broadcast {}: {}", key, e);
            }
        })
    }

    fn vehicle_changed(&self, vehicle: Option<String>) {
        tracing::info!("New vehicle {:?}, informing clients", vehicle);

        for mut state in self.states.iter_mut() {
            *state = SessionState::AwaitingInit;
        }
        self.broadcast(&Message::re_init(vehicle));
    }

    fn forget_debug(&self, id: SessionId) {
        self.debug_vars.retain(|_, sessions| {
            sessions.remove(&id);
            !sessions.is_empty()
        });
    }

    fn handle_disconnect(&self, id: SessionId) {
        self.states.remove(&id);
        self.forget_debug(id);
        let dropped = self.manager.release_all(holder(id));
        tracing::info!(
            "{} disconnected; {} var(s) no longer subscribed",
            id,
            dropped
        );
    }

    fn broadcast(&self, message: &Message) {
        match self.sessions.send(Target::All, message) {
            Ok(queued) => tracing::debug!("Broadcast {} to {} session(s)", message.kind(), queued),
            Err(e) => tracing::warn!("Failed to broadcast {}: {}", message.kind(), e),
        }
    }

    /// Whether values of `key` are currently being logged
    pub fn is_debugging(&self, key: &VariableKey) -> bool {
        self.debug_vars.contains_key(key)
    }

    /// Handshake state of a session, if it is known
    pub fn state(&self, id: SessionId) -> Option<SessionState> {
        self.states.get(&id).map(|state| *state)
    }

    /// Every known session and its state, sorted by id
    pub fn states(&self) -> Vec<(SessionId, SessionState)> {
        let mut states: Vec<_> = self
            .states
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        states.sort_by_key(|(id, _)| *id);
        states
    }
}
