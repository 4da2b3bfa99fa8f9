//! The data-source capability trait.
//!
//! A `DataSource` is the single authoritative producer of live values for the
//! process. The server never talks to a simulator directly; it only holds an
//! `Arc<dyn DataSource>` chosen by name at startup.
//!
//! # Contract
//!
//! - `connect` establishes the upstream link or fails with
//!   [`SourceError::Unavailable`](crate::SourceError::Unavailable). Callers
//!   retry with a fixed delay.
//! - `disconnect` releases the link and stops a running `listen`. Calling it
//!   twice is harmless.
//! - `subscribe_var` may be called repeatedly for the same key. Only the first
//!   call registers upstream; every registered callback receives deliveries.
//! - `subscribe_vehicle` stores the single vehicle-change callback.
//! - `listen` runs the delivery loop on the calling task until the shutdown
//!   token fires or the source is disconnected. It may be invoked once, after
//!   `connect`.
//!
//! Callbacks are invoked on the delivery task. They must not block.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use gauge_protocol::VariableKey;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Receives every raw value delivered for one variable.
pub type ValueCallback = Arc<dyn Fn(Value) + Send + Sync>;

/// Receives the new vehicle context (`None` = no vehicle active).
pub type VehicleCallback = Arc<dyn Fn(Option<String>) + Send + Sync>;

/// Capability interface implemented by every live-data adapter.
///
/// Implementations must be `Send + Sync`; they are shared between the startup
/// task, the delivery task and the subscription manager.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Name the adapter is registered under
    fn name(&self) -> &str;

    /// Whether `connect` has succeeded and `disconnect` has not been called since
    fn is_connected(&self) -> bool;

    /// Establish the upstream link.
    async fn connect(&self) -> Result<()>;

    /// Release the upstream link. Idempotent.
    async fn disconnect(&self) -> Result<()>;

    /// Register interest in a variable.
    fn subscribe_var(&self, key: &VariableKey, on_value: ValueCallback) -> Result<()>;

    /// Drop every registration for a variable.
    fn unsubscribe_var(&self, key: &VariableKey) -> Result<()>;

    /// Register the callback fired whenever the upstream vehicle context changes.
    fn subscribe_vehicle(&self, on_change: VehicleCallback);

    /// The vehicle context as last seen upstream
    fn current_vehicle(&self) -> Option<String>;

    /// Run the delivery loop until `shutdown` fires or the source disconnects.
    async fn listen(&self, poll_rate: Duration, shutdown: CancellationToken) -> Result<()>;
}

/// Smallest interval a delivery loop will tick at.
pub(crate) const MIN_POLL_RATE: Duration = Duration::from_millis(1);

pub(crate) fn clamp_poll_rate(poll_rate: Duration) -> Duration {
    poll_rate.max(MIN_POLL_RATE)
}
