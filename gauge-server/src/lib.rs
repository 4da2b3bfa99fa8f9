//! # gauge-server
//!
//! The OpenGauge server process: one live data source, any number of gauge
//! rendering clients, and the session protocol that keeps every client's
//! vehicle context and variable set consistent with the source.
//!
//! - [`GaugeServer`]: builds and runs the whole pipeline from a
//!   [`ServerConfig`].
//! - [`Orchestrator`]: the per-session Init/ReInit state machine.
//! - [`console`]: the operator's stdin commands.
//! - [`logging`]: tracing subscriber setup.

pub mod app;
pub mod cli;
pub mod config;
pub mod console;
pub mod error;
pub mod logging;
pub mod orchestrator;

pub use app::{connect_with_retry, GaugeServer};
pub use cli::Cli;
pub use config::{BindConfig, ServerConfig, DEFAULT_CONFIG_PATH};
pub use error::{Result, ServerError};
pub use logging::{init_logging, LoggingMode};
pub use orchestrator::{Orchestrator, SessionState};
