//! Logging setup for the OpenGauge server
//!
//! Call [`init_logging`] once, early in `main`, before anything logs.

use tracing_subscriber::{fmt, EnvFilter, Registry};

/// Logging mode for different use cases
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoggingMode {
    /// No output
    Silent,
    /// Compact stderr output, `info` and above
    Development,
    /// Verbose diagnostics with source locations
    Debug,
}

impl LoggingMode {
    /// `Debug` when the config asks for diagnostics, `Development` otherwise
    pub fn from_debug_flag(debug: bool) -> Self {
        if debug {
            LoggingMode::Debug
        } else {
            LoggingMode::Development
        }
    }
}

/// Logging configuration error
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Failed to initialize tracing subscriber: {0}")]
    TracingInit(String),
}

/// Initialize logging with the specified mode
///
/// # Environment Variables
///
/// - `OPENGAUGE_LOG_LEVEL`: filter directive, e.g. `debug` or
///   `var_manager=trace,info`
/// - `RUST_LOG`: used when `OPENGAUGE_LOG_LEVEL` is unset
pub fn init_logging(mode: LoggingMode) -> Result<(), LoggingError> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    match mode {
        LoggingMode::Silent => Ok(()),
        LoggingMode::Development => {
            let filter = create_env_filter("info");

            Registry::default()
                .with(
                    fmt::layer()
                        .with_target(false)
                        .with_thread_ids(false)
                        .with_file(false)
                        .with_line_number(false)
                        .compact(),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
        LoggingMode::Debug => {
            let filter = create_env_filter("debug");

            Registry::default()
                .with(
                    fmt::layer()
                        .with_thread_ids(true)
                        .with_file(true)
                        .with_line_number(true),
                )
                .with(filter)
                .try_init()
                .map_err(|e| LoggingError::TracingInit(e.to_string()))
        }
    }
}

/// First try OPENGAUGE_LOG_LEVEL, then RUST_LOG, then the mode default
fn create_env_filter(default_level: &str) -> EnvFilter {
    if let Ok(level) = std::env::var("OPENGAUGE_LOG_LEVEL") {
        EnvFilter::new(level)
    } else if let Ok(rust_log) = std::env::var("RUST_LOG") {
        EnvFilter::new(rust_log)
    } else {
        EnvFilter::new(default_level)
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    tracing::dispatcher::has_been_set()
}
