//! # data-source
//!
//! The capability interface between the OpenGauge server and whatever produces
//! live values: a flight simulator, an emulator of one, or something unrelated
//! such as host CPU metrics.
//!
//! # Overview
//!
//! - [`DataSource`]: the trait every adapter implements. It covers connecting,
//!   registering interest in variables and in vehicle-context changes, and
//!   running the delivery loop.
//! - [`VarTable`]: bookkeeping shared by adapters so that several registrations
//!   for the same [`VariableKey`] never duplicate upstream work.
//! - [`SourceRegistry`]: a static name-to-constructor table populated at
//!   startup. Adapters are selected by name from configuration.
//!
//! # Example
//!
//! ```rust,ignore
//! use data_source::SourceRegistry;
//! use gauge_protocol::VariableKey;
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! let source = SourceRegistry::with_builtin().create("emulator", None)?;
//! source.connect().await?;
//!
//! let key = VariableKey::new("INDICATED ALTITUDE", Some("feet"));
//! source.subscribe_var(&key, Arc::new(|value| println!("altitude: {value}")))?;
//!
//! source.listen(Duration::from_millis(100), CancellationToken::new()).await?;
//! ```

pub mod adapters;
pub mod error;
pub mod registry;
pub mod source;
pub mod var_table;

pub use adapters::{CpuSource, EmulatorOptions, EmulatorSource};
pub use error::{Result, SourceError};
pub use registry::{SourceConstructor, SourceRegistry};
pub use source::{DataSource, ValueCallback, VehicleCallback};
pub use var_table::VarTable;

pub use gauge_protocol::VariableKey;
