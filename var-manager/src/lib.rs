//! # var-manager
//!
//! The subscription manager sits between the network layer and the process's
//! single [`DataSource`](data_source::DataSource).
//!
//! It keeps one upstream registration per [`VariableKey`] no matter how many
//! sessions hold the key, remembers the last value delivered for each key,
//! lets an operator force a value or a vehicle context for debugging, and
//! tracks the vehicle context so that it is always current before anyone is
//! told that it changed.
//!
//! ```rust,ignore
//! use var_manager::SubscriptionManager;
//!
//! let manager = SubscriptionManager::new(source);
//! manager.subscribe_var(&key, session_id, Arc::new(|key, value| {
//!     println!("{key} = {value}");
//! }))?;
//!
//! manager.force_value(&key, json!(1500));
//! assert_eq!(manager.resolve(&key), json!(1500));
//! ```

pub mod error;
pub mod manager;
pub mod value;

pub use error::{Result, VarManagerError};
pub use manager::{HolderId, ResolvedCallback, SubscriptionManager, WATCH_LINE_LIMIT};
pub use value::coerce_numeric;
