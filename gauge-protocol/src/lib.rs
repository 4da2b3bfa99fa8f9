//! # gauge-protocol
//!
//! The wire vocabulary spoken between the OpenGauge server and its rendering
//! clients.
//!
//! Every message is a single JSON object on its own line, UTF-8 encoded, with a
//! `type` discriminator and a `payload`:
//!
//! ```text
//! {"type":"Init","payload":{"vehicleName":"Cessna Skyhawk","vars":[{"name":"INDICATED ALTITUDE","unit":"feet"}],"events":[]}}
//! {"type":"Var","payload":{"name":"INDICATED ALTITUDE","unit":"feet","value":1042.0}}
//! ```
//!
//! The crate has no knowledge of sockets or data sources. It only provides:
//!
//! - [`Message`]: the tagged union over `Init`, `ReInit`, `Var` and `Event`
//! - [`VariableKey`]: case-insensitive identity of a (name, unit) pair
//! - [`encode_line`] / [`decode_line`]: the newline-delimited JSON codec

pub mod codec;
pub mod error;
pub mod key;
pub mod message;

pub use codec::{decode_line, encode_line};
pub use error::{ProtocolError, Result};
pub use key::VariableKey;
pub use message::{EventPayload, InitPayload, Message, MessageKind, VarDef, VarPayload};
