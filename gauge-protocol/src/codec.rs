//! Newline-delimited JSON framing.

use crate::error::{ProtocolError, Result};
use crate::message::Message;

/// Serialize a message as one line, including the trailing `\n`.
pub fn encode_line(message: &Message) -> Result<String> {
    let mut line = serde_json::to_string(message).map_err(|source| ProtocolError::Encode {
        kind: message.kind().as_str(),
        source,
    })?;
    line.push('\n');
    Ok(line)
}

/// Parse one received line. Surrounding whitespace (including `\r`) is ignored.
pub fn decode_line(line: &str) -> Result<Message> {
    serde_json::from_str(line.trim()).map_err(|source| ProtocolError::MalformedMessage { source })
}
