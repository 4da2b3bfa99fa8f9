//! Message kinds and payload shapes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::key::VariableKey;

/// A single protocol message.
///
/// Decoded once via the `type` discriminator; the payload is never kept as an
/// untyped object after that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Message {
    /// Client: "this is my vehicle and what I want". Server: "context accepted".
    Init(InitPayload),
    /// Server: "the authoritative context differs, start again".
    ReInit(InitPayload),
    /// Server: one resolved value.
    Var(VarPayload),
    /// Reserved for discrete triggers.
    Event(EventPayload),
}

/// Discriminator of a [`Message`], handy for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Init,
    ReInit,
    Var,
    Event,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Init => "Init",
            MessageKind::ReInit => "ReInit",
            MessageKind::Var => "Var",
            MessageKind::Event => "Event",
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    /// Server acknowledgement of an accepted context
    pub fn init_ack(vehicle_name: Option<String>) -> Self {
        Message::Init(InitPayload::for_vehicle(vehicle_name))
    }

    /// Server request that every client re-initializes against `vehicle_name`
    pub fn re_init(vehicle_name: Option<String>) -> Self {
        Message::ReInit(InitPayload::for_vehicle(vehicle_name))
    }

    /// A resolved value for `key`
    pub fn var(key: &VariableKey, value: Value) -> Self {
        Message::Var(VarPayload {
            name: key.name().to_string(),
            unit: key.unit().map(str::to_string),
            value,
        })
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Init(_) => MessageKind::Init,
            Message::ReInit(_) => MessageKind::ReInit,
            Message::Var(_) => MessageKind::Var,
            Message::Event(_) => MessageKind::Event,
        }
    }
}

/// Payload of `Init` and `ReInit`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitPayload {
    /// The vehicle context the sender believes is active (`null` = unknown)
    #[serde(default)]
    pub vehicle_name: Option<String>,
    /// Variables the client wants delivered
    #[serde(default)]
    pub vars: Vec<VarDef>,
    /// Event names the client wants delivered
    #[serde(default)]
    pub events: Vec<String>,
}

impl InitPayload {
    /// A payload carrying only a vehicle context
    pub fn for_vehicle(vehicle_name: Option<String>) -> Self {
        Self {
            vehicle_name,
            vars: Vec::new(),
            events: Vec::new(),
        }
    }

    /// The distinct keys requested by this payload, in request order
    pub fn keys(&self) -> Vec<VariableKey> {
        let mut keys: Vec<VariableKey> = Vec::with_capacity(self.vars.len());
        for def in &self.vars {
            let key = def.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        keys
    }
}

/// A client's request for one variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarDef {
    pub name: String,
    #[serde(default)]
    pub unit: Option<String>,
    /// Client asked for each delivered value to be logged server-side
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
}

impl VarDef {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: Some(unit.into()),
            debug: None,
        }
    }

    pub fn key(&self) -> VariableKey {
        VariableKey::new(self.name.clone(), self.unit.clone())
    }

    pub fn is_debug(&self) -> bool {
        self.debug.unwrap_or(false)
    }
}

/// Payload of `Var`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarPayload {
    pub name: String,
    pub unit: Option<String>,
    pub value: Value,
}

impl VarPayload {
    pub fn key(&self) -> VariableKey {
        VariableKey::new(self.name.clone(), self.unit.clone())
    }
}

/// Payload of `Event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    pub name: String,
    #[serde(default)]
    pub value: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_client_init_shape() {
        let raw = json!({
            "type": "Init",
            "payload": {
                "vehicleName": "Cessna Skyhawk",
                "vars": [
                    {"name": "INDICATED ALTITUDE", "unit": "feet"},
                    {"name": "PLANE BANK DEGREES", "unit": "radians", "debug": true}
                ],
                "events": ["FLAPS_UP"]
            }
        });

        let message: Message = serde_json::from_value(raw).unwrap();
        match message {
            Message::Init(payload) => {
                assert_eq!(payload.vehicle_name.as_deref(), Some("Cessna Skyhawk"));
                assert_eq!(payload.vars.len(), 2);
                assert!(!payload.vars[0].is_debug());
                assert!(payload.vars[1].is_debug());
                assert_eq!(payload.events, vec!["FLAPS_UP".to_string()]);
            }
            other => panic!("Expected Init, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_payload_fields_default() {
        let message: Message =
            serde_json::from_str(r#"{"type":"Init","payload":{}}"#).unwrap();
        assert_eq!(message, Message::Init(InitPayload::default()));
    }

    #[test]
    fn test_server_messages_shape() {
        let value = serde_json::to_value(Message::re_init(Some("B".into()))).unwrap();
        assert_eq!(
            value,
            json!({"type": "ReInit", "payload": {"vehicleName": "B", "vars": [], "events": []}})
        );

        let key = VariableKey::new("ALT", Some("feet"));
        let value = serde_json::to_value(Message::var(&key, json!(1200.5))).unwrap();
        assert_eq!(
            value,
            json!({"type": "Var", "payload": {"name": "ALT", "unit": "feet", "value": 1200.5}})
        );
    }

    #[test]
    fn test_unknown_vehicle_is_null() {
        let value = serde_json::to_value(Message::init_ack(None)).unwrap();
        assert_eq!(value["payload"]["vehicleName"], Value::Null);
    }

    #[test]
    fn test_payload_keys_are_distinct() {
        let payload = InitPayload {
            vehicle_name: None,
            vars: vec![
                VarDef::new("ALT", "feet"),
                VarDef::new("alt", "FEET"),
                VarDef::new("ALT", "meters"),
            ],
            events: vec![],
        };
        assert_eq!(payload.keys().len(), 2);
    }

    #[test]
    fn test_kind() {
        assert_eq!(Message::init_ack(None).kind(), MessageKind::Init);
        assert_eq!(Message::re_init(None).kind().to_string(), "ReInit");
    }
}
