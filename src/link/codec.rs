//! JSON message codec.
//!
//! Every frame on the control connection is one JSON object with a
//! `type` discriminator.
//!
//! ```text
//!  inbound:  config | config_update | execute_trigger | pong | error
//!  outbound: register | ping | trigger_fired | action_executed | error
//! ```
//!
//! Outbound objects carry the sender's `deviceId`; inbound objects are
//! decoded leniently (unknown fields ignored, unknown types reported as
//! [`InboundMessage::Unrecognized`]).

use serde_json::Value;

use crate::app::commands::ControlCommand;
use crate::app::events::OutboundEvent;
use crate::app::model::DeviceConfig;
use crate::error::TransportError;

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// Forwarded to the application core.
    Command(ControlCommand),
    /// Heartbeat acknowledgment.
    Pong,
    /// The server reported an error.
    ServerError(String),
    /// A well-formed frame of a type this agent does not handle.
    Unrecognized(String),
}

/// Decode one inbound text frame.
pub fn decode_inbound(text: &str) -> Result<InboundMessage, TransportError> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| TransportError::Decode(e.to_string()))?;
    let Value::Object(mut obj) = value else {
        return Err(TransportError::Decode("frame is not a JSON object".into()));
    };
    let kind = match obj.get("type") {
        Some(Value::String(kind)) => kind.clone(),
        _ => return Err(TransportError::Decode("missing 'type'".into())),
    };

    let message = match kind.as_str() {
        "config" | "config_update" => {
            let config = match obj.remove("config") {
                None | Some(Value::Null) => None,
                Some(v) => Some(
                    DeviceConfig::from_value(v)
                        .map_err(|e| TransportError::Decode(format!("{kind}: {e}")))?,
                ),
            };
            InboundMessage::Command(ControlCommand::LoadConfig(config))
        }
        "execute_trigger" => {
            let trigger_id = match obj.get("triggerId") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(Value::Number(n)) => n.to_string(),
                _ => return Err(TransportError::Decode("execute_trigger: missing 'triggerId'".into())),
            };
            let trigger_name = obj
                .get("triggerName")
                .and_then(Value::as_str)
                .map(str::to_string);
            let actions = match obj.remove("actions") {
                None | Some(Value::Null) => Vec::new(),
                Some(Value::Array(actions)) => actions,
                Some(_) => {
                    return Err(TransportError::Decode(
                        "execute_trigger: 'actions' must be an array".into(),
                    ));
                }
            };
            InboundMessage::Command(ControlCommand::ExecuteTrigger {
                trigger_id,
                trigger_name,
                actions,
            })
        }
        "pong" => InboundMessage::Pong,
        "error" => InboundMessage::ServerError(
            obj.get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified")
                .to_string(),
        ),
        _ => InboundMessage::Unrecognized(kind),
    };
    Ok(message)
}

/// Encode an outbound event, stamping it with `device_id`.
pub fn encode_outbound(device_id: &str, event: &OutboundEvent) -> Result<String, TransportError> {
    let mut value = serde_json::to_value(event).map_err(|e| TransportError::Encode(e.to_string()))?;
    if let Value::Object(map) = &mut value {
        map.insert("deviceId".into(), Value::String(device_id.to_string()));
    }
    serde_json::to_string(&value).map_err(|e| TransportError::Encode(e.to_string()))
}
