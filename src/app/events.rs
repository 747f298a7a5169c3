//! Outbound events emitted by the application core.
//!
//! These are the only values that reach the wire.  Each variant
//! serializes to one JSON object tagged by `type`; the connection layer
//! stamps `deviceId` onto it before sending.

use serde::Serialize;
use serde_json::{Map, Value};

/// Events the agent reports to the control server.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum OutboundEvent {
    /// First message of every session.
    #[serde(rename = "register")]
    Registration { hostname: String, ip_address: String },

    /// Periodic keep-alive.
    #[serde(rename = "ping")]
    Heartbeat,

    /// A trigger was activated; its actions are about to run.
    #[serde(rename = "trigger_fired")]
    TriggerFired {
        trigger_id: String,
        trigger_name: String,
    },

    /// One action of a sequence finished.
    #[serde(rename = "action_executed")]
    ActionExecuted {
        trigger_id: String,
        action_id: String,
        action_name: String,
        success: bool,
    },

    /// A fault contained somewhere in the agent.
    #[serde(rename = "error")]
    ErrorReport { error: String, context: Value },
}

impl OutboundEvent {
    /// Build an [`ErrorReport`](Self::ErrorReport) with a flat string context.
    pub fn error_report(error: impl Into<String>, context: &[(&str, &str)]) -> Self {
        let context: Map<String, Value> = context
            .iter()
            .map(|(k, v)| ((*k).to_string(), Value::String((*v).to_string())))
            .collect();
        Self::ErrorReport {
            error: error.into(),
            context: Value::Object(context),
        }
    }

    /// Wire name of the event (`type` field).
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Registration { .. } => "register",
            Self::Heartbeat => "ping",
            Self::TriggerFired { .. } => "trigger_fired",
            Self::ActionExecuted { .. } => "action_executed",
            Self::ErrorReport { .. } => "error",
        }
    }
}
