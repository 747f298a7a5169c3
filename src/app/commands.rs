//! Inbound commands to the application core.
//!
//! These represent requests from the control server that the
//! [`TriggerRegistry`](super::triggers::TriggerRegistry) interprets and
//! acts upon.  Heartbeat replies and server errors never get this far;
//! the connection agent handles them itself.

use serde_json::Value;

use super::model::DeviceConfig;

/// Commands that the connection agent forwards into the application core.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlCommand {
    /// Replace the loaded configuration.  `None` means the server does not
    /// know this device: every trigger is retired.
    LoadConfig(Option<DeviceConfig>),

    /// Fire one trigger now.  `actions` is the raw inline action list the
    /// server sent along; it is only used when `trigger_id` is not loaded.
    ExecuteTrigger {
        trigger_id: String,
        trigger_name: Option<String>,
        actions: Vec<Value>,
    },
}

impl ControlCommand {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::LoadConfig(_) => "load-config",
            Self::ExecuteTrigger { .. } => "execute-trigger",
        }
    }
}
