//! Trigger and action model.
//!
//! Configuration arrives as loosely-typed JSON.  It is parsed in two
//! stages: serde lifts each object into a raw envelope (`id`, `name`,
//! `type`, `config`), then the kind-specific `config` is validated into
//! a typed [`TriggerKind`] / [`ActionKind`].  A failure at either stage
//! skips only the offending trigger or action.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::drivers::gpio::{Edge, InputConfig, Pull};
use crate::error::ConfigError;
use crate::scheduler::DailyTime;

// ---------------------------------------------------------------------------
// Device configuration envelope
// ---------------------------------------------------------------------------

/// Body of a `config` / `config_update` message.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceConfig {
    #[serde(default = "unknown_device_name")]
    pub device_name: String,
    /// Raw trigger objects; parsed one by one so a bad entry is skipped
    /// on its own.
    #[serde(default)]
    pub triggers: Vec<Value>,
}

fn unknown_device_name() -> String {
    "Unknown".to_string()
}

impl DeviceConfig {
    pub fn from_value(value: Value) -> Result<Self, ConfigError> {
        Ok(serde_json::from_value(value)?)
    }
}

// ---------------------------------------------------------------------------
// Triggers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum TriggerKind {
    /// Fires on accepted edges of one input pin.
    HardwareEdge { pin: u8, input: InputConfig },
    /// Fires daily at a local time-of-day.
    Schedule(DailyTime),
    /// Fires only on explicit request from the server.
    RemoteCommand,
}

impl TriggerKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::HardwareEdge { .. } => "hardware-edge",
            Self::Schedule(_) => "schedule",
            Self::RemoteCommand => "remote-command",
        }
    }
}

/// A loaded trigger.  Immutable; replaced wholesale on reload.
#[derive(Debug, Clone, PartialEq)]
pub struct Trigger {
    pub id: String,
    pub name: String,
    pub kind: TriggerKind,
    pub actions: Vec<Action>,
}

/// An action that failed to parse, reported and left out of its trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAction {
    pub name: String,
    pub error: ConfigError,
}

#[derive(Deserialize)]
struct RawTrigger {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    actions: Vec<Value>,
}

impl Trigger {
    /// Parse one trigger object.  Bad actions are dropped and returned
    /// alongside; a bad trigger envelope or kind config fails the whole
    /// trigger.
    pub fn parse(value: &Value) -> Result<(Self, Vec<SkippedAction>), ConfigError> {
        let raw = RawTrigger::deserialize(value)?;
        let kind = match raw.kind.as_str() {
            "hardware-edge" | "gpio_input" => parse_edge(&raw.config)?,
            "schedule" => {
                let cron = raw
                    .config
                    .get("cron")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                TriggerKind::Schedule(DailyTime::parse_cron(cron)?)
            }
            "remote-command" | "api_call" => TriggerKind::RemoteCommand,
            other => return Err(ConfigError::UnknownKind(other.to_string())),
        };
        let (actions, skipped) = parse_actions(&raw.actions);
        let name = raw.name.unwrap_or_else(|| raw.id.clone());
        Ok((
            Self {
                id: raw.id,
                name,
                kind,
                actions,
            },
            skipped,
        ))
    }
}

fn parse_edge(config: &Value) -> Result<TriggerKind, ConfigError> {
    let pin = pin_field(config)?;
    let mut input = InputConfig::default();
    if let Some(edge) = opt_str(config, "edge")? {
        input.edge =
            Edge::parse(edge).ok_or_else(|| ConfigError::Malformed(format!("unknown edge '{edge}'")))?;
    }
    if let Some(pull) = opt_str(config, "pull")? {
        input.pull =
            Pull::parse(pull).ok_or_else(|| ConfigError::Malformed(format!("unknown pull '{pull}'")))?;
    }
    if let Some(debounce) = opt_millis(config, "debounce")? {
        input.debounce_ms = debounce;
    }
    Ok(TriggerKind::HardwareEdge { pin, input })
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    High,
    Low,
    Toggle,
}

/// Request performed by an `http-call` action.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    /// JSON body; `None` sends no body at all.
    pub body: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionKind {
    SetOutput {
        pin: u8,
        state: OutputState,
        duration_ms: Option<u64>,
    },
    HttpCall(HttpRequest),
    Delay {
        duration_ms: u64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub kind: ActionKind,
}

#[derive(Deserialize)]
struct RawAction {
    #[serde(deserialize_with = "id_string")]
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    config: Value,
    #[serde(default)]
    order: Option<i64>,
}

impl Action {
    pub fn parse(value: &Value) -> Result<Self, ConfigError> {
        Self::from_raw(RawAction::deserialize(value)?)
    }

    fn from_raw(raw: RawAction) -> Result<Self, ConfigError> {
        let kind = match raw.kind.as_str() {
            "set-output" | "gpio_output" => parse_set_output(&raw.config)?,
            "http-call" | "http_request" => ActionKind::HttpCall(parse_http(&raw.config)?),
            "delay" => ActionKind::Delay {
                duration_ms: opt_millis(&raw.config, "duration")?
                    .ok_or(ConfigError::Malformed("delay needs 'duration'".into()))?,
            },
            other => return Err(ConfigError::UnknownKind(other.to_string())),
        };
        let name = raw.name.unwrap_or_else(|| raw.id.clone());
        Ok(Self {
            id: raw.id,
            name,
            kind,
        })
    }
}

/// Parse an action list, sorting by `order` when present (stable, so
/// entries without `order` keep their wire position relative to each
/// other and sort first).
pub fn parse_actions(values: &[Value]) -> (Vec<Action>, Vec<SkippedAction>) {
    let mut raws = Vec::with_capacity(values.len());
    let mut skipped = Vec::new();
    for value in values {
        match RawAction::deserialize(value) {
            Ok(raw) => raws.push(raw),
            Err(e) => skipped.push(SkippedAction {
                name: display_name(value),
                error: e.into(),
            }),
        }
    }
    raws.sort_by_key(|r| r.order);

    let mut actions = Vec::with_capacity(raws.len());
    for raw in raws {
        let name = raw.name.clone().unwrap_or_else(|| raw.id.clone());
        match Action::from_raw(raw) {
            Ok(action) => actions.push(action),
            Err(error) => skipped.push(SkippedAction { name, error }),
        }
    }
    (actions, skipped)
}

fn parse_set_output(config: &Value) -> Result<ActionKind, ConfigError> {
    let pin = pin_field(config)?;
    let state = match opt_str(config, "state")? {
        Some(s) if s.eq_ignore_ascii_case("high") => OutputState::High,
        Some(s) if s.eq_ignore_ascii_case("low") => OutputState::Low,
        Some(s) if s.eq_ignore_ascii_case("toggle") => OutputState::Toggle,
        Some(other) => return Err(ConfigError::Malformed(format!("unknown state '{other}'"))),
        None => return Err(ConfigError::Malformed("set-output needs 'state'".into())),
    };
    // A zero duration means "no pulse".
    let duration_ms = opt_millis(config, "duration")?.filter(|d| *d > 0);
    Ok(ActionKind::SetOutput {
        pin,
        state,
        duration_ms,
    })
}

fn parse_http(config: &Value) -> Result<HttpRequest, ConfigError> {
    let url = opt_str(config, "url")?
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::Malformed("http-call needs 'url'".into()))?
        .to_string();
    let method = opt_str(config, "method")?
        .unwrap_or("POST")
        .to_ascii_uppercase();

    let headers = match config.get("headers") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Object(map)) => map
            .iter()
            .map(|(k, v)| {
                let v = match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (k.clone(), v)
            })
            .collect(),
        Some(_) => return Err(ConfigError::Malformed("'headers' must be an object".into())),
    };

    let body = match config.get("body") {
        None | Some(Value::Null) => None,
        Some(Value::Object(map)) if map.is_empty() => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(other) => Some(other.clone()),
    };

    Ok(HttpRequest {
        url,
        method,
        headers,
        body,
    })
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn pin_field(config: &Value) -> Result<u8, ConfigError> {
    let pin = config
        .get("pin")
        .and_then(Value::as_u64)
        .ok_or(ConfigError::Malformed("'pin' must be a non-negative integer".into()))?;
    u8::try_from(pin).map_err(|_| ConfigError::OutOfRange("pin"))
}

fn opt_str<'a>(config: &'a Value, key: &str) -> Result<Option<&'a str>, ConfigError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(ConfigError::Malformed(format!("'{key}' must be a string"))),
    }
}

fn opt_millis(config: &Value, key: &str) -> Result<Option<u64>, ConfigError> {
    match config.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(Some)
            .ok_or_else(|| ConfigError::Malformed(format!("'{key}' must be a non-negative number"))),
    }
}

/// Best-effort label for an object that failed to parse.
pub fn display_name(value: &Value) -> String {
    let field = |k: &str| value.get(k).and_then(Value::as_str).map(str::to_string);
    field("name")
        .or_else(|| field("id"))
        .unwrap_or_else(|| "<unnamed>".to_string())
}

/// Best-effort identifier for a trigger that failed to parse.
pub fn display_id(value: &Value) -> String {
    match value.get("id") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => display_name(value),
    }
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(serde::de::Error::custom("'id' must be a string or number")),
    }
}
