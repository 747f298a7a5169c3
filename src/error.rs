//! Unified error types for the agent.
//!
//! A single `Error` enum that every subsystem can convert into, one
//! variant per fault class.  Each class is contained at its own boundary:
//! a configuration error skips one trigger or action, a transport fault
//! ends one connection session, an action fault fails one action, and a
//! remote reject is only logged.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level agent error
// ---------------------------------------------------------------------------

/// Every fallible operation in the agent funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// Malformed trigger, action or process configuration.
    Config(ConfigError),
    /// A pin operation failed or was rejected by the backend.
    Hardware(HardwareError),
    /// The server connection failed, closed, or sent an undecodable frame.
    Transport(TransportError),
    /// An individual action raised while executing.
    Action(ActionFault),
    /// The server answered with an explicit error message.
    RemoteReject(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(e) => write!(f, "config: {e}"),
            Self::Hardware(e) => write!(f, "hardware: {e}"),
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Action(e) => write!(f, "action: {e}"),
            Self::RemoteReject(msg) => write!(f, "server rejected: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A required field is missing or has the wrong JSON type.
    Malformed(String),
    /// The `type` field names a kind this agent does not know.
    UnknownKind(String),
    /// Cron expression could not be reduced to a daily time-of-day.
    InvalidSchedule(String),
    /// A value is outside its allowed range.
    OutOfRange(&'static str),
    /// A required process setting is absent.
    Missing(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed(msg) => write!(f, "malformed: {msg}"),
            Self::UnknownKind(kind) => write!(f, "unknown type '{kind}'"),
            Self::InvalidSchedule(expr) => write!(f, "invalid cron expression '{expr}'"),
            Self::OutOfRange(what) => write!(f, "{what} out of range"),
            Self::Missing(what) => write!(f, "{what} is required"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        Self::Malformed(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Hardware errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HardwareError {
    /// Pin number is not valid on this platform.
    PinOutOfRange(u8),
    /// Physical header pin has no GPIO function (BOARD numbering).
    NotAGpio(u8),
    /// The backend could not export / configure the pin.
    Setup { pin: u8, reason: String },
    /// A level read failed.
    ReadFailed { pin: u8, reason: String },
    /// A level write failed.
    WriteFailed { pin: u8, reason: String },
}

impl fmt::Display for HardwareError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PinOutOfRange(pin) => write!(f, "GPIO {pin} out of range"),
            Self::NotAGpio(pin) => write!(f, "header pin {pin} is not a GPIO"),
            Self::Setup { pin, reason } => write!(f, "GPIO {pin} setup failed: {reason}"),
            Self::ReadFailed { pin, reason } => write!(f, "GPIO {pin} read failed: {reason}"),
            Self::WriteFailed { pin, reason } => write!(f, "GPIO {pin} write failed: {reason}"),
        }
    }
}

impl std::error::Error for HardwareError {}

impl From<HardwareError> for Error {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection attempt failed.
    ConnectFailed(String),
    /// The peer closed the channel (or it was closed locally).
    Closed,
    /// Reading or writing the channel failed.
    Io(String),
    /// An inbound frame could not be decoded.
    Decode(String),
    /// An outbound message could not be encoded.
    Encode(String),
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectFailed(msg) => write!(f, "connect failed: {msg}"),
            Self::Closed => write!(f, "connection closed"),
            Self::Io(msg) => write!(f, "I/O error: {msg}"),
            Self::Decode(msg) => write!(f, "decode failed: {msg}"),
            Self::Encode(msg) => write!(f, "encode failed: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Action faults
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionFault {
    /// Driving an output pin failed.
    Hardware(HardwareError),
    /// The HTTP request could not be built or sent (network, timeout).
    Http(String),
    /// A delay was cut short by shutdown.
    Interrupted,
}

impl fmt::Display for ActionFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hardware(e) => write!(f, "{e}"),
            Self::Http(msg) => write!(f, "HTTP request failed: {msg}"),
            Self::Interrupted => write!(f, "interrupted by shutdown"),
        }
    }
}

impl std::error::Error for ActionFault {}

impl From<HardwareError> for ActionFault {
    fn from(e: HardwareError) -> Self {
        Self::Hardware(e)
    }
}

impl From<ActionFault> for Error {
    fn from(e: ActionFault) -> Self {
        Self::Action(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Agent-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
