//! Port traits: the hexagonal boundary between domain logic and the outside world.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ HardwareIo / ActionEngine / TriggerRegistry
//! ```
//!
//! Driven adapters (pin backends, HTTP client, event sinks) implement
//! these traits.  The domain core holds them as `Arc<dyn ...>` so one
//! instance can be shared by the connection thread, the dispatcher and
//! every action worker.

use crate::app::commands::ControlCommand;
use crate::app::events::OutboundEvent;
use crate::app::model::HttpRequest;
use crate::drivers::gpio::Pull;
use crate::error::{ActionFault, HardwareError};

// ───────────────────────────────────────────────────────────────
// Pin backend (driven adapter: domain → GPIO)
// ───────────────────────────────────────────────────────────────

/// Raw pin access.  Pin numbers are as configured by the server; the
/// backend resolves them to physical lines.
pub trait PinBackend: Send + Sync {
    /// Short name for logs ("simulated", "sysfs").
    fn name(&self) -> &'static str;

    /// Reject pins that do not exist on this platform.
    fn validate_pin(&self, pin: u8) -> Result<(), HardwareError>;

    /// Claim `pin` as an input with the requested pull resistor.
    fn setup_input(&self, pin: u8, pull: Pull) -> Result<(), HardwareError>;

    /// Claim `pin` as an output and drive `level` immediately.
    fn setup_output(&self, pin: u8, level: bool) -> Result<(), HardwareError>;

    /// Drive an already-claimed output.
    fn write(&self, pin: u8, level: bool) -> Result<(), HardwareError>;

    /// Read the current line level.
    fn read(&self, pin: u8) -> Result<bool, HardwareError>;

    /// Release every claimed pin.
    fn release_all(&self);

    /// Whether input edges must be detected by polling [`read`](Self::read).
    fn needs_sampling(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Outbound HTTP (driven adapter: domain → network)
// ───────────────────────────────────────────────────────────────

/// Performs `http-call` actions.
pub trait HttpPort: Send + Sync {
    /// Send the request and return the response status code.
    /// Transport failures and timeouts are `Err`.
    fn send(&self, request: &HttpRequest) -> Result<u16, ActionFault>;
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → server / log)
// ───────────────────────────────────────────────────────────────

/// The domain emits [`OutboundEvent`]s through this port.  Adapters
/// decide where they go (the server connection, the log, a test recorder).
///
/// `emit` never blocks; an adapter that cannot deliver drops the event.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: OutboundEvent);
}

impl<T: EventSink + ?Sized> EventSink for std::sync::Arc<T> {
    fn emit(&self, event: OutboundEvent) {
        (**self).emit(event);
    }
}

// ───────────────────────────────────────────────────────────────
// Control handler (driving adapter: server → domain)
// ───────────────────────────────────────────────────────────────

/// Receives decoded server commands.  Implemented by the trigger
/// registry; the connection agent knows nothing else about it.
pub trait ControlHandler: Send + Sync {
    fn handle(&self, command: ControlCommand);
}

// ───────────────────────────────────────────────────────────────
// Scheduler delegate (decouples scheduler from trigger firing)
// ───────────────────────────────────────────────────────────────

/// Callback trait that the scheduler invokes when an entry is due.
///
/// This decouples the [`Scheduler`](crate::scheduler::Scheduler) from the
/// trigger registry; the scheduler itself knows nothing about actions.
pub trait SchedulerDelegate {
    /// Called once per due entry with the owning trigger's id.
    fn on_schedule_fired(&mut self, trigger_id: &str);
}

// ───────────────────────────────────────────────────────────────
// Wall clock (driven adapter: domain ← system time)
// ───────────────────────────────────────────────────────────────

/// Local wall-clock time for daily schedules.
pub trait Clock: Send + Sync {
    /// Current local time, or `None` if the clock is not yet trustworthy
    /// (e.g. a board without RTC before NTP sync).
    fn now(&self) -> Option<chrono::NaiveDateTime>;
}
