//! Action execution engine.
//!
//! Runs one trigger's action list strictly in order, each action
//! finishing before the next starts.  A fault in one action is caught
//! here, reported as an `error` event, and the sequence moves on; every
//! action produces exactly one `action_executed` event either way.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use log::{info, warn};

use super::events::OutboundEvent;
use super::model::{Action, ActionKind, HttpRequest, OutputState};
use super::ports::{EventSink, HttpPort};
use crate::drivers::gpio::HardwareIo;
use crate::error::ActionFault;

/// Granularity at which a `delay` action checks for shutdown.
const DELAY_SLICE: Duration = Duration::from_millis(20);

pub struct ActionEngine {
    hw: Arc<HardwareIo>,
    http: Arc<dyn HttpPort>,
    sink: Arc<dyn EventSink>,
    shutdown: Arc<AtomicBool>,
}

impl ActionEngine {
    pub fn new(
        hw: Arc<HardwareIo>,
        http: Arc<dyn HttpPort>,
        sink: Arc<dyn EventSink>,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            hw,
            http,
            sink,
            shutdown,
        }
    }

    /// Execute `actions` in order.  Returns `true` only if every action
    /// succeeded.
    pub fn run_sequence(&self, trigger_id: &str, trigger_name: &str, actions: &[Action]) -> bool {
        info!(
            "Actions: '{}' running {} action(s)",
            trigger_name,
            actions.len()
        );
        let mut all_ok = true;
        for action in actions {
            let success = match self.execute(action) {
                Ok(success) => success,
                Err(fault) => {
                    warn!("Actions: '{}' failed: {}", action.name, fault);
                    self.sink.emit(OutboundEvent::error_report(
                        fault.to_string(),
                        &[("action", &action.name), ("trigger", trigger_id)],
                    ));
                    false
                }
            };
            self.sink.emit(OutboundEvent::ActionExecuted {
                trigger_id: trigger_id.to_string(),
                action_id: action.id.clone(),
                action_name: action.name.clone(),
                success,
            });
            all_ok &= success;
        }
        info!(
            "Actions: '{}' finished ({})",
            trigger_name,
            if all_ok { "ok" } else { "with failures" }
        );
        all_ok
    }

    /// `Ok(false)` is a clean failure (non-2xx response); `Err` is a fault.
    fn execute(&self, action: &Action) -> Result<bool, ActionFault> {
        match &action.kind {
            ActionKind::SetOutput {
                pin,
                state,
                duration_ms,
            } => {
                match (*state, *duration_ms) {
                    (OutputState::Toggle, _) => self.hw.toggle_output(*pin).map(|_| ())?,
                    (state, Some(ms)) => self.hw.pulse_output(*pin, state == OutputState::High, ms)?,
                    (state, None) => self.hw.set_output(*pin, state == OutputState::High)?,
                }
                Ok(true)
            }
            ActionKind::HttpCall(request) => self.http_call(request),
            ActionKind::Delay { duration_ms } => {
                self.delay(Duration::from_millis(*duration_ms))?;
                Ok(true)
            }
        }
    }

    fn http_call(&self, request: &HttpRequest) -> Result<bool, ActionFault> {
        let status = self.http.send(request)?;
        let ok = (200..300).contains(&status);
        if !ok {
            warn!(
                "Actions: HTTP {} {} answered {}",
                request.method, request.url, status
            );
        }
        Ok(ok)
    }

    /// Sleep for `duration`, returning early if shutdown is requested.
    fn delay(&self, duration: Duration) -> Result<(), ActionFault> {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown.load(Ordering::Acquire) {
                return Err(ActionFault::Interrupted);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            thread::sleep(DELAY_SLICE.min(deadline - now));
        }
    }
}
