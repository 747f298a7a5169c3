//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing every outbound event to the log.
//! Used when the agent runs without a server connection (`--dry-run`)
//! and as a tee next to the real connection queue.

use log::info;

use crate::app::events::OutboundEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`OutboundEvent`].
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&self, event: OutboundEvent) {
        match event {
            OutboundEvent::Registration {
                hostname,
                ip_address,
            } => info!("EVENT | register host={} ip={}", hostname, ip_address),
            OutboundEvent::Heartbeat => info!("EVENT | ping"),
            OutboundEvent::TriggerFired {
                trigger_id,
                trigger_name,
            } => info!("EVENT | trigger_fired '{}' ({})", trigger_name, trigger_id),
            OutboundEvent::ActionExecuted {
                trigger_id,
                action_name,
                success,
                ..
            } => info!(
                "EVENT | action_executed '{}' of {} -> {}",
                action_name,
                trigger_id,
                if success { "ok" } else { "FAILED" }
            ),
            OutboundEvent::ErrorReport { error, context } => {
                info!("EVENT | error '{}' context={}", error, context);
            }
        }
    }
}

/// Fan an event out to two sinks.
pub struct TeeSink<A, B>(pub A, pub B);

impl<A: EventSink, B: EventSink> EventSink for TeeSink<A, B> {
    fn emit(&self, event: OutboundEvent) {
        self.0.emit(event.clone());
        self.1.emit(event);
    }
}
