//! Outbound event queue between the domain and the connection task.
//!
//! Uses an `embassy-sync` bounded channel so that producers on any
//! thread (action workers, the edge dispatcher) can enqueue without
//! blocking, while the writer task on the connection executor awaits
//! the next event and wakes the moment one is pushed.
//!
//! ```text
//! ┌──────────────┐  OutboundEvent  ┌──────────────┐
//! │ ActionEngine │───────────────▶│              │
//! │ Registry     │───────────────▶│ OutboundQueue │──▶ writer task
//! └──────────────┘                 └──────────────┘
//! ```
//!
//! While no session is `Active` the queue is closed: events are dropped
//! at `emit`, never buffered for a later connection.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use log::{debug, warn};

use crate::app::events::OutboundEvent;
use crate::app::ports::EventSink;

/// Maximum number of events waiting for the writer task.
pub const OUTBOUND_DEPTH: usize = 64;

pub struct OutboundQueue {
    channel: Channel<CriticalSectionRawMutex, OutboundEvent, OUTBOUND_DEPTH>,
    active: AtomicBool,
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl OutboundQueue {
    pub const fn new() -> Self {
        Self {
            channel: Channel::new(),
            active: AtomicBool::new(false),
        }
    }

    /// Open or close the queue.  Closing discards anything still pending.
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
        if !active {
            self.drain();
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Wait for the next event.
    pub async fn next(&self) -> OutboundEvent {
        self.channel.receive().await
    }

    pub fn try_next(&self) -> Option<OutboundEvent> {
        self.channel.try_receive().ok()
    }

    /// Discard everything pending; returns how many events were dropped.
    pub fn drain(&self) -> usize {
        let mut dropped = 0;
        while self.channel.try_receive().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Link: discarded {} queued event(s)", dropped);
        }
        dropped
    }
}

impl EventSink for OutboundQueue {
    fn emit(&self, event: OutboundEvent) {
        if !self.is_active() {
            debug!("Link: not connected, dropping {}", event.kind());
            return;
        }
        if let Err(embassy_sync::channel::TrySendError::Full(event)) = self.channel.try_send(event) {
            warn!("Link: outbound queue full, dropping {}", event.kind());
        }
    }
}
