//! Hardware event inbox.
//!
//! Edge events are produced by:
//! - the input sampler thread (real backend)
//! - `HardwareIo::simulate_edge` (simulation and tests)
//!
//! and consumed by the trigger dispatcher thread, one at a time in
//! arrival order.
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌──────────────────┐
//! │ Sampler     │────▶│              │     │                  │
//! │ simulate    │────▶│   Inbox      │────▶│ Edge dispatcher  │
//! │ Shutdown    │────▶│ (bounded)    │     │ (TriggerRegistry)│
//! └─────────────┘     └──────────────┘     └──────────────────┘
//! ```

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;

/// Maximum number of pending hardware events.
pub const INBOX_DEPTH: usize = 32;

/// Events posted by the hardware layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareEvent {
    /// An input edge passed the edge/debounce filter.  `epoch` is the
    /// subscription generation it was accepted under; a teardown starts
    /// a new one.
    Edge { pin: u8, level: bool, epoch: u64 },
    /// Ask the dispatcher to exit.
    Shutdown,
}

/// Bounded channel between edge producers and the dispatcher.
pub type HardwareInbox = Channel<CriticalSectionRawMutex, HardwareEvent, INBOX_DEPTH>;

/// Post an event without blocking.  Returns `false` if the inbox is full
/// (event dropped).
pub fn post(inbox: &HardwareInbox, event: HardwareEvent) -> bool {
    if inbox.try_send(event).is_err() {
        log::warn!("HW: inbox full, dropping {:?}", event);
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn post_and_receive_in_order() {
        let inbox = HardwareInbox::new();
        assert!(post(&inbox, HardwareEvent::Edge { pin: 17, level: false, epoch: 0 }));
        assert!(post(&inbox, HardwareEvent::Shutdown));
        assert_eq!(
            inbox.try_receive().ok(),
            Some(HardwareEvent::Edge { pin: 17, level: false, epoch: 0 })
        );
        assert_eq!(inbox.try_receive().ok(), Some(HardwareEvent::Shutdown));
        assert!(inbox.try_receive().is_err());
    }

    #[test]
    fn full_inbox_drops() {
        let inbox = HardwareInbox::new();
        for _ in 0..INBOX_DEPTH {
            assert!(post(&inbox, HardwareEvent::Edge { pin: 1, level: true, epoch: 0 }));
        }
        assert!(!post(&inbox, HardwareEvent::Edge { pin: 2, level: true, epoch: 0 }));
    }
}
