//! GPIO pin manager.
//!
//! Owns all software-side pin state: direction, last level, input edge
//! subscriptions and pending pulse timers.  Every mutation goes through
//! one table lock, so cancel-then-replace of a pulse timer on one pin is
//! atomic with respect to every other caller.
//!
//! ```text
//!  configure_input ──▶ ┌───────────┐ ◀── sampler thread (real backend)
//!  set/toggle/pulse ─▶ │ PinTable  │ ◀── simulate_edge
//!  pulse timer ─────▶ │ (Mutex)   │
//!                      └─────┬─────┘
//!                            │ accepted edges
//!                            ▼
//!                      HardwareInbox ──▶ edge dispatcher
//! ```
//!
//! Pending pulse reverts live in the table as deadlines.  One timer
//! thread per `HardwareIo` waits on a `Condvar` paired with the table
//! lock until the earliest deadline.  A newer write on the pin, or a
//! teardown, removes the deadline outright; the thread exits once no
//! deadline is left.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};

use crate::app::ports::PinBackend;
use crate::drivers::worker::spawn_worker;
use crate::error::HardwareError;
use crate::events::{self, HardwareEvent, HardwareInbox};

/// Stack size for the pulse timer thread.
const PULSE_STACK_KB: usize = 64;
/// Stack size for the input sampler.
const SAMPLER_STACK_KB: usize = 64;

// ---------------------------------------------------------------------------
// Input configuration
// ---------------------------------------------------------------------------

/// Input pull resistor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pull {
    #[default]
    Up,
    Down,
    Off,
}

impl Pull {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Some(Self::Up),
            "down" => Some(Self::Down),
            "off" | "none" => Some(Self::Off),
            _ => None,
        }
    }
}

/// Which level transitions fire a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Edge {
    Rising,
    #[default]
    Falling,
    Both,
}

impl Edge {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rising" => Some(Self::Rising),
            "falling" => Some(Self::Falling),
            "both" => Some(Self::Both),
            _ => None,
        }
    }

    /// Whether a transition *to* `level` matches this edge.
    pub fn accepts(self, level: bool) -> bool {
        match self {
            Self::Rising => level,
            Self::Falling => !level,
            Self::Both => true,
        }
    }
}

/// Input subscription parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputConfig {
    pub pull: Pull,
    pub edge: Edge,
    pub debounce_ms: u64,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            pull: Pull::Up,
            edge: Edge::Falling,
            debounce_ms: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Input,
    Output,
}

// ---------------------------------------------------------------------------
// Pin table
// ---------------------------------------------------------------------------

struct Subscription {
    edge: Edge,
    debounce: Duration,
    last_accepted: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct PendingPulse {
    due: Instant,
    revert_to: bool,
}

struct PinState {
    direction: Direction,
    level: bool,
    /// Scheduled end of a pulse, if any.
    pending: Option<PendingPulse>,
    subscription: Option<Subscription>,
}

impl PinState {
    fn output(level: bool) -> Self {
        Self {
            direction: Direction::Output,
            level,
            pending: None,
            subscription: None,
        }
    }
}

#[derive(Default)]
struct PinTable {
    pins: HashMap<u8, PinState>,
    /// The pulse timer thread is running.
    timer_active: bool,
    /// Bumped by every teardown.
    epoch: u64,
    sampler_active: bool,
}

impl PinTable {
    /// Run a raw level change through the edge and debounce filter.
    fn accept_edge(&mut self, pin: u8, level: bool, now: Instant) -> bool {
        let Some(state) = self.pins.get_mut(&pin) else {
            return false;
        };
        if state.direction != Direction::Input {
            return false;
        }
        state.level = level;
        let Some(sub) = state.subscription.as_mut() else {
            return false;
        };
        if !sub.edge.accepts(level) {
            return false;
        }
        if let Some(prev) = sub.last_accepted {
            if now.duration_since(prev) < sub.debounce {
                debug!("HW: GPIO {} edge inside debounce window, dropped", pin);
                return false;
            }
        }
        sub.last_accepted = Some(now);
        true
    }

    fn has_inputs(&self) -> bool {
        self.pins.values().any(|s| s.subscription.is_some())
    }

    /// Complete every pulse due at `now`; returns the earliest deadline
    /// still pending.
    fn expire_pulses(&mut self, backend: &dyn PinBackend, now: Instant) -> Option<Instant> {
        let mut next: Option<Instant> = None;
        for (pin, state) in &mut self.pins {
            let Some(pulse) = state.pending else {
                continue;
            };
            if pulse.due > now {
                next = Some(next.map_or(pulse.due, |n| n.min(pulse.due)));
                continue;
            }
            state.pending = None;
            match backend.write(*pin, pulse.revert_to) {
                Ok(()) => {
                    state.level = pulse.revert_to;
                    debug!("HW: GPIO {} pulse ended -> {}", pin, level_str(pulse.revert_to));
                }
                Err(e) => warn!("HW: pulse end on GPIO {} failed: {}", pin, e),
            }
        }
        next
    }
}

fn lock(table: &Mutex<PinTable>) -> MutexGuard<'_, PinTable> {
    table.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// HardwareIo
// ---------------------------------------------------------------------------

/// Shared pin manager.  One instance per process, behind an `Arc`.
pub struct HardwareIo {
    backend: Arc<dyn PinBackend>,
    table: Arc<Mutex<PinTable>>,
    /// Wakes the pulse timer when deadlines change.
    timer_wake: Arc<Condvar>,
    inbox: Arc<HardwareInbox>,
    sample_interval: Duration,
}

impl HardwareIo {
    pub fn new(backend: Arc<dyn PinBackend>, sample_interval: Duration) -> Self {
        info!("HW: using {} pin backend", backend.name());
        Self {
            backend,
            table: Arc::new(Mutex::new(PinTable::default())),
            timer_wake: Arc::new(Condvar::new()),
            inbox: Arc::new(HardwareInbox::new()),
            sample_interval,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// The channel accepted edges are posted to.
    pub fn inbox(&self) -> Arc<HardwareInbox> {
        Arc::clone(&self.inbox)
    }

    /// Post an event onto the inbox (used to stop the dispatcher).
    pub fn post(&self, event: HardwareEvent) -> bool {
        events::post(&self.inbox, event)
    }

    /// Subscribe to edges on `pin`, replacing any prior configuration.
    pub fn configure_input(&self, pin: u8, config: InputConfig) -> Result<(), HardwareError> {
        self.backend.validate_pin(pin)?;
        let mut table = lock(&self.table);
        self.backend.setup_input(pin, config.pull)?;
        let level = self.backend.read(pin).unwrap_or(false);
        table.pins.insert(
            pin,
            PinState {
                direction: Direction::Input,
                level,
                pending: None,
                subscription: Some(Subscription {
                    edge: config.edge,
                    debounce: Duration::from_millis(config.debounce_ms),
                    last_accepted: None,
                }),
            },
        );
        info!(
            "HW: GPIO {} input (pull {:?}, edge {:?}, debounce {}ms)",
            pin, config.pull, config.edge, config.debounce_ms
        );

        if self.backend.needs_sampling() && !table.sampler_active {
            self.start_sampler(&mut table);
        }
        Ok(())
    }

    /// Claim `pin` as an output.  An existing output keeps its level.
    pub fn configure_output(&self, pin: u8, initial: bool) -> Result<(), HardwareError> {
        self.backend.validate_pin(pin)?;
        let mut table = lock(&self.table);
        if let Some(state) = table.pins.get(&pin) {
            if state.direction == Direction::Output {
                return Ok(());
            }
        }
        self.backend.setup_output(pin, initial)?;
        table.pins.insert(pin, PinState::output(initial));
        info!("HW: GPIO {} output (initial {})", pin, level_str(initial));
        Ok(())
    }

    /// Drive `pin` to `level`, cancelling any pending pulse first.
    pub fn set_output(&self, pin: u8, level: bool) -> Result<(), HardwareError> {
        self.backend.validate_pin(pin)?;
        let mut table = lock(&self.table);
        self.drive(&mut table, pin, level)?;
        debug!("HW: GPIO {} -> {}", pin, level_str(level));
        Ok(())
    }

    /// Invert the last software-side level.  Returns the new level.
    pub fn toggle_output(&self, pin: u8) -> Result<bool, HardwareError> {
        self.backend.validate_pin(pin)?;
        let mut table = lock(&self.table);
        let current = table
            .pins
            .get(&pin)
            .filter(|s| s.direction == Direction::Output)
            .is_some_and(|s| s.level);
        self.drive(&mut table, pin, !current)?;
        debug!("HW: GPIO {} toggled -> {}", pin, level_str(!current));
        Ok(!current)
    }

    /// Drive `level` now and `!level` after `duration_ms`, unless a newer
    /// write to the pin arrives first.
    pub fn pulse_output(&self, pin: u8, level: bool, duration_ms: u64) -> Result<(), HardwareError> {
        self.backend.validate_pin(pin)?;
        let mut table = lock(&self.table);
        self.drive(&mut table, pin, level)?;

        let Some(due) = Instant::now().checked_add(Duration::from_millis(duration_ms)) else {
            warn!("HW: GPIO {} pulse of {}ms never ends, holding level", pin, duration_ms);
            return Ok(());
        };
        if let Some(state) = table.pins.get_mut(&pin) {
            state.pending = Some(PendingPulse {
                due,
                revert_to: !level,
            });
        }
        if table.timer_active {
            self.timer_wake.notify_one();
        } else if let Err(e) = self.start_pulse_timer(&mut table) {
            if let Some(state) = table.pins.get_mut(&pin) {
                state.pending = None;
            }
            return Err(HardwareError::WriteFailed {
                pin,
                reason: format!("pulse timer: {e}"),
            });
        }
        debug!("HW: GPIO {} pulse {} for {}ms", pin, level_str(level), duration_ms);
        Ok(())
    }

    /// Current hardware level of `pin`; `false` if it cannot be read.
    pub fn read_input(&self, pin: u8) -> bool {
        match self.backend.read(pin) {
            Ok(level) => level,
            Err(e) => {
                debug!("HW: {}", e);
                false
            }
        }
    }

    /// Last level written to an output pin, `None` if not an output.
    pub fn output_level(&self, pin: u8) -> Option<bool> {
        lock(&self.table)
            .pins
            .get(&pin)
            .filter(|s| s.direction == Direction::Output)
            .map(|s| s.level)
    }

    /// Whether `pin` currently has a pulse transition scheduled.
    pub fn has_pending_pulse(&self, pin: u8) -> bool {
        lock(&self.table)
            .pins
            .get(&pin)
            .is_some_and(|s| s.pending.is_some())
    }

    /// Number of pulse reverts waiting on the timer.
    pub fn pending_timers(&self) -> usize {
        lock(&self.table)
            .pins
            .values()
            .filter(|s| s.pending.is_some())
            .count()
    }

    /// Whether the pulse timer thread is running.
    pub fn pulse_timer_active(&self) -> bool {
        lock(&self.table).timer_active
    }

    /// Pins with an active edge subscription, sorted.
    pub fn subscribed_inputs(&self) -> Vec<u8> {
        let table = lock(&self.table);
        let mut pins: Vec<u8> = table
            .pins
            .iter()
            .filter(|(_, s)| s.subscription.is_some())
            .map(|(p, _)| *p)
            .collect();
        pins.sort_unstable();
        pins
    }

    /// Feed a raw level change through the edge/debounce filter.
    /// Returns `true` if an edge event was posted.
    pub fn simulate_edge(&self, pin: u8, level: bool) -> bool {
        let (accepted, epoch) = {
            let mut table = lock(&self.table);
            (table.accept_edge(pin, level, Instant::now()), table.epoch)
        };
        accepted && events::post(&self.inbox, HardwareEvent::Edge { pin, level, epoch })
    }

    /// Current subscription generation; edges from an older one are stale.
    pub fn epoch(&self) -> u64 {
        lock(&self.table).epoch
    }

    /// Cancel every pending timer and subscription and release all pins.
    pub fn teardown(&self) {
        let mut table = lock(&self.table);
        let released = table.pins.len();
        table.pins.clear();
        table.epoch += 1;
        self.timer_wake.notify_one();
        self.backend.release_all();
        if released > 0 {
            info!("HW: released {} pin(s)", released);
        }
    }

    // ── internals ────────────────────────────────────────────

    fn drive(&self, table: &mut PinTable, pin: u8, level: bool) -> Result<(), HardwareError> {
        match table.pins.get_mut(&pin) {
            Some(state) if state.direction == Direction::Output => {
                if state.pending.take().is_some() {
                    self.timer_wake.notify_one();
                }
                self.backend.write(pin, level)?;
                state.level = level;
            }
            _ => {
                self.backend.setup_output(pin, level)?;
                table.pins.insert(pin, PinState::output(level));
            }
        }
        Ok(())
    }

    fn start_pulse_timer(&self, table: &mut PinTable) -> std::io::Result<()> {
        let shared = Arc::clone(&self.table);
        let wake = Arc::clone(&self.timer_wake);
        let backend = Arc::clone(&self.backend);
        spawn_worker("gpio-pulse", PULSE_STACK_KB, move || {
            pulse_loop(&shared, &wake, backend.as_ref());
        })?;
        table.timer_active = true;
        Ok(())
    }

    fn start_sampler(&self, table: &mut PinTable) {
        let weak = Arc::downgrade(&self.table);
        let backend = Arc::clone(&self.backend);
        let inbox = Arc::clone(&self.inbox);
        let interval = self.sample_interval;
        match spawn_worker("gpio-sampler", SAMPLER_STACK_KB, move || {
            sample_loop(&weak, backend.as_ref(), &inbox, interval);
        }) {
            Ok(_) => table.sampler_active = true,
            Err(e) => error!("HW: input sampler spawn failed: {}", e),
        }
    }
}

/// Revert pulses as they come due.  Exits once nothing is pending.
fn pulse_loop(table: &Mutex<PinTable>, wake: &Condvar, backend: &dyn PinBackend) {
    debug!("HW: pulse timer started");
    let mut guard = lock(table);
    loop {
        let now = Instant::now();
        let Some(next) = guard.expire_pulses(backend, now) else {
            guard.timer_active = false;
            debug!("HW: pulse timer idle, stopped");
            return;
        };
        let timeout = next.saturating_duration_since(now);
        guard = match wake.wait_timeout(guard, timeout) {
            Ok((g, _)) => g,
            Err(poisoned) => poisoned.into_inner().0,
        };
    }
}

fn sample_loop(table: &Weak<Mutex<PinTable>>, backend: &dyn PinBackend, inbox: &HardwareInbox, interval: Duration) {
    info!("HW: input sampler started ({}ms)", interval.as_millis());
    loop {
        thread::sleep(interval);
        let Some(table) = table.upgrade() else {
            return;
        };
        let mut accepted = Vec::new();
        let epoch;
        {
            let mut table = lock(&table);
            epoch = table.epoch;
            if !table.has_inputs() {
                table.sampler_active = false;
                info!("HW: no inputs subscribed, sampler stopped");
                return;
            }
            let inputs: Vec<(u8, bool)> = table
                .pins
                .iter()
                .filter(|(_, s)| s.subscription.is_some())
                .map(|(p, s)| (*p, s.level))
                .collect();
            let now = Instant::now();
            for (pin, last) in inputs {
                match backend.read(pin) {
                    Ok(level) if level != last => {
                        if table.accept_edge(pin, level, now) {
                            accepted.push((pin, level));
                        }
                    }
                    Ok(_) => {}
                    Err(e) => debug!("HW: sampling failed: {}", e),
                }
            }
        }
        for (pin, level) in accepted {
            events::post(inbox, HardwareEvent::Edge { pin, level, epoch });
        }
    }
}

fn level_str(level: bool) -> &'static str {
    if level { "HIGH" } else { "LOW" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_gpio::SimulatedBackend;

    fn hw() -> (HardwareIo, Arc<SimulatedBackend>) {
        let sim = Arc::new(SimulatedBackend::new());
        let io = HardwareIo::new(sim.clone(), Duration::from_millis(5));
        (io, sim)
    }

    #[test]
    fn edge_and_pull_parse() {
        assert_eq!(Edge::parse("RISING"), Some(Edge::Rising));
        assert_eq!(Edge::parse("both"), Some(Edge::Both));
        assert_eq!(Edge::parse("sideways"), None);
        assert_eq!(Pull::parse("down"), Some(Pull::Down));
        assert_eq!(Pull::parse("none"), Some(Pull::Off));
        assert_eq!(InputConfig::default().debounce_ms, 50);
    }

    #[test]
    fn configure_output_twice_keeps_level() {
        let (io, sim) = hw();
        io.configure_output(5, false).unwrap();
        io.set_output(5, true).unwrap();
        io.configure_output(5, false).unwrap();
        assert_eq!(io.output_level(5), Some(true));
        assert_eq!(sim.level(5), Some(true));
    }

    #[test]
    fn toggle_unconfigured_pin_goes_high() {
        let (io, _) = hw();
        assert!(io.toggle_output(9).unwrap());
        assert!(!io.toggle_output(9).unwrap());
        assert_eq!(io.output_level(9), Some(false));
    }

    #[test]
    fn pulse_reverts_after_duration() {
        let (io, sim) = hw();
        io.pulse_output(27, true, 30).unwrap();
        assert_eq!(io.output_level(27), Some(true));
        assert!(io.has_pending_pulse(27));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(io.output_level(27), Some(false));
        assert_eq!(sim.level(27), Some(false));
        assert!(!io.has_pending_pulse(27));
    }

    #[test]
    fn newer_pulse_cancels_older() {
        let (io, _) = hw();
        io.pulse_output(4, true, 100).unwrap();
        thread::sleep(Duration::from_millis(40));
        io.pulse_output(4, true, 200).unwrap();
        // The first timer would have ended at ~100ms.
        thread::sleep(Duration::from_millis(110));
        assert_eq!(io.output_level(4), Some(true));
        thread::sleep(Duration::from_millis(150));
        assert_eq!(io.output_level(4), Some(false));
    }

    #[test]
    fn set_output_cancels_pulse() {
        let (io, _) = hw();
        io.pulse_output(6, true, 40).unwrap();
        io.set_output(6, true).unwrap();
        assert!(!io.has_pending_pulse(6));
        thread::sleep(Duration::from_millis(120));
        assert_eq!(io.output_level(6), Some(true));
    }

    #[test]
    fn teardown_cancels_pending_pulse() {
        let (io, sim) = hw();
        io.pulse_output(12, true, 30).unwrap();
        io.teardown();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(io.output_level(12), None);
        assert!(!sim.writes().contains(&(12, false)));
        io.teardown();
    }

    #[test]
    fn preempted_pulses_leave_one_timer() {
        let (io, sim) = hw();
        for _ in 0..100 {
            io.pulse_output(4, true, 60_000).unwrap();
        }
        assert_eq!(io.pending_timers(), 1);
        assert!(io.pulse_timer_active());

        io.set_output(4, false).unwrap();
        assert_eq!(io.pending_timers(), 0);
        let deadline = Instant::now() + Duration::from_secs(1);
        while io.pulse_timer_active() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!io.pulse_timer_active(), "timer thread should stop once idle");
        assert_eq!(sim.level(4), Some(false));
    }

    #[test]
    fn teardown_stops_pulse_timer() {
        let (io, _) = hw();
        io.pulse_output(7, true, 60_000).unwrap();
        io.pulse_output(8, false, 60_000).unwrap();
        assert_eq!(io.pending_timers(), 2);
        io.teardown();
        assert_eq!(io.pending_timers(), 0);
        let deadline = Instant::now() + Duration::from_secs(1);
        while io.pulse_timer_active() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!io.pulse_timer_active());
    }

    #[test]
    fn pulses_on_several_pins_end_independently() {
        let (io, sim) = hw();
        io.pulse_output(20, true, 30).unwrap();
        io.pulse_output(21, true, 200).unwrap();
        thread::sleep(Duration::from_millis(100));
        assert_eq!(sim.level(20), Some(false));
        assert_eq!(sim.level(21), Some(true));
        thread::sleep(Duration::from_millis(200));
        assert_eq!(sim.level(21), Some(false));
        assert_eq!(io.pending_timers(), 0);
    }

    #[test]
    fn edge_on_output_keeps_software_level() {
        let (io, _) = hw();
        io.set_output(10, true).unwrap();
        assert!(!io.simulate_edge(10, false));
        assert_eq!(io.output_level(10), Some(true));
        assert!(!io.toggle_output(10).unwrap());
    }

    #[test]
    fn falling_edge_filter_and_debounce() {
        let (io, _) = hw();
        io.configure_input(17, InputConfig { debounce_ms: 200, ..InputConfig::default() })
            .unwrap();
        let inbox = io.inbox();

        assert!(!io.simulate_edge(17, true), "rising ignored on falling subscription");
        assert!(io.simulate_edge(17, false));
        assert!(!io.simulate_edge(17, false), "inside debounce window");
        assert_eq!(
            inbox.try_receive().ok(),
            Some(HardwareEvent::Edge { pin: 17, level: false, epoch: 0 })
        );
        assert!(inbox.try_receive().is_err());
    }

    #[test]
    fn edges_after_debounce_window_accepted() {
        let (io, _) = hw();
        io.configure_input(22, InputConfig { edge: Edge::Both, debounce_ms: 20, ..InputConfig::default() })
            .unwrap();
        assert!(io.simulate_edge(22, true));
        thread::sleep(Duration::from_millis(40));
        assert!(io.simulate_edge(22, false));
    }

    #[test]
    fn edge_on_unsubscribed_pin_dropped() {
        let (io, _) = hw();
        assert!(!io.simulate_edge(3, false));
        io.configure_output(3, false).unwrap();
        assert!(!io.simulate_edge(3, false));
    }

    #[test]
    fn output_reconfigure_drops_subscription() {
        let (io, _) = hw();
        io.configure_input(8, InputConfig::default()).unwrap();
        assert_eq!(io.subscribed_inputs(), vec![8]);
        io.set_output(8, true).unwrap();
        assert!(io.subscribed_inputs().is_empty());
        assert!(!io.simulate_edge(8, false));
    }

    #[test]
    fn simulated_reads_are_low() {
        let (io, _) = hw();
        io.set_output(2, true).unwrap();
        assert!(!io.read_input(2));
    }
}
