//! Simulated pin backend.
//!
//! Used when the agent runs with `--simulate` or on a host without
//! `/sys/class/gpio`.  Every pin number is accepted, writes are logged
//! and recorded, and reads return LOW since there is no physical line.
//! Input edges come from [`HardwareIo::simulate_edge`](crate::drivers::gpio::HardwareIo::simulate_edge).

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::info;

use crate::app::ports::PinBackend;
use crate::drivers::gpio::{Direction, Pull};
use crate::error::HardwareError;

#[derive(Default)]
struct SimLines {
    claimed: HashMap<u8, Direction>,
    levels: HashMap<u8, bool>,
    writes: Vec<(u8, bool)>,
    releases: usize,
}

/// In-memory pin backend.
#[derive(Default)]
pub struct SimulatedBackend {
    lines: Mutex<SimLines>,
}

impl SimulatedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lines(&self) -> MutexGuard<'_, SimLines> {
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Last level driven on an output line.
    pub fn level(&self, pin: u8) -> Option<bool> {
        self.lines().levels.get(&pin).copied()
    }

    /// Every level written, in order, as `(pin, level)`.
    pub fn writes(&self) -> Vec<(u8, bool)> {
        self.lines().writes.clone()
    }

    /// Whether `pin` is currently claimed in either direction.
    pub fn is_claimed(&self, pin: u8) -> bool {
        self.lines().claimed.contains_key(&pin)
    }

    /// How many times [`PinBackend::release_all`] has run.
    pub fn release_count(&self) -> usize {
        self.lines().releases
    }
}

impl PinBackend for SimulatedBackend {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn validate_pin(&self, _pin: u8) -> Result<(), HardwareError> {
        Ok(())
    }

    fn setup_input(&self, pin: u8, pull: Pull) -> Result<(), HardwareError> {
        let mut lines = self.lines();
        lines.claimed.insert(pin, Direction::Input);
        lines.levels.remove(&pin);
        info!("[SIM] GPIO {} configured as input (pull {:?})", pin, pull);
        Ok(())
    }

    fn setup_output(&self, pin: u8, level: bool) -> Result<(), HardwareError> {
        let mut lines = self.lines();
        lines.claimed.insert(pin, Direction::Output);
        lines.levels.insert(pin, level);
        lines.writes.push((pin, level));
        info!("[SIM] GPIO {} configured as output", pin);
        Ok(())
    }

    fn write(&self, pin: u8, level: bool) -> Result<(), HardwareError> {
        let mut lines = self.lines();
        if lines.claimed.get(&pin) != Some(&Direction::Output) {
            return Err(HardwareError::WriteFailed {
                pin,
                reason: "not configured as output".into(),
            });
        }
        lines.levels.insert(pin, level);
        lines.writes.push((pin, level));
        info!("[SIM] GPIO {} set to {}", pin, if level { "HIGH" } else { "LOW" });
        Ok(())
    }

    fn read(&self, _pin: u8) -> Result<bool, HardwareError> {
        Ok(false)
    }

    fn release_all(&self) {
        let mut lines = self.lines();
        lines.claimed.clear();
        lines.levels.clear();
        lines.releases += 1;
    }

    fn needs_sampling(&self) -> bool {
        false
    }
}
