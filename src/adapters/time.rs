//! System clock adapter.
//!
//! Provides local wall-clock time for the schedule poller.  Boards
//! without a battery-backed RTC boot with a clock near the epoch (or at
//! the last `fake-hwclock` save) until NTP syncs; times before 2020 are
//! treated as unsynced so schedules do not fire at bogus moments.

use chrono::{Datelike, Local, NaiveDateTime};

use crate::app::ports::Clock;

/// Reject obviously unsynced time (before 2020-01-01).
const MIN_SYNCED_YEAR: i32 = 2020;

/// Local time from the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Option<NaiveDateTime> {
        let now = Local::now().naive_local();
        (now.year() >= MIN_SYNCED_YEAR).then_some(now)
    }
}
