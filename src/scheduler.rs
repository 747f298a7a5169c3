//! Daily schedule engine.
//!
//! Schedule triggers carry a 5-field cron expression of which only the
//! minute and hour are honored: each entry fires once a day at that
//! local time-of-day.  The scheduler notifies a [`SchedulerDelegate`]
//! when entries are due; the trigger registry implements the delegate
//! to fire the owning trigger.
//!
//! ```text
//!   schedule poller (1 s) ──▶ Scheduler::tick(now) ──▶ SchedulerDelegate
//!                                                       (TriggerRegistry)
//! ```

use chrono::{Days, NaiveDateTime, NaiveTime, Timelike};
use log::{debug, info};

use crate::app::ports::SchedulerDelegate;
use crate::error::ConfigError;

// ═══════════════════════════════════════════════════════════════
//  Time of day
// ═══════════════════════════════════════════════════════════════

/// A local time-of-day at minute resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailyTime(NaiveTime);

impl DailyTime {
    /// Reduce a cron expression (`"M H * * *"`) to its minute and hour.
    ///
    /// Fields after the hour are ignored.  Fewer than two fields, or a
    /// minute/hour that is not a plain in-range number, is an error.
    pub fn parse_cron(expr: &str) -> Result<Self, ConfigError> {
        let invalid = || ConfigError::InvalidSchedule(expr.to_string());
        let mut fields = expr.split_whitespace();
        let (Some(minute), Some(hour)) = (fields.next(), fields.next()) else {
            return Err(invalid());
        };
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        if minute > 59 || hour > 23 {
            return Err(invalid());
        }
        NaiveTime::from_hms_opt(hour, minute, 0)
            .map(Self)
            .ok_or_else(invalid)
    }

    pub fn hour(self) -> u32 {
        self.0.hour()
    }

    pub fn minute(self) -> u32 {
        self.0.minute()
    }

    /// First occurrence strictly after `now`.
    pub fn next_after(self, now: NaiveDateTime) -> NaiveDateTime {
        let today = now.date().and_time(self.0);
        if today > now {
            today
        } else {
            today.checked_add_days(Days::new(1)).unwrap_or(today)
        }
    }
}

impl core::fmt::Display for DailyTime {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

// ═══════════════════════════════════════════════════════════════
//  Scheduler engine
// ═══════════════════════════════════════════════════════════════

/// Internal bookkeeping for a live schedule.
#[derive(Debug, Clone)]
struct ScheduleEntry {
    trigger_id: String,
    at: DailyTime,
    /// `None` until the clock is first known.
    next_run: Option<NaiveDateTime>,
}

/// The scheduler engine.
///
/// Decoupled from the trigger registry: when an entry is due it invokes
/// the [`SchedulerDelegate`] callback.  This keeps the scheduler
/// testable with a fixed clock.
#[derive(Debug, Default)]
pub struct Scheduler {
    entries: Vec<ScheduleEntry>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a daily entry for `trigger_id`; first run is the next
    /// occurrence after `now`.  With no trustworthy clock yet the first
    /// run is computed on the first tick that has one.
    pub fn add(&mut self, trigger_id: &str, at: DailyTime, now: Option<NaiveDateTime>) {
        let next_run = now.map(|now| at.next_after(now));
        match next_run {
            Some(next) => info!("Scheduler: '{}' daily at {} (next {})", trigger_id, at, next),
            None => info!("Scheduler: '{}' daily at {} (clock not synced)", trigger_id, at),
        }
        self.entries.push(ScheduleEntry {
            trigger_id: trigger_id.to_string(),
            at,
            next_run,
        });
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        if !self.entries.is_empty() {
            info!("Scheduler: cleared {} entr(ies)", self.entries.len());
        }
        self.entries.clear();
    }

    /// Fire every entry whose time has come, then roll it to tomorrow.
    ///
    /// An agent that was suspended past several occurrences fires once,
    /// not once per missed day.
    pub fn tick(&mut self, now: NaiveDateTime, delegate: &mut dyn SchedulerDelegate) {
        for entry in &mut self.entries {
            let Some(next_run) = entry.next_run else {
                entry.next_run = Some(entry.at.next_after(now));
                continue;
            };
            if next_run > now {
                continue;
            }
            debug!("Scheduler: '{}' due ({})", entry.trigger_id, entry.at);
            delegate.on_schedule_fired(&entry.trigger_id);
            entry.next_run = Some(entry.at.next_after(now));
        }
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Next run time of the entry owned by `trigger_id`.
    pub fn next_run(&self, trigger_id: &str) -> Option<NaiveDateTime> {
        self.entries
            .iter()
            .find(|e| e.trigger_id == trigger_id)
            .and_then(|e| e.next_run)
    }
}

// ═══════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════
