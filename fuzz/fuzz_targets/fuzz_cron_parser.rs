//! Fuzz target: `DailyTime::parse_cron`
//!
//! Any accepted expression must yield a valid hour/minute, and the next
//! run after an arbitrary instant must lie within the following day.
//!
//! cargo fuzz run fuzz_cron_parser

#![no_main]

use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;
use pinagent::scheduler::DailyTime;

fuzz_target!(|data: &[u8]| {
    let Ok(expr) = std::str::from_utf8(data) else {
        return;
    };
    if let Ok(at) = DailyTime::parse_cron(expr) {
        assert!(at.hour() < 24);
        assert!(at.minute() < 60);
        let Some(now) = NaiveDate::from_ymd_opt(2024, 2, 29).and_then(|d| d.and_hms_opt(23, 59, 59)) else {
            return;
        };
        let next = at.next_after(now);
        assert!(next > now);
        assert!(next - now <= chrono::Duration::days(1));
    }
});
