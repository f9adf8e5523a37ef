//! Wall Clock Access
//!
//! The engine never reads the system time directly. Everything that needs
//! "now" goes through a [`Clock`], so tests can pin or advance time.

use std::sync::Mutex;

use chrono::{DateTime, Duration, FixedOffset, Local, TimeZone};

/// Timestamp type used throughout the engine (zone-aware).
pub type Timestamp = DateTime<FixedOffset>;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time, carrying the local zone offset.
    fn now(&self) -> Timestamp;
}

/// Clock backed by the operating system's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Local::now().fixed_offset()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock pinned at `start`.
    pub fn new(start: Timestamp) -> Self {
        Self { now: Mutex::new(start) }
    }

    /// Jump to an absolute time.
    pub fn set(&self, to: Timestamp) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }

    /// Move forward (or backward, for negative durations).
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Whole calendar days from `earlier` to `later`, measured on `later`'s
/// local calendar. Crossing one midnight counts as one day even if only a
/// minute passed. Negative when `later` precedes `earlier`.
pub fn calendar_days_between(earlier: &Timestamp, later: &Timestamp) -> i64 {
    let earlier_local = earlier.with_timezone(later.offset());
    (later.date_naive() - earlier_local.date_naive()).num_days()
}

/// Seconds left until the next local midnight of `now`'s zone.
pub fn seconds_until_midnight(now: &Timestamp) -> i64 {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|naive| now.offset().from_local_datetime(&naive).single());

    match next_midnight {
        Some(midnight) => (midnight - *now).num_seconds(),
        None => 0,
    }
}

/// Whole seconds elapsed between two instants, never negative.
pub fn elapsed_secs(start: &Timestamp, end: &Timestamp) -> i64 {
    (*end - *start).num_seconds().max(0)
}

/// Parse an RFC 3339 timestamp (helper for fixtures and env overrides).
pub fn parse_timestamp(s: &str) -> Result<Timestamp, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s)
}
