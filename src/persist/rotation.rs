//! Daily Rotation Clock
//!
//! The active puzzle number advances by one per local calendar day. Days
//! are counted between calendar dates, not as rolling 24-hour periods, so
//! 23:59 to 00:01 is one day. When the next number has no puzzle the
//! rotation wraps to the smallest known number.

use std::sync::Arc;

use chrono::Duration;
use serde::{Serialize, Deserialize};
use tracing::{debug, info, warn};

use crate::core::clock::{calendar_days_between, seconds_until_midnight, Timestamp};
use crate::persist::store::{PuzzleStore, StatusStore, StoreError};

/// Seconds before midnight at which [`midnight_imminent`] fires.
pub const MIDNIGHT_WARNING_SECS: i64 = 1;

/// Shared rotation state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RotationStatus {
    /// When the last advance was applied.
    #[serde(rename = "last_puzzle_date")]
    pub last_rotation: Timestamp,
    /// Puzzle number in play today.
    #[serde(rename = "today_puzzle_number")]
    pub current_puzzle_number: u32,
    /// Smallest puzzle number.
    pub min_puzzle_number: u32,
    /// Largest puzzle number.
    pub max_puzzle_number: u32,
}

impl RotationStatus {
    /// Initial status: today is the smallest puzzle.
    pub fn bootstrap(min_puzzle_number: u32, max_puzzle_number: u32, now: Timestamp) -> Self {
        Self {
            last_rotation: now,
            current_puzzle_number: min_puzzle_number,
            min_puzzle_number,
            max_puzzle_number,
        }
    }

    /// Apply one advance per calendar day elapsed since the last rotation.
    /// Returns the number of days applied. `last_rotation` moves to `now`
    /// only when at least one day was applied.
    pub fn advance<E>(
        &mut self,
        now: Timestamp,
        mut has_puzzle: impl FnMut(u32) -> Result<bool, E>,
    ) -> Result<i64, E> {
        let days = calendar_days_between(&self.last_rotation, &now);
        if days <= 0 {
            if days < 0 {
                warn!(last = %self.last_rotation, now = %now, "Clock is behind last rotation; not rotating");
            }
            return Ok(0);
        }

        let mut number = self.current_puzzle_number;
        for _ in 0..days {
            let next = number.saturating_add(1);
            number = if next <= self.max_puzzle_number && has_puzzle(next)? {
                next
            } else {
                self.min_puzzle_number
            };
        }

        self.current_puzzle_number = number;
        self.last_rotation = now;
        Ok(days)
    }

    /// Move the last rotation time back (debugging aid for testing rollover).
    pub fn rewind_hours(&mut self, hours: i64) {
        self.last_rotation -= Duration::hours(hours);
    }
}

/// True within [`MIDNIGHT_WARNING_SECS`] of local midnight.
pub fn midnight_imminent(now: &Timestamp) -> bool {
    seconds_until_midnight(now) <= MIDNIGHT_WARNING_SECS
}

/// Store-backed rotation checks.
pub struct RotationClock {
    status: Arc<dyn StatusStore>,
    puzzles: Arc<dyn PuzzleStore>,
}

impl RotationClock {
    /// Create over the given stores.
    pub fn new(status: Arc<dyn StatusStore>, puzzles: Arc<dyn PuzzleStore>) -> Self {
        Self { status, puzzles }
    }

    /// Rotate if a day boundary has passed and return the current status.
    /// Writes only when something changed, so calling this on every entry
    /// is cheap.
    pub fn check_and_rotate(&self, now: Timestamp) -> Result<RotationStatus, StoreError> {
        let range = self
            .puzzles
            .number_range()?
            .ok_or_else(|| StoreError::NotFound("puzzle catalog is empty".into()))?;

        let Some(mut status) = self.status.read_status()? else {
            let status = RotationStatus::bootstrap(range.0, range.1, now);
            self.status.write_status(&status)?;
            info!(puzzle = status.current_puzzle_number, "Rotation status created");
            return Ok(status);
        };

        let mut changed = false;
        if (status.min_puzzle_number, status.max_puzzle_number) != range {
            debug!(min = range.0, max = range.1, "Puzzle range changed");
            status.min_puzzle_number = range.0;
            status.max_puzzle_number = range.1;
            changed = true;
        }

        let previous = status.current_puzzle_number;
        let days = status.advance(now, |n| self.puzzles.get_puzzle(n).map(|p| p.is_some()))?;
        if days > 0 {
            info!(from = previous, to = status.current_puzzle_number, days, "Daily puzzle rotated");
            changed = true;
        }

        if changed {
            self.status.write_status(&status)?;
        }
        Ok(status)
    }

    /// Rewind the stored last-rotation time by `hours`.
    pub fn rewind_hours(&self, hours: i64, now: Timestamp) -> Result<RotationStatus, StoreError> {
        let mut status = self.check_and_rotate(now)?;
        status.rewind_hours(hours);
        self.status.write_status(&status)?;
        warn!(hours, last = %status.last_rotation, "Rotation clock rewound");
        Ok(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::parse_timestamp;
    use crate::game::puzzle::tests::sample_puzzle;
    use crate::game::puzzle::PuzzleCatalog;
    use crate::persist::store::MemoryStore;
    use std::convert::Infallible;

    fn ts(s: &str) -> Timestamp {
        parse_timestamp(s).unwrap()
    }

    fn always(_: u32) -> Result<bool, Infallible> {
        Ok(true)
    }

    #[test]
    fn test_no_rotation_same_day() {
        let mut status = RotationStatus::bootstrap(1, 10, ts("2024-03-10T00:05:00-05:00"));
        let days = status.advance(ts("2024-03-10T23:59:59-05:00"), always).unwrap();
        assert_eq!(days, 0);
        assert_eq!(status.current_puzzle_number, 1);
        assert_eq!(status.last_rotation, ts("2024-03-10T00:05:00-05:00"));
    }

    #[test]
    fn test_rotation_across_midnight() {
        let mut status = RotationStatus::bootstrap(1, 10, ts("2024-03-10T23:59:00-05:00"));
        let now = ts("2024-03-11T00:01:00-05:00");
        assert_eq!(status.advance(now, always).unwrap(), 1);
        assert_eq!(status.current_puzzle_number, 2);
        assert_eq!(status.last_rotation, now);
    }

    #[test]
    fn test_rotation_multiple_days_and_wrap() {
        let mut status = RotationStatus::bootstrap(1, 3, ts("2024-03-10T12:00:00+00:00"));
        status.current_puzzle_number = 2;
        // 2 -> 3 -> wrap to 1 -> 2
        assert_eq!(status.advance(ts("2024-03-13T08:00:00+00:00"), always).unwrap(), 3);
        assert_eq!(status.current_puzzle_number, 2);
    }

    #[test]
    fn test_rotation_wraps_on_gap() {
        let mut status = RotationStatus::bootstrap(1, 10, ts("2024-03-10T12:00:00+00:00"));
        status.current_puzzle_number = 4;
        status
            .advance(ts("2024-03-11T12:00:00+00:00"), |n| Ok::<_, Infallible>(n != 5))
            .unwrap();
        assert_eq!(status.current_puzzle_number, 1);
    }

    #[test]
    fn test_clock_behind_is_ignored() {
        let mut status = RotationStatus::bootstrap(1, 10, ts("2024-03-10T12:00:00+00:00"));
        assert_eq!(status.advance(ts("2024-03-08T12:00:00+00:00"), always).unwrap(), 0);
        assert_eq!(status.current_puzzle_number, 1);
    }

    #[test]
    fn test_rewind_hours() {
        let mut status = RotationStatus::bootstrap(1, 10, ts("2024-03-10T12:00:00+00:00"));
        status.rewind_hours(24);
        assert_eq!(status.last_rotation, ts("2024-03-09T12:00:00+00:00"));
        assert_eq!(status.advance(ts("2024-03-10T12:00:00+00:00"), always).unwrap(), 1);
    }

    #[test]
    fn test_midnight_imminent() {
        assert!(midnight_imminent(&ts("2024-03-10T23:59:59-05:00")));
        assert!(!midnight_imminent(&ts("2024-03-10T23:59:50-05:00")));
    }

    #[test]
    fn test_clock_bootstraps_and_rotates() {
        let store = Arc::new(MemoryStore::new(
            PuzzleCatalog::from_puzzles(vec![sample_puzzle(100), sample_puzzle(101)]).unwrap(),
        ));
        let clock = RotationClock::new(store.clone(), store.clone());

        let day1 = ts("2024-06-01T10:00:00+02:00");
        assert_eq!(clock.check_and_rotate(day1).unwrap().current_puzzle_number, 100);
        assert_eq!(clock.check_and_rotate(day1 + Duration::hours(5)).unwrap().current_puzzle_number, 100);

        let day2 = ts("2024-06-02T00:00:01+02:00");
        assert_eq!(clock.check_and_rotate(day2).unwrap().current_puzzle_number, 101);

        // 102 does not exist
        let day3 = ts("2024-06-03T09:00:00+02:00");
        assert_eq!(clock.check_and_rotate(day3).unwrap().current_puzzle_number, 100);

        let rewound = clock.rewind_hours(48, day3).unwrap();
        assert_eq!(rewound.last_rotation, day3 - Duration::hours(48));
        assert_eq!(clock.check_and_rotate(day3).unwrap().current_puzzle_number, 100);
    }

    #[test]
    fn test_clock_empty_catalog() {
        let store = Arc::new(MemoryStore::default());
        let clock = RotationClock::new(store.clone(), store);
        assert!(matches!(
            clock.check_and_rotate(ts("2024-06-01T10:00:00+02:00")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_status_document_keys() {
        let status = RotationStatus::bootstrap(3, 8, ts("2024-06-01T10:00:00+02:00"));
        let doc = serde_json::to_value(&status).unwrap();
        assert_eq!(doc["today_puzzle_number"], 3);
        assert_eq!(doc["max_puzzle_number"], 8);
        assert_eq!(doc["last_puzzle_date"], "2024-06-01T10:00:00+02:00");
    }
}
