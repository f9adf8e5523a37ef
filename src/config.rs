//! Engine configuration.

use std::time::Duration;

use tracing::warn;

/// Tunable rules and timings for sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Mistake tokens a session starts with. Reaching zero loses.
    pub max_mistakes: u32,
    /// Hints a session starts with.
    pub max_hints: u32,
    /// Time-trial clock length in seconds.
    pub time_limit_secs: i64,
    /// Presentational countdown before a time trial starts.
    pub countdown_secs: u32,
    /// Stop snapshotting a time trial once fewer seconds than this remain.
    pub snapshot_cutoff_secs: i64,
    /// A won time trial faster than this earns the under-time counter.
    pub under_time_secs: i64,
    /// Age after which another device's guard token may be taken over.
    /// `None` keeps tokens forever.
    pub guard_stale_after: Option<Duration>,
    /// Host ticker period.
    pub tick_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_mistakes: 3,
            max_hints: 4,
            time_limit_secs: 60,
            countdown_secs: 3,
            snapshot_cutoff_secs: 2,
            under_time_secs: 30,
            guard_stale_after: Some(Duration::from_secs(24 * 60 * 60)),
            tick_interval: Duration::from_secs(1),
        }
    }
}

impl EngineConfig {
    /// Load from `CONNECTIONS_*` environment variables, falling back to
    /// defaults for anything unset or invalid.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let stale_secs = parse_or(
            &lookup,
            "CONNECTIONS_GUARD_STALE_SECS",
            defaults.guard_stale_after.map_or(0, |d| d.as_secs()),
            |_| true,
        );
        let tick_millis = parse_or(
            &lookup,
            "CONNECTIONS_TICK_MILLIS",
            defaults.tick_interval.as_millis() as u64,
            |v| *v > 0,
        );

        Self {
            max_mistakes: parse_or(&lookup, "CONNECTIONS_MAX_MISTAKES", defaults.max_mistakes, |v| *v > 0),
            max_hints: parse_or(&lookup, "CONNECTIONS_MAX_HINTS", defaults.max_hints, |_| true),
            time_limit_secs: parse_or(&lookup, "CONNECTIONS_TIME_LIMIT_SECS", defaults.time_limit_secs, |v| *v > 0),
            countdown_secs: parse_or(&lookup, "CONNECTIONS_COUNTDOWN_SECS", defaults.countdown_secs, |_| true),
            snapshot_cutoff_secs: parse_or(
                &lookup,
                "CONNECTIONS_SNAPSHOT_CUTOFF_SECS",
                defaults.snapshot_cutoff_secs,
                |v| *v >= 0,
            ),
            under_time_secs: parse_or(&lookup, "CONNECTIONS_UNDER_TIME_SECS", defaults.under_time_secs, |v| *v > 0),
            guard_stale_after: (stale_secs > 0).then(|| Duration::from_secs(stale_secs)),
            tick_interval: Duration::from_millis(tick_millis),
        }
    }
}

fn parse_or<F, T, V>(lookup: &F, key: &str, default: T, valid: V) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + std::fmt::Display + Copy,
    V: Fn(&T) -> bool,
{
    let Some(raw) = lookup(key) else {
        return default;
    };

    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(key, value = %raw, default = %default, "Ignoring invalid config value");
            default
        }
    }
}
