//! Persisted Documents
//!
//! Serde shapes for everything the engine writes: the in-progress save
//! state, archived play records and the per-account document that holds
//! them alongside the concurrency guard and achievement counters. Field
//! names are part of the storage contract and must not change.

use serde::{Serialize, Deserialize};
use serde_json::Value;
use tracing::warn;

use crate::core::clock::{elapsed_secs, Timestamp};
use crate::core::ids::{AccountId, InstanceId};
use crate::game::session::{GameSession, GameType, Restore, ResultsView};
use crate::game::word::{DifficultyColor, Guess, Word};

// =============================================================================
// SAVE STATE
// =============================================================================

/// Snapshot of an in-progress session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    /// Set when the snapshot was taken after the game ended.
    #[serde(rename = "is_game_finished", default)]
    pub finished: bool,
    /// Mode being played.
    pub game_type: GameType,
    /// Board layout, top row first (solved rows included).
    pub grid_words: Vec<Vec<Word>>,
    /// Guess history, oldest first.
    pub guesses: Vec<Guess>,
    /// Hints remaining.
    #[serde(rename = "hints_left_count")]
    pub hints_left: u32,
    /// Mistakes remaining.
    #[serde(rename = "mistakes_left_count")]
    pub mistakes_left: u32,
    /// Puzzle being played.
    pub puzzle_number: u32,
    /// When play (the clock) started.
    pub game_start_time: Timestamp,
    /// When this snapshot was taken.
    #[serde(rename = "save_state_creation_time")]
    pub created_at: Timestamp,
}

impl SaveState {
    /// Capture a session. `None` before a mode has been chosen and play
    /// has started.
    pub fn capture(session: &GameSession, now: Timestamp) -> Option<Self> {
        let game_type = session.game_type()?;
        let game_start_time = session.start_time()?;

        Some(Self {
            finished: session.end_reason().is_some(),
            game_type,
            grid_words: session.grid().rows(),
            guesses: session.grid().guesses().to_vec(),
            hints_left: session.hints_left(),
            mistakes_left: session.mistakes_left(),
            puzzle_number: session.puzzle_number(),
            game_start_time,
            created_at: now,
        })
    }

    /// Start time that makes the clock continue where it stopped:
    /// `now - (created_at - game_start_time)`.
    pub fn effective_start(&self, now: Timestamp) -> Timestamp {
        now - (self.created_at - self.game_start_time)
    }

    /// Borrow as restore input for a session resumed at `now`.
    pub fn as_restore(&self, now: Timestamp) -> Restore<'_> {
        Restore {
            game_type: self.game_type,
            hints_left: self.hints_left,
            mistakes_left: self.mistakes_left,
            guesses: &self.guesses,
            arrangement: Some(&self.grid_words),
            start_time: self.effective_start(now),
        }
    }
}

// =============================================================================
// PLAYED GAME RECORD
// =============================================================================

/// Mode-specific part of an archived record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "game_type", rename_all = "snake_case")]
pub enum ModeDetails {
    /// Untimed play
    Classic,
    /// Timed play
    TimeTrial {
        /// Clock length in seconds
        time_limit: i64,
        /// True if the board was finished before the clock ran out
        #[serde(rename = "completed")]
        completed_before_limit: bool,
    },
}

/// Immutable record of a finished play-through.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayedGameRecord {
    /// Puzzle played.
    pub puzzle_number: u32,
    /// Wrong guesses.
    #[serde(rename = "mistakes_made_count")]
    pub mistakes_made: u32,
    /// Hints spent.
    #[serde(rename = "hints_used_count")]
    pub hints_used: u32,
    /// Categories the player found (auto-solved rows excluded).
    #[serde(rename = "connection_count")]
    pub categories_solved: u32,
    /// Guess history.
    pub guesses: Vec<Guess>,
    /// Outcome.
    pub won: bool,
    /// Start of play.
    pub game_start_time: Timestamp,
    /// End of play.
    pub game_end_time: Timestamp,
    /// Mode discriminator and its fields.
    #[serde(flatten)]
    pub mode: ModeDetails,
}

impl PlayedGameRecord {
    /// Build from an ended session. `None` if it has not ended.
    pub fn from_session(session: &GameSession) -> Option<Self> {
        let game_start_time = session.start_time()?;
        let game_end_time = session.end_time()?;

        let mode = match session.game_type()? {
            GameType::Classic => ModeDetails::Classic,
            GameType::TimeTrial => ModeDetails::TimeTrial {
                time_limit: session.config().time_limit_secs,
                completed_before_limit: !session.ran_out_of_time(),
            },
        };

        Some(Self {
            puzzle_number: session.puzzle_number(),
            mistakes_made: session.mistakes_made(),
            hints_used: session.hints_used(),
            categories_solved: session.grid().player_solved_count() as u32,
            guesses: session.grid().guesses().to_vec(),
            won: session.is_won(),
            game_start_time,
            game_end_time,
            mode,
        })
    }

    /// Mode played.
    pub fn game_type(&self) -> GameType {
        match self.mode {
            ModeDetails::Classic => GameType::Classic,
            ModeDetails::TimeTrial { .. } => GameType::TimeTrial,
        }
    }

    /// Whole seconds from start to end.
    pub fn time_completed_secs(&self) -> i64 {
        elapsed_secs(&self.game_start_time, &self.game_end_time)
    }

    /// True if a time trial ran out of time.
    pub fn ran_out_of_time(&self) -> bool {
        matches!(self.mode, ModeDetails::TimeTrial { completed_before_limit: false, .. })
    }

    /// Borrow as input for a read-only results session.
    pub fn as_results_view(&self) -> ResultsView<'_> {
        ResultsView {
            game_type: self.game_type(),
            guesses: &self.guesses,
            mistakes_made: self.mistakes_made,
            hints_used: self.hints_used,
            won: self.won,
            ran_out_of_time: self.ran_out_of_time(),
            start_time: self.game_start_time,
            end_time: self.game_end_time,
        }
    }
}

// =============================================================================
// ACHIEVEMENTS
// =============================================================================

/// Counter an achievement tracks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AchievementKind {
    /// Classic games finished
    RegularGames,
    /// Time trials finished
    TimeTrials,
    /// Games won without a mistake
    NoMistakes,
    /// Time trials won quickly
    UnderTime,
}

/// Count needed for each tier, easiest first.
pub const TIER_THRESHOLDS: [(DifficultyColor, u32); 4] = [
    (DifficultyColor::Yellow, 1),
    (DifficultyColor::Green, 10),
    (DifficultyColor::Blue, 50),
    (DifficultyColor::Purple, 100),
];

/// Per-account achievement counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AchievementCounters {
    /// Classic games finished
    #[serde(default)]
    pub regular_games_completed: u32,
    /// Time trials finished
    #[serde(default)]
    pub time_trials_completed: u32,
    /// Games won in exactly four guesses
    #[serde(default)]
    pub no_mistakes_completed: u32,
    /// Time trials won in under the configured time
    #[serde(default)]
    pub time_trials_under_time_completed: u32,
}

impl AchievementCounters {
    /// Value of one counter.
    pub fn count(&self, kind: AchievementKind) -> u32 {
        match kind {
            AchievementKind::RegularGames => self.regular_games_completed,
            AchievementKind::TimeTrials => self.time_trials_completed,
            AchievementKind::NoMistakes => self.no_mistakes_completed,
            AchievementKind::UnderTime => self.time_trials_under_time_completed,
        }
    }

    /// Highest tier reached for a counter.
    pub fn tier(&self, kind: AchievementKind) -> Option<DifficultyColor> {
        let count = self.count(kind);
        TIER_THRESHOLDS
            .iter()
            .rev()
            .find(|(_, needed)| count >= *needed)
            .map(|(color, _)| *color)
    }

    /// True if the counter has reached `tier`.
    pub fn has_achievement(&self, kind: AchievementKind, tier: DifficultyColor) -> bool {
        TIER_THRESHOLDS
            .iter()
            .find(|(color, _)| *color == tier)
            .is_some_and(|(_, needed)| self.count(kind) >= *needed)
    }

    /// Sum of every counter (leaderboard key).
    pub fn total(&self) -> u32 {
        self.regular_games_completed
            + self.time_trials_completed
            + self.no_mistakes_completed
            + self.time_trials_under_time_completed
    }

    /// Count a newly archived game.
    pub fn record_game(&mut self, record: &PlayedGameRecord, under_time_secs: i64) {
        match record.mode {
            ModeDetails::Classic => self.regular_games_completed += 1,
            ModeDetails::TimeTrial { .. } => {
                self.time_trials_completed += 1;
                let elapsed = record.time_completed_secs();
                if record.won && elapsed > 0 && elapsed < under_time_secs {
                    self.time_trials_under_time_completed += 1;
                }
            }
        }

        if record.won && record.guesses.len() == 4 {
            self.no_mistakes_completed += 1;
        }
    }
}

// =============================================================================
// ACCOUNT
// =============================================================================

/// Stored form of the account. Nested entries stay raw so one bad entry
/// cannot make the whole account unreadable.
#[derive(Serialize, Deserialize)]
struct AccountDoc {
    user_id: AccountId,
    #[serde(default)]
    played_games: Vec<Value>,
    #[serde(default)]
    latest_game_save_state: Option<Value>,
    #[serde(default)]
    has_latest_game_save_state: bool,
    #[serde(default)]
    active_instance_id: Option<InstanceId>,
    #[serde(default)]
    active_instance_since: Option<Timestamp>,
    #[serde(flatten)]
    achievements: AchievementCounters,
}

/// Everything the engine stores per account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AccountDoc", into = "AccountDoc")]
pub struct AccountRecord {
    /// Owner.
    pub user_id: AccountId,
    /// Archive, one entry per puzzle number.
    pub played_games: Vec<PlayedGameRecord>,
    /// In-progress snapshot.
    pub latest_game_save_state: Option<SaveState>,
    /// Device currently mid-session.
    pub active_instance_id: Option<InstanceId>,
    /// When the guard was last claimed or refreshed.
    pub active_instance_since: Option<Timestamp>,
    /// Achievement counters.
    pub achievements: AchievementCounters,
}

impl From<AccountDoc> for AccountRecord {
    fn from(doc: AccountDoc) -> Self {
        let latest_game_save_state = match (doc.has_latest_game_save_state, doc.latest_game_save_state) {
            (true, Some(raw)) => match serde_json::from_value::<SaveState>(raw) {
                Ok(save) => Some(save),
                Err(e) => {
                    warn!(account = %doc.user_id, error = %e, "Ignoring malformed save state");
                    None
                }
            },
            _ => None,
        };

        let played_games = doc
            .played_games
            .into_iter()
            .filter_map(|raw| match serde_json::from_value::<PlayedGameRecord>(raw) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(account = %doc.user_id, error = %e, "Skipping unreadable played game");
                    None
                }
            })
            .collect();

        Self {
            user_id: doc.user_id,
            played_games,
            latest_game_save_state,
            active_instance_id: doc.active_instance_id,
            active_instance_since: doc.active_instance_since,
            achievements: doc.achievements,
        }
    }
}

impl From<AccountRecord> for AccountDoc {
    fn from(record: AccountRecord) -> Self {
        let latest = record
            .latest_game_save_state
            .as_ref()
            .and_then(|save| serde_json::to_value(save).ok());

        Self {
            user_id: record.user_id,
            played_games: record
                .played_games
                .iter()
                .filter_map(|game| serde_json::to_value(game).ok())
                .collect(),
            has_latest_game_save_state: latest.is_some(),
            latest_game_save_state: latest,
            active_instance_id: record.active_instance_id,
            active_instance_since: record.active_instance_since,
            achievements: record.achievements,
        }
    }
}

impl AccountRecord {
    /// Empty account.
    pub fn new(user_id: AccountId) -> Self {
        Self {
            user_id,
            played_games: Vec::new(),
            latest_game_save_state: None,
            active_instance_id: None,
            active_instance_since: None,
            achievements: AchievementCounters::default(),
        }
    }

    /// Archived record for a puzzle.
    pub fn played_game(&self, puzzle_number: u32) -> Option<&PlayedGameRecord> {
        self.played_games.iter().find(|g| g.puzzle_number == puzzle_number)
    }

    /// True if the puzzle is archived.
    pub fn has_played(&self, puzzle_number: u32) -> bool {
        self.played_game(puzzle_number).is_some()
    }

    /// True while some device holds the guard.
    pub fn is_in_game(&self) -> bool {
        self.active_instance_id.is_some()
    }

    /// Claim the guard for `instance` and stamp it at `now`.
    pub fn set_guard(&mut self, instance: &InstanceId, now: Timestamp) {
        self.active_instance_id = Some(instance.clone());
        self.active_instance_since = Some(now);
    }

    /// Release the guard if `instance` holds it (or nobody does).
    /// Returns false if another device holds it.
    pub fn release_guard(&mut self, instance: &InstanceId) -> bool {
        match &self.active_instance_id {
            Some(holder) if holder != instance => false,
            _ => {
                self.active_instance_id = None;
                self.active_instance_since = None;
                true
            }
        }
    }
}
