//! Session Events
//!
//! Outcome values returned by session operations, plus the event stream a
//! host forwards to the presentation layer.

use serde::{Serialize, Deserialize};

use crate::game::session::{GameType, SessionPhase};
use crate::game::word::{DifficultyColor, Word};

/// Result of submitting the current selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuessOutcome {
    /// The same word set was submitted before. Nothing changed.
    AlreadyGuessed,

    /// Exact category match.
    Correct {
        /// Category that was resolved
        color: DifficultyColor,
        /// True if this solved the last category
        game_won: bool,
    },

    /// Three of four words share a category.
    OneAway {
        /// Remaining mistake budget
        mistakes_left: u32,
        /// True if this mistake ended the game
        game_lost: bool,
    },

    /// Any other wrong guess.
    Miss {
        /// Remaining mistake budget
        mistakes_left: u32,
        /// True if this mistake ended the game
        game_lost: bool,
    },

    /// The time-trial clock ran out before the guess was graded.
    TimeUp,
}

impl GuessOutcome {
    /// True if this outcome cost a mistake.
    pub fn is_mistake(&self) -> bool {
        matches!(self, GuessOutcome::OneAway { .. } | GuessOutcome::Miss { .. })
    }

    /// True if the session is over after this outcome.
    pub fn ended_session(&self) -> bool {
        match self {
            GuessOutcome::AlreadyGuessed => false,
            GuessOutcome::Correct { game_won, .. } => *game_won,
            GuessOutcome::OneAway { game_lost, .. } | GuessOutcome::Miss { game_lost, .. } => *game_lost,
            GuessOutcome::TimeUp => true,
        }
    }
}

/// Result of a periodic tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickOutcome {
    /// No running clock (classic mode, or not active).
    Idle,
    /// Time trial still running.
    Running {
        /// Whole seconds left on the clock
        time_left_secs: i64,
    },
    /// The clock hit zero on this tick and the session ended.
    Expired,
}

/// Why a session ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// All four categories found.
    Won,
    /// Mistake budget exhausted.
    OutOfMistakes,
    /// Time-trial clock expired.
    OutOfTime,
}

impl EndReason {
    /// True for [`EndReason::Won`].
    pub fn is_win(self) -> bool {
        self == EndReason::Won
    }
}

/// Event emitted for the presentation layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    /// Phase transition
    PhaseChanged {
        /// New phase
        phase: SessionPhase,
        /// Mode, once chosen
        game_type: Option<GameType>,
    },

    /// A guess was graded
    GuessEvaluated {
        /// The outcome
        outcome: GuessOutcome,
    },

    /// Hint shown
    HintShown {
        /// Words to highlight
        words: Vec<Word>,
        /// Hints remaining
        hints_left: u32,
    },

    /// One second of a time trial elapsed
    TimerTick {
        /// Seconds left
        time_left_secs: i64,
    },

    /// A remaining category was revealed after a loss
    CategoryAutoSolved {
        /// Revealed category
        color: DifficultyColor,
    },

    /// Session over
    Ended {
        /// Why
        reason: EndReason,
    },

    /// Final record written
    Archived {
        /// Puzzle the record belongs to
        puzzle_number: u32,
    },
}
