//! Session State Machine
//!
//! One play-through of one puzzle:
//!
//! ```text
//! ModeSelect ──classic──────────────────► Active ──► Ended
//!      └──────time trial──► Countdown ──►─┘
//! ```
//!
//! The session owns its [`Grid`] and budgets. It never reads the clock
//! itself; every time-dependent operation takes `now`.

use std::collections::VecDeque;

use serde::{Serialize, Deserialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::core::clock::{elapsed_secs, Timestamp};
use crate::core::rng::DeterministicRng;
use crate::game::events::{EndReason, GuessOutcome, TickOutcome};
use crate::game::grid::Grid;
use crate::game::puzzle::Puzzle;
use crate::game::word::{DifficultyColor, Guess, Word, WORDS_PER_CATEGORY};

// =============================================================================
// MODE & PHASE
// =============================================================================

/// Game mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    /// Untimed
    Classic,
    /// Against the clock
    TimeTrial,
}

impl GameType {
    /// Stored name (`"classic"` / `"time_trial"`).
    pub fn as_str(self) -> &'static str {
        match self {
            GameType::Classic => "classic",
            GameType::TimeTrial => "time_trial",
        }
    }
}

/// Session lifecycle phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Waiting for the player to pick a mode
    ModeSelect,
    /// Time-trial countdown overlay (clock not running yet)
    Countdown,
    /// Accepting guesses
    Active,
    /// Finished, or viewing an archived result
    Ended,
}

// =============================================================================
// ERRORS
// =============================================================================

/// Operation not valid in the session's current state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// Action needs an active session.
    #[error("Session is not active")]
    NotActive,

    /// Transition not allowed from this phase.
    #[error("Invalid phase: expected {expected:?}, found {actual:?}")]
    WrongPhase {
        /// Phase the transition needs
        expected: SessionPhase,
        /// Phase the session is in
        actual: SessionPhase,
    },

    /// Submit needs exactly four selected words.
    #[error("Selection has {0} words, need 4")]
    IncompleteSelection(usize),

    /// Hint budget spent.
    #[error("No hints left")]
    NoHintsLeft,

    /// A hint is already on screen.
    #[error("Hint already shown")]
    HintAlreadyShown,

    /// Archived results cannot be played.
    #[error("Session is read-only")]
    ReadOnly,
}

// =============================================================================
// RESTORE INPUTS
// =============================================================================

/// Persisted progress to resume from.
#[derive(Clone, Debug)]
pub struct Restore<'a> {
    /// Mode the player picked
    pub game_type: GameType,
    /// Hints remaining at save time
    pub hints_left: u32,
    /// Mistakes remaining at save time
    pub mistakes_left: u32,
    /// Saved guess history
    pub guesses: &'a [Guess],
    /// Saved row layout
    pub arrangement: Option<&'a [Vec<Word>]>,
    /// Effective start time (already shifted by the time spent suspended)
    pub start_time: Timestamp,
}

/// Archived play to display read-only.
#[derive(Clone, Debug)]
pub struct ResultsView<'a> {
    /// Mode played
    pub game_type: GameType,
    /// Guess history
    pub guesses: &'a [Guess],
    /// Mistakes made
    pub mistakes_made: u32,
    /// Hints used
    pub hints_used: u32,
    /// Whether the player won
    pub won: bool,
    /// Whether a time trial ran out of time
    pub ran_out_of_time: bool,
    /// Recorded start
    pub start_time: Timestamp,
    /// Recorded end
    pub end_time: Timestamp,
}

// =============================================================================
// GAME SESSION
// =============================================================================

/// One play-through of a puzzle.
#[derive(Clone, Debug)]
pub struct GameSession {
    config: EngineConfig,
    phase: SessionPhase,
    game_type: Option<GameType>,
    grid: Grid,
    rng: DeterministicRng,
    hints_left: u32,
    mistakes_left: u32,
    hint_shown: bool,
    start_time: Option<Timestamp>,
    end_time: Option<Timestamp>,
    end_reason: Option<EndReason>,
    /// Categories still to reveal after a loss, easiest first.
    auto_solve: VecDeque<DifficultyColor>,
    read_only: bool,
}

impl GameSession {
    /// Fresh session in [`SessionPhase::ModeSelect`].
    pub fn new(puzzle: Puzzle, config: EngineConfig, seed: u64) -> Self {
        let mut rng = DeterministicRng::new(seed);
        let grid = Grid::new(puzzle, &mut rng);

        Self {
            hints_left: config.max_hints,
            mistakes_left: config.max_mistakes,
            config,
            phase: SessionPhase::ModeSelect,
            game_type: None,
            grid,
            rng,
            hint_shown: false,
            start_time: None,
            end_time: None,
            end_reason: None,
            auto_solve: VecDeque::new(),
            read_only: false,
        }
    }

    /// Resume a saved session directly into [`SessionPhase::Active`].
    ///
    /// A save that already describes a finished board (all four categories
    /// found, or no mistakes left) comes back as ended.
    pub fn restore(puzzle: Puzzle, config: EngineConfig, seed: u64, save: Restore<'_>, now: Timestamp) -> Self {
        let grid = Grid::reconstruct(puzzle, save.guesses, save.arrangement);

        let mut session = Self {
            hints_left: save.hints_left.min(config.max_hints),
            mistakes_left: save.mistakes_left.min(config.max_mistakes),
            config,
            phase: SessionPhase::Active,
            game_type: Some(save.game_type),
            grid,
            rng: DeterministicRng::new(seed),
            hint_shown: false,
            start_time: Some(save.start_time),
            end_time: None,
            end_reason: None,
            auto_solve: VecDeque::new(),
            read_only: false,
        };

        if session.grid.all_categories_solved() {
            session.end(EndReason::Won, now);
        } else if session.mistakes_left == 0 {
            session.end(EndReason::OutOfMistakes, now);
        }

        info!(
            puzzle = session.puzzle_number(),
            game_type = save.game_type.as_str(),
            solved = session.grid.solved_row_count(),
            phase = ?session.phase,
            "Session restored"
        );
        session
    }

    /// Read-only view of an archived play. The board is rebuilt from the
    /// recorded guesses and any category the player never found is filled
    /// in, easiest first.
    pub fn results(puzzle: Puzzle, config: EngineConfig, view: ResultsView<'_>) -> Self {
        let mut grid = Grid::reconstruct(puzzle, view.guesses, None);
        for color in grid.unsolved_colors() {
            grid.resolve_category(color);
        }

        let end_reason = if view.won {
            EndReason::Won
        } else if view.ran_out_of_time {
            EndReason::OutOfTime
        } else {
            EndReason::OutOfMistakes
        };

        Self {
            hints_left: config.max_hints.saturating_sub(view.hints_used),
            mistakes_left: config.max_mistakes.saturating_sub(view.mistakes_made),
            config,
            phase: SessionPhase::Ended,
            game_type: Some(view.game_type),
            grid,
            rng: DeterministicRng::default(),
            hint_shown: false,
            start_time: Some(view.start_time),
            end_time: Some(view.end_time),
            end_reason: Some(end_reason),
            auto_solve: VecDeque::new(),
            read_only: true,
        }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    /// Current phase.
    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    /// Mode, once chosen.
    pub fn game_type(&self) -> Option<GameType> {
        self.game_type
    }

    /// The board.
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    /// Puzzle number being played.
    pub fn puzzle_number(&self) -> u32 {
        self.grid.puzzle().number()
    }

    /// Rules in force.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Hints remaining.
    pub fn hints_left(&self) -> u32 {
        self.hints_left
    }

    /// Hints spent.
    pub fn hints_used(&self) -> u32 {
        self.config.max_hints.saturating_sub(self.hints_left)
    }

    /// Mistakes remaining.
    pub fn mistakes_left(&self) -> u32 {
        self.mistakes_left
    }

    /// Mistakes made.
    pub fn mistakes_made(&self) -> u32 {
        self.config.max_mistakes.saturating_sub(self.mistakes_left)
    }

    /// True while a hint highlight is displayed.
    pub fn hint_shown(&self) -> bool {
        self.hint_shown
    }

    /// When play started (clock start for time trials).
    pub fn start_time(&self) -> Option<Timestamp> {
        self.start_time
    }

    /// When the session ended.
    pub fn end_time(&self) -> Option<Timestamp> {
        self.end_time
    }

    /// Why the session ended.
    pub fn end_reason(&self) -> Option<EndReason> {
        self.end_reason
    }

    /// True once ended with a win.
    pub fn is_won(&self) -> bool {
        self.end_reason == Some(EndReason::Won)
    }

    /// True once a time trial expired.
    pub fn ran_out_of_time(&self) -> bool {
        self.end_reason == Some(EndReason::OutOfTime)
    }

    /// True for archived-result views.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Submit is enabled: active with four words selected.
    pub fn can_submit(&self) -> bool {
        self.is_playable() && self.grid.selection().len() == WORDS_PER_CATEGORY
    }

    /// Deselect is enabled: active with something selected.
    pub fn can_deselect(&self) -> bool {
        self.is_playable() && !self.grid.selection().is_empty()
    }

    /// Hint button is enabled.
    pub fn hint_available(&self) -> bool {
        self.is_playable() && self.hints_left > 0 && !self.hint_shown
    }

    fn is_playable(&self) -> bool {
        !self.read_only && self.phase == SessionPhase::Active
    }

    /// Seconds of play so far (frozen at end).
    pub fn elapsed_secs(&self, now: Timestamp) -> i64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => elapsed_secs(&start, &end),
            (Some(start), None) => elapsed_secs(&start, &now),
            _ => 0,
        }
    }

    /// Seconds left on a time-trial clock; `None` in classic mode.
    pub fn time_left_secs(&self, now: Timestamp) -> Option<i64> {
        if self.game_type != Some(GameType::TimeTrial) {
            return None;
        }
        let limit = self.config.time_limit_secs;
        Some((limit - self.elapsed_secs(now)).max(0))
    }

    /// True if a snapshot may be written now. Time trials stop
    /// snapshotting below the cutoff so a reload can't resume a dead clock.
    pub fn snapshot_allowed(&self, now: Timestamp) -> bool {
        if !self.is_playable() {
            return false;
        }
        match self.time_left_secs(now) {
            Some(left) => left >= self.config.snapshot_cutoff_secs,
            None => true,
        }
    }

    // =========================================================================
    // TRANSITIONS
    // =========================================================================

    /// Choose a mode. Classic starts immediately; a time trial goes to the
    /// countdown and its clock waits for [`GameSession::begin_playing`].
    pub fn select_mode(&mut self, game_type: GameType, now: Timestamp) -> Result<SessionPhase, SessionError> {
        if self.read_only {
            return Err(SessionError::ReadOnly);
        }
        if self.phase != SessionPhase::ModeSelect {
            return Err(SessionError::WrongPhase {
                expected: SessionPhase::ModeSelect,
                actual: self.phase,
            });
        }

        self.game_type = Some(game_type);
        match game_type {
            GameType::Classic => self.activate(now),
            GameType::TimeTrial => {
                self.phase = SessionPhase::Countdown;
                debug!(puzzle = self.puzzle_number(), secs = self.config.countdown_secs, "Countdown started");
            }
        }
        Ok(self.phase)
    }

    /// End the time-trial countdown and start the clock.
    pub fn begin_playing(&mut self, now: Timestamp) -> Result<(), SessionError> {
        if self.phase != SessionPhase::Countdown {
            return Err(SessionError::WrongPhase {
                expected: SessionPhase::Countdown,
                actual: self.phase,
            });
        }
        self.activate(now);
        Ok(())
    }

    fn activate(&mut self, now: Timestamp) {
        self.phase = SessionPhase::Active;
        self.start_time = Some(now);
        info!(
            puzzle = self.puzzle_number(),
            game_type = self.game_type.map_or("unknown", GameType::as_str),
            "Session active"
        );
    }

    fn require_active(&self) -> Result<(), SessionError> {
        if self.read_only {
            return Err(SessionError::ReadOnly);
        }
        if self.phase != SessionPhase::Active {
            return Err(SessionError::NotActive);
        }
        Ok(())
    }

    fn end(&mut self, reason: EndReason, now: Timestamp) {
        self.phase = SessionPhase::Ended;
        self.end_time = Some(now);
        self.end_reason = Some(reason);
        self.hint_shown = false;
        self.grid.deselect_all();

        if !reason.is_win() {
            self.auto_solve = self.grid.unsolved_colors().into();
        }

        info!(
            puzzle = self.puzzle_number(),
            reason = ?reason,
            elapsed = self.elapsed_secs(now),
            "Session ended"
        );
    }

    // =========================================================================
    // PLAYER ACTIONS
    // =========================================================================

    /// Toggle a word's selection. Returns true if the selection changed.
    pub fn toggle_select(&mut self, word: &Word) -> Result<bool, SessionError> {
        self.require_active()?;
        Ok(self.grid.toggle_select(word))
    }

    /// Toggle by word text. Unknown text leaves the selection unchanged.
    pub fn toggle_select_text(&mut self, text: &str) -> Result<bool, SessionError> {
        self.require_active()?;
        Ok(match self.grid.word(text) {
            Some(word) => self.grid.toggle_select(&word),
            None => false,
        })
    }

    /// Clear the selection.
    pub fn deselect_all(&mut self) -> Result<(), SessionError> {
        self.require_active()?;
        self.grid.deselect_all();
        Ok(())
    }

    /// Reorder the unsolved words.
    pub fn shuffle(&mut self) -> Result<(), SessionError> {
        self.require_active()?;
        self.grid.shuffle(&mut self.rng);
        Ok(())
    }

    /// Spend a hint. Returns the words to highlight.
    pub fn use_hint(&mut self) -> Result<Vec<Word>, SessionError> {
        self.require_active()?;
        if self.hints_left == 0 {
            return Err(SessionError::NoHintsLeft);
        }
        if self.hint_shown {
            return Err(SessionError::HintAlreadyShown);
        }

        self.hints_left -= 1;
        self.hint_shown = true;
        let targets = self.grid.hint_targets();
        debug!(puzzle = self.puzzle_number(), hints_left = self.hints_left, highlighted = targets.len(), "Hint used");
        Ok(targets)
    }

    /// Hide the hint highlight, re-enabling the hint button.
    pub fn dismiss_hint(&mut self) {
        self.hint_shown = false;
    }

    /// Grade the current selection.
    pub fn submit_guess(&mut self, now: Timestamp) -> Result<GuessOutcome, SessionError> {
        self.require_active()?;

        if self.time_left_secs(now) == Some(0) {
            self.end(EndReason::OutOfTime, now);
            return Ok(GuessOutcome::TimeUp);
        }

        let selected = self.grid.selection().len();
        if selected != WORDS_PER_CATEGORY {
            return Err(SessionError::IncompleteSelection(selected));
        }

        let guess = self.grid.selection_guess();
        if !self.grid.record_guess(guess.clone()) {
            debug!(puzzle = self.puzzle_number(), "Guess already made");
            return Ok(GuessOutcome::AlreadyGuessed);
        }

        if let Some(color) = self.grid.matching_category(&guess).map(|c| c.color()) {
            self.grid.resolve_category(color);
            let game_won = self.grid.all_categories_solved();
            debug!(puzzle = self.puzzle_number(), color = %color, "Category found");
            if game_won {
                self.end(EndReason::Won, now);
            }
            return Ok(GuessOutcome::Correct { color, game_won });
        }

        let one_away = self.grid.match_count(&guess) == WORDS_PER_CATEGORY - 1;
        self.mistakes_left = self.mistakes_left.saturating_sub(1);
        let game_lost = self.mistakes_left == 0;
        debug!(puzzle = self.puzzle_number(), one_away, mistakes_left = self.mistakes_left, "Wrong guess");
        if game_lost {
            self.end(EndReason::OutOfMistakes, now);
        }

        let mistakes_left = self.mistakes_left;
        Ok(if one_away {
            GuessOutcome::OneAway { mistakes_left, game_lost }
        } else {
            GuessOutcome::Miss { mistakes_left, game_lost }
        })
    }

    /// Advance the time-trial clock. Ends the session when it hits zero.
    pub fn tick(&mut self, now: Timestamp) -> TickOutcome {
        if !self.is_playable() {
            return TickOutcome::Idle;
        }
        match self.time_left_secs(now) {
            None => TickOutcome::Idle,
            Some(0) => {
                self.end(EndReason::OutOfTime, now);
                TickOutcome::Expired
            }
            Some(time_left_secs) => TickOutcome::Running { time_left_secs },
        }
    }

    // =========================================================================
    // AUTO-SOLVE
    // =========================================================================

    /// True while revealed-after-loss categories are still pending.
    pub fn auto_solve_pending(&self) -> bool {
        !self.auto_solve.is_empty()
    }

    /// Reveal the next (easiest) unsolved category.
    pub fn step_auto_solve(&mut self) -> Option<DifficultyColor> {
        while let Some(color) = self.auto_solve.pop_front() {
            if self.grid.resolve_category(color) {
                debug!(puzzle = self.puzzle_number(), color = %color, "Auto-solved");
                return Some(color);
            }
        }
        None
    }

    /// Reveal every remaining category. Returns them in reveal order.
    pub fn complete_auto_solve(&mut self) -> Vec<DifficultyColor> {
        std::iter::from_fn(|| self.step_auto_solve()).collect()
    }
}
