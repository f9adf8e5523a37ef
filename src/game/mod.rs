//! Game Logic Module
//!
//! Puzzle rules with no I/O. Time arrives as an argument and randomness
//! from a seeded generator, so every operation here is reproducible.
//!
//! ## Module Structure
//!
//! - `word`: Colors, words, categories, guesses
//! - `puzzle`: Puzzle validation and the catalog
//! - `grid`: The board, matching and replay
//! - `events`: Outcome values and the session event stream
//! - `session`: Mode selection, budgets, win/loss, auto-solve

pub mod word;
pub mod puzzle;
pub mod grid;
pub mod events;
pub mod session;

// Re-export key types
pub use word::{Category, DifficultyColor, Guess, Word};
pub use puzzle::{Puzzle, PuzzleCatalog, PuzzleError};
pub use grid::Grid;
pub use events::{EndReason, GuessOutcome, SessionEvent, TickOutcome};
pub use session::{GameSession, GameType, Restore, ResultsView, SessionError, SessionPhase};
