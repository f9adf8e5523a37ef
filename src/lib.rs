//! # Connections Session Engine
//!
//! Session engine for a daily word-grouping puzzle: sixteen words, four
//! hidden categories of four, graded guesses with a mistake budget, and an
//! optional timed mode.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   CONNECTIONS ENGINE                         │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Seeded Xorshift128+ PRNG, seed derivation │
//! │  ├── clock.rs    - Clock trait, calendar-day helpers         │
//! │  └── ids.rs      - Account and device identifiers            │
//! │                                                              │
//! │  game/           - Game logic (no I/O)                       │
//! │  ├── word.rs     - Colors, words, categories, guesses        │
//! │  ├── puzzle.rs   - Puzzle validation and catalog             │
//! │  ├── grid.rs     - Board, matching, replay                   │
//! │  ├── events.rs   - Outcomes and session events               │
//! │  └── session.rs  - Session state machine                     │
//! │                                                              │
//! │  persist/        - Persistence (non-deterministic)           │
//! │  ├── documents.rs- Stored documents, achievements            │
//! │  ├── store.rs    - Store traits, in-memory store             │
//! │  ├── rotation.rs - Daily puzzle rotation                     │
//! │  ├── protocol.rs - Entry, snapshots, guard, archival         │
//! │  └── host.rs     - Async registry and time-trial ticker      │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism
//!
//! The `game/` module never reads the clock or an entropy source. Time is
//! passed in, and the only randomness is the shuffle generator seeded at
//! session creation, so the same inputs always produce the same board.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod config;
pub mod core;
pub mod game;
pub mod persist;

// Re-export commonly used types
pub use config::EngineConfig;
pub use core::clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use core::ids::{AccountId, InstanceId};
pub use core::rng::DeterministicRng;
pub use game::{
    Category, DifficultyColor, EndReason, GameSession, GameType, Grid, Guess, GuessOutcome, Puzzle, PuzzleCatalog,
    PuzzleError, SessionError, SessionEvent, SessionPhase, TickOutcome, Word,
};
pub use persist::{
    AccountRecord, AccountStore, Admission, Coordinator, Entry, EntryKind, LiveSession, MemoryStore, ProtocolError,
    PuzzleStore, SessionHost, StatusStore, StoreError,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
