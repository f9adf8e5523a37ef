//! Persistence & Recovery
//!
//! Everything that touches storage or wall-clock time lives here. The game
//! module stays pure; this module decides what gets written and when.
//!
//! ## Module Structure
//!
//! - `documents`: Stored document shapes and achievement counters
//! - `store`: Store traits and the in-memory implementation
//! - `rotation`: Daily puzzle rotation
//! - `protocol`: Entry, snapshots, the session guard, archival
//! - `host`: Async session registry and time-trial ticker

pub mod documents;
pub mod store;
pub mod rotation;
pub mod protocol;
pub mod host;

pub use documents::{AccountRecord, AchievementCounters, AchievementKind, ModeDetails, PlayedGameRecord, SaveState};
pub use store::{AccountStore, MemoryStore, PuzzleStore, StatusStore, StoreError};
pub use rotation::{midnight_imminent, RotationClock, RotationStatus};
pub use protocol::{Admission, Coordinator, Entry, EntryKind, LiveSession, ProtocolError};
pub use host::{HostEvent, SessionHost};
