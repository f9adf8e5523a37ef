//! Core primitives.
//!
//! Deterministic randomness, time access and identifiers. Nothing in this
//! module performs I/O on its own.

pub mod rng;
pub mod clock;
pub mod ids;

// Re-export core types
pub use rng::{DeterministicRng, derive_shuffle_seed};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use ids::{AccountId, InstanceId};
