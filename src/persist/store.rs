//! Document Stores
//!
//! The engine talks to storage through three narrow traits. Each call is a
//! synchronous round-trip that may fail; there are no transactions, so a
//! read-modify-write is only as safe as the session guard makes it.
//!
//! [`MemoryStore`] implements all three over JSON documents held in memory.
//! Documents go through serde on every call, exactly as they would against
//! a real backend.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::core::ids::AccountId;
use crate::game::puzzle::{Puzzle, PuzzleCatalog};
use crate::persist::documents::AccountRecord;
use crate::persist::rotation::RotationStatus;

/// Storage failure.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Document exists but could not be decoded.
    #[error("Malformed document: {0}")]
    Malformed(String),

    /// Required data is absent.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Encoding failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// =============================================================================
// TRAITS
// =============================================================================

/// Per-account documents.
pub trait AccountStore: Send + Sync {
    /// Read an account. `Ok(None)` if it has never been written.
    fn read_account(&self, id: &AccountId) -> Result<Option<AccountRecord>, StoreError>;

    /// Overwrite an account (last write wins).
    fn write_account(&self, record: &AccountRecord) -> Result<(), StoreError>;
}

/// Puzzle lookup.
pub trait PuzzleStore: Send + Sync {
    /// Fetch a puzzle by number.
    fn get_puzzle(&self, puzzle_number: u32) -> Result<Option<Puzzle>, StoreError>;

    /// Smallest and largest known puzzle numbers.
    fn number_range(&self) -> Result<Option<(u32, u32)>, StoreError>;
}

/// Process-wide rotation status.
pub trait StatusStore: Send + Sync {
    /// Read the status document.
    fn read_status(&self) -> Result<Option<RotationStatus>, StoreError>;

    /// Overwrite the status document.
    fn write_status(&self, status: &RotationStatus) -> Result<(), StoreError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// In-memory implementation of every store trait.
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: PuzzleCatalog,
    accounts: Mutex<BTreeMap<AccountId, Value>>,
    status: Mutex<Option<Value>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Store serving `catalog`, with no accounts yet.
    pub fn new(catalog: PuzzleCatalog) -> Self {
        Self {
            catalog,
            ..Default::default()
        }
    }

    /// Make subsequent reads fail with [`StoreError::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with [`StoreError::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Place a raw account document (for seeding or corrupting data).
    pub fn put_raw_account(&self, id: AccountId, doc: Value) -> Result<(), StoreError> {
        self.accounts_lock()?.insert(id, doc);
        Ok(())
    }

    /// Raw account document as last written.
    pub fn raw_account(&self, id: &AccountId) -> Result<Option<Value>, StoreError> {
        Ok(self.accounts_lock()?.get(id).cloned())
    }

    fn accounts_lock(&self) -> Result<MutexGuard<'_, BTreeMap<AccountId, Value>>, StoreError> {
        self.accounts
            .lock()
            .map_err(|_| StoreError::Unavailable("account lock poisoned".into()))
    }

    fn status_lock(&self) -> Result<MutexGuard<'_, Option<Value>>, StoreError> {
        self.status
            .lock()
            .map_err(|_| StoreError::Unavailable("status lock poisoned".into()))
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("read refused".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write refused".into()));
        }
        Ok(())
    }
}

impl AccountStore for MemoryStore {
    fn read_account(&self, id: &AccountId) -> Result<Option<AccountRecord>, StoreError> {
        self.check_read()?;
        let Some(doc) = self.accounts_lock()?.get(id).cloned() else {
            return Ok(None);
        };
        serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn write_account(&self, record: &AccountRecord) -> Result<(), StoreError> {
        self.check_write()?;
        let doc = serde_json::to_value(record)?;
        self.accounts_lock()?.insert(record.user_id.clone(), doc);
        Ok(())
    }
}

impl PuzzleStore for MemoryStore {
    fn get_puzzle(&self, puzzle_number: u32) -> Result<Option<Puzzle>, StoreError> {
        self.check_read()?;
        Ok(self.catalog.get(puzzle_number).cloned())
    }

    fn number_range(&self) -> Result<Option<(u32, u32)>, StoreError> {
        self.check_read()?;
        Ok(self.catalog.min_number().zip(self.catalog.max_number()))
    }
}

impl StatusStore for MemoryStore {
    fn read_status(&self) -> Result<Option<RotationStatus>, StoreError> {
        self.check_read()?;
        let Some(doc) = self.status_lock()?.clone() else {
            return Ok(None);
        };
        serde_json::from_value(doc)
            .map(Some)
            .map_err(|e| StoreError::Malformed(e.to_string()))
    }

    fn write_status(&self, status: &RotationStatus) -> Result<(), StoreError> {
        self.check_write()?;
        let doc = serde_json::to_value(status)?;
        *self.status_lock()? = Some(doc);
        Ok(())
    }
}
