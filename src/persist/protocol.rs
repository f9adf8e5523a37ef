//! Persistence & Recovery Protocol
//!
//! [`Coordinator`] sits between a [`GameSession`] and the stores:
//!
//! 1. **Entry** runs the rotation check, then decides between blocking
//!    (another device holds the guard), resuming a save, showing an archived
//!    result, or offering mode selection.
//! 2. **Actions** that change persisted state run against a clone of the
//!    session. The clone is saved first and only committed to memory once
//!    the write succeeds, so a failed write leaves the live session as if
//!    the action never happened.
//! 3. **End** completes the auto-solve, archives exactly one record per
//!    puzzle number, bumps achievement counters, clears the save state and
//!    releases the guard, all in one read-modify-write.
//!
//! The guard is cooperative. Each device refuses to start while another's
//! token is present (and not stale), and every write re-reads the account
//! and stops with [`ProtocolError::GuardLost`] once the token is no longer
//! its own.

use std::sync::Arc;

use chrono::Duration;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::core::clock::{Clock, Timestamp};
use crate::core::ids::{AccountId, InstanceId};
use crate::core::rng::derive_shuffle_seed;
use crate::game::events::{GuessOutcome, TickOutcome};
use crate::game::puzzle::{Puzzle, PuzzleError};
use crate::game::session::{GameSession, GameType, SessionError, SessionPhase};
use crate::game::word::Word;
use crate::persist::documents::{AccountRecord, PlayedGameRecord, SaveState};
use crate::persist::rotation::RotationClock;
use crate::persist::store::{AccountStore, PuzzleStore, StatusStore, StoreError};

// =============================================================================
// ERRORS & OUTCOMES
// =============================================================================

/// Failure of a protocol operation.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Session rejected the action.
    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    /// Storage failed. The action did not happen and may be retried.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Puzzle data is malformed.
    #[error("Puzzle error: {0}")]
    Puzzle(#[from] PuzzleError),

    /// Rotation points at a puzzle the store does not have.
    #[error("Puzzle {0} not found")]
    PuzzleMissing(u32),

    /// No live session registered for the account.
    #[error("No live session for {0}")]
    UnknownSession(AccountId),

    /// This device no longer holds the guard. Nothing was written and the
    /// live session did not change.
    #[error("Session guard lost (now held by {holder:?})")]
    GuardLost {
        /// Token of the device now holding the guard, if any
        holder: Option<InstanceId>,
    },

    /// The puzzle was archived by another session in the meantime.
    #[error("Puzzle {0} already archived")]
    AlreadyArchived(u32),
}

impl ProtocolError {
    /// True when the session can no longer write and should be re-entered.
    pub fn is_displaced(&self) -> bool {
        matches!(self, ProtocolError::GuardLost { .. } | ProtocolError::AlreadyArchived(_))
    }
}

/// Result of entering the game screen.
#[derive(Debug)]
pub enum Entry {
    /// Another device is mid-session. No board was built.
    InProgressElsewhere {
        /// Token of the device holding the guard
        holder: InstanceId,
    },
    /// A saved session for today's puzzle was restored.
    Resumed(LiveSession),
    /// Today's puzzle is already archived; read-only results.
    ViewResults(LiveSession),
    /// Nothing saved or archived; choose a mode.
    ModeSelect(LiveSession),
}

/// Entry outcome without the session payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    /// See [`Entry::InProgressElsewhere`]
    InProgressElsewhere,
    /// See [`Entry::Resumed`]
    Resumed,
    /// See [`Entry::ViewResults`]
    ViewResults,
    /// See [`Entry::ModeSelect`]
    ModeSelect,
}

impl Entry {
    /// Payload-free kind.
    pub fn kind(&self) -> EntryKind {
        match self {
            Entry::InProgressElsewhere { .. } => EntryKind::InProgressElsewhere,
            Entry::Resumed(_) => EntryKind::Resumed,
            Entry::ViewResults(_) => EntryKind::ViewResults,
            Entry::ModeSelect(_) => EntryKind::ModeSelect,
        }
    }

    /// The session, unless entry was blocked.
    pub fn into_live(self) -> Option<LiveSession> {
        match self {
            Entry::InProgressElsewhere { .. } => None,
            Entry::Resumed(live) | Entry::ViewResults(live) | Entry::ModeSelect(live) => Some(live),
        }
    }
}

/// Result of trying to start active play.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Guard claimed; the session is now in this phase.
    Started(SessionPhase),
    /// Another device took the guard first. The session did not change.
    HeldElsewhere {
        /// Token of the device holding the guard
        holder: InstanceId,
    },
}

// =============================================================================
// LIVE SESSION
// =============================================================================

/// A session bound to the account and device playing it.
#[derive(Clone, Debug)]
pub struct LiveSession {
    account: AccountId,
    instance: InstanceId,
    session: GameSession,
}

impl LiveSession {
    /// Account playing.
    pub fn account(&self) -> &AccountId {
        &self.account
    }

    /// Device playing.
    pub fn instance(&self) -> &InstanceId {
        &self.instance
    }

    /// Read access to the session.
    pub fn session(&self) -> &GameSession {
        &self.session
    }

    /// Toggle a word. Selection is not persisted.
    pub fn toggle_select(&mut self, word: &Word) -> Result<bool, SessionError> {
        self.session.toggle_select(word)
    }

    /// Toggle a word by text. Selection is not persisted.
    pub fn toggle_select_text(&mut self, text: &str) -> Result<bool, SessionError> {
        self.session.toggle_select_text(text)
    }

    /// Clear the selection.
    pub fn deselect_all(&mut self) -> Result<(), SessionError> {
        self.session.deselect_all()
    }

    /// Hide the hint highlight.
    pub fn dismiss_hint(&mut self) {
        self.session.dismiss_hint();
    }
}

// =============================================================================
// COORDINATOR
// =============================================================================

/// Drives sessions against the stores.
pub struct Coordinator {
    accounts: Arc<dyn AccountStore>,
    puzzles: Arc<dyn PuzzleStore>,
    rotation: RotationClock,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl Coordinator {
    /// Create over the given collaborators.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        puzzles: Arc<dyn PuzzleStore>,
        status: Arc<dyn StatusStore>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            rotation: RotationClock::new(status, puzzles.clone()),
            accounts,
            puzzles,
            clock,
            config,
        }
    }

    /// Engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Rotation clock in use.
    pub fn rotation(&self) -> &RotationClock {
        &self.rotation
    }

    /// Today's puzzle number (rotating first if a day has passed).
    pub fn current_puzzle_number(&self) -> Result<u32, ProtocolError> {
        Ok(self.rotation.check_and_rotate(self.clock.now())?.current_puzzle_number)
    }

    // =========================================================================
    // ENTRY
    // =========================================================================

    /// Enter the game screen for `account` on device `instance`.
    pub fn enter(&self, account: &AccountId, instance: &InstanceId) -> Result<Entry, ProtocolError> {
        let now = self.clock.now();
        let puzzle_number = self.rotation.check_and_rotate(now)?.current_puzzle_number;
        let puzzle = self
            .puzzles
            .get_puzzle(puzzle_number)?
            .ok_or(ProtocolError::PuzzleMissing(puzzle_number))?;

        let mut record = match self.accounts.read_account(account) {
            Ok(Some(record)) => record,
            Ok(None) => AccountRecord::new(account.clone()),
            Err(e) => {
                warn!(account = %account, error = %e, "Account unreadable; starting fresh");
                return Ok(Entry::ModeSelect(self.fresh(account, instance, puzzle, now)));
            }
        };

        if let Some(holder) = self.foreign_holder(&record, instance, now) {
            info!(account = %account, holder = %holder, "Session in progress elsewhere");
            return Ok(Entry::InProgressElsewhere { holder });
        }

        if let Some(save) = record.latest_game_save_state.take() {
            let archived = record.has_played(puzzle_number);
            if save.puzzle_number == puzzle_number && !save.finished && !archived {
                return self.resume(record, save, instance, puzzle, now);
            }
            info!(
                account = %account,
                saved = save.puzzle_number,
                today = puzzle_number,
                archived,
                "Discarding stale save state"
            );
            if let Err(e) = self.accounts.write_account(&record) {
                warn!(account = %account, error = %e, "Could not clear stale save state");
            }
        }

        if let Some(played) = record.played_game(puzzle_number) {
            debug!(account = %account, puzzle = puzzle_number, "Showing archived result");
            let session = GameSession::results(puzzle, self.config.clone(), played.as_results_view());
            return Ok(Entry::ViewResults(self.bind(account, instance, session)));
        }

        Ok(Entry::ModeSelect(self.fresh(account, instance, puzzle, now)))
    }

    fn resume(
        &self,
        mut record: AccountRecord,
        save: SaveState,
        instance: &InstanceId,
        puzzle: Puzzle,
        now: Timestamp,
    ) -> Result<Entry, ProtocolError> {
        let account = record.user_id.clone();
        let seed = self.seed(&account, puzzle.number(), instance, now);
        let mut session = GameSession::restore(puzzle, self.config.clone(), seed, save.as_restore(now), now);

        if session.phase() == SessionPhase::Ended {
            // Save described a finished board that never got archived
            record.set_guard(instance, now);
            self.archive(record, instance, &mut session)?;
            return Ok(Entry::ViewResults(self.bind(&account, instance, session)));
        }

        record.latest_game_save_state = SaveState::capture(&session, now);
        record.set_guard(instance, now);
        self.accounts.write_account(&record)?;

        info!(account = %account, puzzle = session.puzzle_number(), "Resumed saved session");
        Ok(Entry::Resumed(self.bind(&account, instance, session)))
    }

    fn fresh(&self, account: &AccountId, instance: &InstanceId, puzzle: Puzzle, now: Timestamp) -> LiveSession {
        let seed = self.seed(account, puzzle.number(), instance, now);
        let session = GameSession::new(puzzle, self.config.clone(), seed);
        self.bind(account, instance, session)
    }

    fn bind(&self, account: &AccountId, instance: &InstanceId, session: GameSession) -> LiveSession {
        LiveSession {
            account: account.clone(),
            instance: instance.clone(),
            session,
        }
    }

    fn seed(&self, account: &AccountId, puzzle_number: u32, instance: &InstanceId, now: Timestamp) -> u64 {
        let nonce = now.timestamp_nanos_opt().unwrap_or_else(|| now.timestamp());
        derive_shuffle_seed(account.as_str(), puzzle_number, instance.as_str(), nonce)
    }

    /// Token of another device whose guard is still valid.
    fn foreign_holder(&self, record: &AccountRecord, instance: &InstanceId, now: Timestamp) -> Option<InstanceId> {
        let holder = record.active_instance_id.as_ref()?;
        if holder == instance {
            return None;
        }

        if let (Some(limit), Some(since)) = (self.config.guard_stale_after, record.active_instance_since) {
            let stale = Duration::from_std(limit).is_ok_and(|limit| now - since >= limit);
            if stale {
                warn!(account = %record.user_id, holder = %holder, since = %since, "Taking over stale session guard");
                return None;
            }
        }

        Some(holder.clone())
    }

    /// Error unless `instance` is the current guard holder.
    fn require_guard(&self, record: &AccountRecord, instance: &InstanceId) -> Result<(), ProtocolError> {
        match &record.active_instance_id {
            Some(holder) if holder == instance => Ok(()),
            holder => {
                warn!(
                    account = %record.user_id,
                    instance = %instance,
                    holder = ?holder,
                    "Guard lost; refusing to write"
                );
                Err(ProtocolError::GuardLost { holder: holder.clone() })
            }
        }
    }

    // =========================================================================
    // ACTIONS
    // =========================================================================

    /// Choose a mode. Classic play claims the guard immediately; a time
    /// trial claims it when the countdown ends.
    pub fn select_mode(&self, live: &mut LiveSession, game_type: GameType) -> Result<Admission, ProtocolError> {
        let now = self.clock.now();
        let mut next = live.session.clone();
        let phase = next.select_mode(game_type, now)?;

        if phase == SessionPhase::Countdown {
            live.session = next;
            return Ok(Admission::Started(phase));
        }
        self.admit(live, next, now)
    }

    /// End the time-trial countdown and start the clock.
    pub fn begin_playing(&self, live: &mut LiveSession) -> Result<Admission, ProtocolError> {
        let now = self.clock.now();
        let mut next = live.session.clone();
        next.begin_playing(now)?;
        self.admit(live, next, now)
    }

    /// Claim the guard and write the first snapshot in one write.
    fn admit(&self, live: &mut LiveSession, next: GameSession, now: Timestamp) -> Result<Admission, ProtocolError> {
        let mut record = self.load(&live.account)?;
        if let Some(holder) = self.foreign_holder(&record, &live.instance, now) {
            info!(account = %live.account, holder = %holder, "Guard held elsewhere; not starting");
            return Ok(Admission::HeldElsewhere { holder });
        }
        if record.has_played(next.puzzle_number()) {
            info!(account = %live.account, puzzle = next.puzzle_number(), "Puzzle archived meanwhile; not starting");
            return Err(ProtocolError::AlreadyArchived(next.puzzle_number()));
        }

        record.set_guard(&live.instance, now);
        record.latest_game_save_state = SaveState::capture(&next, now);
        self.accounts.write_account(&record)?;

        let phase = next.phase();
        live.session = next;
        Ok(Admission::Started(phase))
    }

    /// Grade the current selection.
    pub fn submit_guess(&self, live: &mut LiveSession) -> Result<GuessOutcome, ProtocolError> {
        self.apply(live, |session, now| session.submit_guess(now))
    }

    /// Shuffle the unsolved words.
    pub fn shuffle(&self, live: &mut LiveSession) -> Result<(), ProtocolError> {
        self.apply(live, |session, _| session.shuffle())
    }

    /// Spend a hint. Returns the words to highlight.
    pub fn use_hint(&self, live: &mut LiveSession) -> Result<Vec<Word>, ProtocolError> {
        self.apply(live, |session, _| session.use_hint())
    }

    /// Periodic tick: snapshot a running time trial, or archive on expiry.
    pub fn tick(&self, live: &mut LiveSession) -> Result<TickOutcome, ProtocolError> {
        let now = self.clock.now();
        let mut next = live.session.clone();
        let outcome = next.tick(now);
        if outcome != TickOutcome::Idle {
            self.persist(live, &mut next, now)?;
        }
        live.session = next;
        Ok(outcome)
    }

    /// Leave the game screen: final snapshot, then release the guard.
    /// A device that does not hold the guard writes nothing.
    pub fn exit(&self, live: &LiveSession) -> Result<(), ProtocolError> {
        let now = self.clock.now();
        let mut record = self.load(&live.account)?;

        if record.active_instance_id.as_ref() != Some(&live.instance) {
            debug!(
                account = %live.account,
                holder = ?record.active_instance_id,
                "Guard not held by this device; exiting without a write"
            );
            return Ok(());
        }
        if live.session.snapshot_allowed(now) && !record.has_played(live.session.puzzle_number()) {
            record.latest_game_save_state = SaveState::capture(&live.session, now);
        }
        record.release_guard(&live.instance);
        self.accounts.write_account(&record)?;

        info!(account = %live.account, puzzle = live.session.puzzle_number(), "Exited session");
        Ok(())
    }

    /// Run a session action on a clone, persist, then commit.
    fn apply<T>(
        &self,
        live: &mut LiveSession,
        action: impl FnOnce(&mut GameSession, Timestamp) -> Result<T, SessionError>,
    ) -> Result<T, ProtocolError> {
        let now = self.clock.now();
        let mut next = live.session.clone();
        let out = action(&mut next, now)?;
        self.persist(live, &mut next, now)?;
        live.session = next;
        Ok(out)
    }

    /// Write whatever `next` needs: the archive if it ended, otherwise a
    /// snapshot (unless suppressed).
    fn persist(&self, live: &LiveSession, next: &mut GameSession, now: Timestamp) -> Result<(), ProtocolError> {
        let ended = next.phase() == SessionPhase::Ended && !next.is_read_only();
        if !ended && !next.snapshot_allowed(now) {
            debug!(account = %live.account, "Snapshot suppressed");
            return Ok(());
        }

        let mut record = self.load(&live.account)?;
        self.require_guard(&record, &live.instance)?;
        if ended {
            return self.archive(record, &live.instance, next);
        }
        if record.has_played(next.puzzle_number()) {
            warn!(account = %live.account, puzzle = next.puzzle_number(), "Puzzle already archived; not snapshotting");
            return Err(ProtocolError::AlreadyArchived(next.puzzle_number()));
        }

        record.latest_game_save_state = SaveState::capture(next, now);
        record.active_instance_since = Some(now);
        self.accounts.write_account(&record)?;
        Ok(())
    }

    /// Finish a session: auto-solve, archive, count, clear save and guard.
    /// `record` is the freshly loaded account, already checked for the guard.
    fn archive(
        &self,
        mut record: AccountRecord,
        instance: &InstanceId,
        session: &mut GameSession,
    ) -> Result<(), ProtocolError> {
        session.complete_auto_solve();
        let Some(played) = PlayedGameRecord::from_session(session) else {
            return Ok(());
        };

        let account = record.user_id.clone();
        if record.has_played(played.puzzle_number) {
            warn!(account = %account, puzzle = played.puzzle_number, "Puzzle already archived; keeping original record");
        } else {
            record.achievements.record_game(&played, self.config.under_time_secs);
            record.played_games.push(played.clone());
        }
        record.latest_game_save_state = None;
        record.release_guard(instance);
        self.accounts.write_account(&record)?;

        info!(
            account = %account,
            puzzle = played.puzzle_number,
            won = played.won,
            solved = played.categories_solved,
            "Game archived"
        );
        Ok(())
    }

    /// Account for a read-modify-write. An undecodable document is replaced.
    fn load(&self, account: &AccountId) -> Result<AccountRecord, StoreError> {
        match self.accounts.read_account(account) {
            Ok(record) => Ok(record.unwrap_or_else(|| AccountRecord::new(account.clone()))),
            Err(StoreError::Malformed(e)) => {
                warn!(account = %account, error = %e, "Replacing unreadable account document");
                Ok(AccountRecord::new(account.clone()))
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::{parse_timestamp, ManualClock};
    use crate::game::puzzle::tests::sample_puzzle;
    use crate::game::puzzle::PuzzleCatalog;
    use crate::game::word::DifficultyColor;
    use crate::persist::store::MemoryStore;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        coordinator: Coordinator,
    }

    fn fixture() -> Fixture {
        fixture_with(EngineConfig::default())
    }

    fn fixture_with(config: EngineConfig) -> Fixture {
        let catalog = PuzzleCatalog::from_puzzles(vec![sample_puzzle(100), sample_puzzle(101)]).unwrap();
        let store = Arc::new(MemoryStore::new(catalog));
        let clock = Arc::new(ManualClock::new(parse_timestamp("2024-06-01T10:00:00-04:00").unwrap()));
        let coordinator = Coordinator::new(store.clone(), store.clone(), store.clone(), clock.clone(), config);
        Fixture { store, clock, coordinator }
    }

    /// Guard goes stale after a minute.
    fn quick_takeover() -> Fixture {
        fixture_with(EngineConfig {
            guard_stale_after: Some(std::time::Duration::from_secs(60)),
            ..EngineConfig::default()
        })
    }

    fn alice() -> AccountId {
        AccountId::new("alice")
    }

    fn live(f: &Fixture, instance: &str) -> LiveSession {
        f.coordinator
            .enter(&alice(), &InstanceId::new(instance))
            .unwrap()
            .into_live()
            .unwrap()
    }

    fn guess(f: &Fixture, live: &mut LiveSession, words: &[&str]) -> GuessOutcome {
        live.deselect_all().unwrap();
        for word in words {
            live.toggle_select_text(word).unwrap();
        }
        f.coordinator.submit_guess(live).unwrap()
    }

    fn account(f: &Fixture) -> AccountRecord {
        f.store.read_account(&alice()).unwrap().unwrap()
    }

    #[test]
    fn test_fresh_entry_is_mode_select() {
        let f = fixture();
        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-1")).unwrap();
        assert_eq!(entry.kind(), EntryKind::ModeSelect);
        let live = entry.into_live().unwrap();
        assert_eq!(live.session().puzzle_number(), 100);
        assert_eq!(live.session().phase(), SessionPhase::ModeSelect);
    }

    #[test]
    fn test_classic_claims_guard_and_snapshots() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        let admission = f.coordinator.select_mode(&mut live, GameType::Classic).unwrap();
        assert_eq!(admission, Admission::Started(SessionPhase::Active));

        let record = account(&f);
        assert_eq!(record.active_instance_id, Some(InstanceId::new("tab-1")));
        assert_eq!(record.latest_game_save_state.map(|s| s.puzzle_number), Some(100));
    }

    #[test]
    fn test_second_device_is_blocked() {
        let f = fixture();
        let mut first = live(&f, "tab-1");
        f.coordinator.select_mode(&mut first, GameType::Classic).unwrap();

        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-2")).unwrap();
        assert!(matches!(entry, Entry::InProgressElsewhere { ref holder } if holder.as_str() == "tab-1"));

        // Same device re-entering resumes
        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-1")).unwrap();
        assert_eq!(entry.kind(), EntryKind::Resumed);
    }

    #[test]
    fn test_admission_refused_when_guard_taken() {
        let f = fixture();
        let mut late = live(&f, "tab-2");
        let mut early = live(&f, "tab-1");
        f.coordinator.select_mode(&mut early, GameType::Classic).unwrap();

        let admission = f.coordinator.select_mode(&mut late, GameType::Classic).unwrap();
        assert_eq!(admission, Admission::HeldElsewhere { holder: InstanceId::new("tab-1") });
        assert_eq!(late.session().phase(), SessionPhase::ModeSelect);
    }

    #[test]
    fn test_stale_guard_is_taken_over() {
        let f = fixture();
        let mut first = live(&f, "tab-1");
        f.coordinator.select_mode(&mut first, GameType::Classic).unwrap();

        f.clock.advance(Duration::hours(25));
        // A day passed, so the save is also stale for today's puzzle
        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-2")).unwrap();
        assert_eq!(entry.kind(), EntryKind::ModeSelect);
        assert_eq!(entry.into_live().unwrap().session().puzzle_number(), 101);
    }

    #[test]
    fn test_displaced_device_cannot_write() {
        let f = quick_takeover();
        let mut first = live(&f, "tab-1");
        f.coordinator.select_mode(&mut first, GameType::Classic).unwrap();

        // Same day, guard gone stale
        f.clock.advance(Duration::seconds(61));
        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-2")).unwrap();
        assert_eq!(entry.kind(), EntryKind::Resumed);
        let mut second = entry.into_live().unwrap();
        guess(&f, &mut second, &["sun", "lemon", "banana", "gold"]);

        first.deselect_all().unwrap();
        for word in ["apple", "pear", "orange", "peach"] {
            first.toggle_select_text(word).unwrap();
        }
        let err = f.coordinator.submit_guess(&mut first).unwrap_err();
        assert!(matches!(err, ProtocolError::GuardLost { holder: Some(ref h) } if h.as_str() == "tab-2"));
        assert!(err.is_displaced());
        assert_eq!(first.session().grid().guesses().len(), 0);
        assert_eq!(first.session().grid().selection().len(), 4);

        // Leaving does not touch the new holder's state
        f.coordinator.exit(&first).unwrap();
        let record = account(&f);
        assert_eq!(record.active_instance_id, Some(InstanceId::new("tab-2")));
        assert_eq!(record.latest_game_save_state.unwrap().guesses.len(), 1);

        let resumed = live(&f, "tab-2");
        assert_eq!(resumed.session().grid().solved_colors(), &[DifficultyColor::Yellow]);
    }

    #[test]
    fn test_displaced_device_cannot_archive() {
        let f = quick_takeover();
        let mut first = live(&f, "tab-1");
        f.coordinator.select_mode(&mut first, GameType::Classic).unwrap();
        guess(&f, &mut first, &["sun", "lemon", "banana", "gold"]);
        guess(&f, &mut first, &["apple", "pear", "orange", "peach"]);
        guess(&f, &mut first, &["cucumber", "carrot", "potato", "eggplant"]);

        f.clock.advance(Duration::seconds(61));
        let second = live(&f, "tab-2");
        assert_eq!(second.session().grid().solved_row_count(), 3);

        first.deselect_all().unwrap();
        for word in ["milk", "juice", "soda", "punch"] {
            first.toggle_select_text(word).unwrap();
        }
        assert!(matches!(
            f.coordinator.submit_guess(&mut first),
            Err(ProtocolError::GuardLost { .. })
        ));
        assert_eq!(first.session().phase(), SessionPhase::Active);

        let record = account(&f);
        assert!(record.played_games.is_empty());
        assert_eq!(record.active_instance_id, Some(InstanceId::new("tab-2")));
        assert!(record.latest_game_save_state.is_some());
    }

    #[test]
    fn test_archived_puzzle_is_not_resumed() {
        let f = fixture();
        let mut first = live(&f, "tab-1");
        f.coordinator.select_mode(&mut first, GameType::Classic).unwrap();
        guess(&f, &mut first, &["sun", "lemon", "banana", "gold"]);
        let leftover = account(&f).latest_game_save_state;
        assert!(leftover.is_some());
        guess(&f, &mut first, &["apple", "pear", "orange", "peach"]);
        guess(&f, &mut first, &["cucumber", "carrot", "potato", "eggplant"]);
        guess(&f, &mut first, &["milk", "juice", "soda", "punch"]);
        assert!(first.session().is_won());

        // A save for the same puzzle sits next to its archive
        let mut record = account(&f);
        record.latest_game_save_state = leftover;
        f.store.write_account(&record).unwrap();

        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-2")).unwrap();
        assert_eq!(entry.kind(), EntryKind::ViewResults);
        assert!(entry.into_live().unwrap().session().is_won());
        let record = account(&f);
        assert!(record.latest_game_save_state.is_none());
        assert!(record.active_instance_id.is_none());
        assert_eq!(record.played_games.len(), 1);
    }

    #[test]
    fn test_mode_select_after_archive_is_refused() {
        let f = fixture();
        let mut idle = live(&f, "tab-2");
        let mut first = live(&f, "tab-1");
        f.coordinator.select_mode(&mut first, GameType::Classic).unwrap();
        guess(&f, &mut first, &["sun", "lemon", "apple", "milk"]);
        guess(&f, &mut first, &["sun", "pear", "carrot", "milk"]);
        assert!(guess(&f, &mut first, &["sun", "pear", "soda", "potato"]).ended_session());

        assert!(matches!(
            f.coordinator.select_mode(&mut idle, GameType::Classic),
            Err(ProtocolError::AlreadyArchived(100))
        ));
        assert_eq!(idle.session().phase(), SessionPhase::ModeSelect);
        let record = account(&f);
        assert!(record.active_instance_id.is_none());
        assert!(record.latest_game_save_state.is_none());
    }

    #[test]
    fn test_rotation_rewind_moves_to_next_puzzle() {
        let f = fixture();
        assert_eq!(f.coordinator.current_puzzle_number().unwrap(), 100);
        f.coordinator.rotation().rewind_hours(24, f.clock.now()).unwrap();
        assert_eq!(f.coordinator.current_puzzle_number().unwrap(), 101);
        assert_eq!(live(&f, "tab-1").session().puzzle_number(), 101);
    }

    #[test]
    fn test_exit_snapshots_then_releases() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        f.coordinator.select_mode(&mut live, GameType::Classic).unwrap();
        guess(&f, &mut live, &["sun", "lemon", "banana", "gold"]);

        f.coordinator.exit(&live).unwrap();
        let record = account(&f);
        assert!(record.active_instance_id.is_none());
        let save = record.latest_game_save_state.unwrap();
        assert_eq!(save.guesses.len(), 1);

        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-2")).unwrap();
        assert_eq!(entry.kind(), EntryKind::Resumed);
        let resumed = entry.into_live().unwrap();
        assert_eq!(resumed.session().grid().solved_row_count(), 1);
        assert_eq!(account(&f).active_instance_id, Some(InstanceId::new("tab-2")));
    }

    #[test]
    fn test_failed_write_leaves_session_unchanged() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        f.coordinator.select_mode(&mut live, GameType::Classic).unwrap();
        for word in ["sun", "lemon", "banana", "gold"] {
            live.toggle_select_text(word).unwrap();
        }

        f.store.set_fail_writes(true);
        let err = f.coordinator.submit_guess(&mut live).unwrap_err();
        assert!(matches!(err, ProtocolError::Store(StoreError::Unavailable(_))));
        assert_eq!(live.session().grid().solved_row_count(), 0);
        assert_eq!(live.session().grid().guesses().len(), 0);
        assert_eq!(live.session().grid().selection().len(), 4);

        f.store.set_fail_writes(false);
        let outcome = f.coordinator.submit_guess(&mut live).unwrap();
        assert!(matches!(outcome, GuessOutcome::Correct { .. }));
    }

    #[test]
    fn test_loss_archives_once() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        f.coordinator.select_mode(&mut live, GameType::Classic).unwrap();
        guess(&f, &mut live, &["sun", "lemon", "apple", "milk"]);
        guess(&f, &mut live, &["sun", "pear", "carrot", "milk"]);
        let outcome = guess(&f, &mut live, &["sun", "pear", "soda", "potato"]);
        assert!(outcome.ended_session());

        assert_eq!(live.session().grid().solved_row_count(), 4);
        let record = account(&f);
        assert_eq!(record.played_games.len(), 1);
        assert!(record.latest_game_save_state.is_none());
        assert!(record.active_instance_id.is_none());
        assert_eq!(record.achievements.regular_games_completed, 1);
        assert_eq!(record.played_games[0].categories_solved, 0);

        // Re-entry shows results, read-only
        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-1")).unwrap();
        assert_eq!(entry.kind(), EntryKind::ViewResults);
        let mut view = entry.into_live().unwrap();
        assert!(view.session().is_read_only());
        assert!(matches!(
            f.coordinator.shuffle(&mut view),
            Err(ProtocolError::Session(SessionError::ReadOnly))
        ));
    }

    #[test]
    fn test_unreadable_account_falls_back_to_fresh() {
        let f = fixture();
        f.store.put_raw_account(alice(), serde_json::json!("garbage")).unwrap();
        let entry = f.coordinator.enter(&alice(), &InstanceId::new("tab-1")).unwrap();
        assert_eq!(entry.kind(), EntryKind::ModeSelect);

        let mut live = entry.into_live().unwrap();
        f.coordinator.select_mode(&mut live, GameType::Classic).unwrap();
        assert!(account(&f).is_in_game());
    }

    #[test]
    fn test_unavailable_store_surfaces_error() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        f.store.set_fail_reads(true);
        assert!(matches!(
            f.coordinator.select_mode(&mut live, GameType::Classic),
            Err(ProtocolError::Store(StoreError::Unavailable(_)))
        ));
        assert_eq!(live.session().phase(), SessionPhase::ModeSelect);
    }

    #[test]
    fn test_time_trial_guard_waits_for_countdown() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        let admission = f.coordinator.select_mode(&mut live, GameType::TimeTrial).unwrap();
        assert_eq!(admission, Admission::Started(SessionPhase::Countdown));
        assert!(f.store.read_account(&alice()).unwrap().is_none());

        f.clock.advance(Duration::seconds(3));
        let admission = f.coordinator.begin_playing(&mut live).unwrap();
        assert_eq!(admission, Admission::Started(SessionPhase::Active));
        assert!(account(&f).is_in_game());

        f.clock.advance(Duration::seconds(10));
        assert_eq!(
            f.coordinator.tick(&mut live).unwrap(),
            TickOutcome::Running { time_left_secs: 50 }
        );
        let save = account(&f).latest_game_save_state.unwrap();
        assert_eq!((save.created_at - save.game_start_time).num_seconds(), 10);
    }

    #[test]
    fn test_time_trial_resume_continues_clock() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        f.coordinator.select_mode(&mut live, GameType::TimeTrial).unwrap();
        f.coordinator.begin_playing(&mut live).unwrap();
        f.clock.advance(Duration::seconds(20));
        f.coordinator.exit(&live).unwrap();

        f.clock.advance(Duration::minutes(30));
        let resumed = f
            .coordinator
            .enter(&alice(), &InstanceId::new("tab-1"))
            .unwrap()
            .into_live()
            .unwrap();
        assert_eq!(resumed.session().time_left_secs(f.clock.now()), Some(40));
    }

    #[test]
    fn test_snapshots_stop_near_expiry() {
        let f = fixture();
        let mut live = live(&f, "tab-1");
        f.coordinator.select_mode(&mut live, GameType::TimeTrial).unwrap();
        f.coordinator.begin_playing(&mut live).unwrap();

        f.clock.advance(Duration::seconds(58));
        f.coordinator.tick(&mut live).unwrap();
        let at_58 = account(&f).latest_game_save_state.unwrap().created_at;

        f.clock.advance(Duration::seconds(1));
        f.coordinator.tick(&mut live).unwrap();
        assert_eq!(account(&f).latest_game_save_state.unwrap().created_at, at_58);

        f.clock.advance(Duration::seconds(1));
        assert_eq!(f.coordinator.tick(&mut live).unwrap(), TickOutcome::Expired);
        let record = account(&f);
        assert_eq!(record.played_games.len(), 1);
        assert!(record.played_games[0].ran_out_of_time());
        assert_eq!(record.achievements.time_trials_completed, 1);
    }
}
