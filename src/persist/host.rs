//! Session Host
//!
//! Async front for the [`Coordinator`]. Holds the live session for each
//! account, runs the time-trial countdown and ticker tasks, and broadcasts
//! [`SessionEvent`]s to subscribers.
//!
//! Lock order is always session lock first, then registry lock. Nothing
//! holds the registry lock while waiting on a session.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::core::ids::{AccountId, InstanceId};
use crate::game::events::{GuessOutcome, SessionEvent, TickOutcome};
use crate::game::session::{GameSession, GameType, SessionPhase};
use crate::game::word::{DifficultyColor, Word};
use crate::persist::protocol::{Admission, Coordinator, EntryKind, LiveSession, ProtocolError};

/// Buffered events per subscriber before the slowest one starts lagging.
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Event tagged with the account it concerns.
#[derive(Clone, Debug, PartialEq)]
pub struct HostEvent {
    /// Account the event belongs to
    pub account: AccountId,
    /// The event
    pub event: SessionEvent,
}

type SharedSession = Arc<RwLock<LiveSession>>;

/// Registry of live sessions plus their background tasks.
#[derive(Clone)]
pub struct SessionHost {
    coordinator: Arc<Coordinator>,
    sessions: Arc<RwLock<BTreeMap<AccountId, SharedSession>>>,
    events: broadcast::Sender<HostEvent>,
}

impl SessionHost {
    /// Create a host with no live sessions.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            coordinator,
            sessions: Arc::new(RwLock::new(BTreeMap::new())),
            events,
        }
    }

    /// Receive every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<HostEvent> {
        self.events.subscribe()
    }

    /// Underlying coordinator.
    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Copy of an account's live session.
    pub async fn view(&self, account: &AccountId) -> Result<LiveSession, ProtocolError> {
        let live = self.live(account).await?;
        let guard = live.read().await;
        Ok(guard.clone())
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Enter the game screen. Registers the session unless entry was blocked,
    /// and restarts the ticker for a resumed time trial.
    pub async fn enter(&self, account: &AccountId, instance: &InstanceId) -> Result<EntryKind, ProtocolError> {
        let entry = self.coordinator.enter(account, instance)?;
        let kind = entry.kind();
        let Some(live) = entry.into_live() else {
            if self.sessions.write().await.remove(account).is_some() {
                debug!(account = %account, "Entry blocked; dropped previous live session");
            }
            return Ok(kind);
        };

        let phase = live.session().phase();
        let game_type = live.session().game_type();
        let live = Arc::new(RwLock::new(live));
        if self.sessions.write().await.insert(account.clone(), live.clone()).is_some() {
            debug!(account = %account, "Replaced live session");
        }

        self.emit(account, SessionEvent::PhaseChanged { phase, game_type });
        if kind == EntryKind::Resumed && game_type == Some(GameType::TimeTrial) {
            self.spawn_ticker(account.clone(), live);
        }
        Ok(kind)
    }

    /// Choose a mode. A time trial runs its countdown in the background and
    /// then starts the ticker.
    pub async fn select_mode(&self, account: &AccountId, game_type: GameType) -> Result<Admission, ProtocolError> {
        let live = self.live(account).await?;
        let admission = {
            let mut guard = live.write().await;
            self.coordinator.select_mode(&mut guard, game_type)?
        };

        if let Admission::Started(phase) = admission {
            self.emit(account, SessionEvent::PhaseChanged { phase, game_type: Some(game_type) });
            if phase == SessionPhase::Countdown {
                self.spawn_countdown(account.clone(), live);
            }
        }
        Ok(admission)
    }

    /// Leave the game screen. Stops background tasks for the session.
    pub async fn exit(&self, account: &AccountId) -> Result<(), ProtocolError> {
        let live = self.live(account).await?;
        let guard = live.write().await;
        self.coordinator.exit(&guard)?;

        let mut sessions = self.sessions.write().await;
        if sessions.get(account).is_some_and(|current| Arc::ptr_eq(current, &live)) {
            sessions.remove(account);
        }
        Ok(())
    }

    // =========================================================================
    // PLAYER ACTIONS
    // =========================================================================

    /// Toggle a word by its text.
    pub async fn toggle_select(&self, account: &AccountId, text: &str) -> Result<bool, ProtocolError> {
        let live = self.live(account).await?;
        let mut guard = live.write().await;
        Ok(guard.toggle_select_text(text)?)
    }

    /// Clear the selection.
    pub async fn deselect_all(&self, account: &AccountId) -> Result<(), ProtocolError> {
        let live = self.live(account).await?;
        let mut guard = live.write().await;
        Ok(guard.deselect_all()?)
    }

    /// Shuffle the unsolved words.
    pub async fn shuffle(&self, account: &AccountId) -> Result<(), ProtocolError> {
        let live = self.live(account).await?;
        let mut guard = live.write().await;
        self.coordinator.shuffle(&mut guard)
    }

    /// Spend a hint.
    pub async fn use_hint(&self, account: &AccountId) -> Result<Vec<Word>, ProtocolError> {
        let live = self.live(account).await?;
        let mut guard = live.write().await;
        let words = self.coordinator.use_hint(&mut guard)?;
        self.emit(
            account,
            SessionEvent::HintShown {
                words: words.clone(),
                hints_left: guard.session().hints_left(),
            },
        );
        Ok(words)
    }

    /// Hide the hint highlight.
    pub async fn dismiss_hint(&self, account: &AccountId) -> Result<(), ProtocolError> {
        let live = self.live(account).await?;
        live.write().await.dismiss_hint();
        Ok(())
    }

    /// Grade the current selection.
    pub async fn submit_guess(&self, account: &AccountId) -> Result<GuessOutcome, ProtocolError> {
        let live = self.live(account).await?;
        let mut guard = live.write().await;
        let before = guard.session().grid().solved_colors().to_vec();

        let outcome = self.coordinator.submit_guess(&mut guard)?;
        self.emit(account, SessionEvent::GuessEvaluated { outcome: outcome.clone() });
        if outcome.ended_session() {
            self.emit_end(account, guard.session(), &before);
        }
        Ok(outcome)
    }

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================

    fn spawn_countdown(&self, account: AccountId, live: SharedSession) {
        let host = self.clone();
        let countdown = Duration::from_secs(u64::from(self.coordinator.config().countdown_secs));

        tokio::spawn(async move {
            tokio::time::sleep(countdown).await;

            let admission = {
                let mut guard = live.write().await;
                if !host.is_registered(&account, &live).await {
                    return;
                }
                host.coordinator.begin_playing(&mut guard)
            };

            match admission {
                Ok(Admission::Started(phase)) => {
                    host.emit(&account, SessionEvent::PhaseChanged { phase, game_type: Some(GameType::TimeTrial) });
                    host.run_ticker(account, live).await;
                }
                Ok(Admission::HeldElsewhere { holder }) => {
                    info!(account = %account, holder = %holder, "Time trial not started; guard held elsewhere");
                }
                Err(e) => warn!(account = %account, error = %e, "Could not start time trial"),
            }
        });
    }

    fn spawn_ticker(&self, account: AccountId, live: SharedSession) {
        let host = self.clone();
        tokio::spawn(async move {
            host.run_ticker(account, live).await;
        });
    }

    /// Tick a time trial until it ends or leaves the registry.
    async fn run_ticker(&self, account: AccountId, live: SharedSession) {
        let mut ticker = interval(self.coordinator.config().tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let mut guard = live.write().await;
            if !self.is_registered(&account, &live).await {
                debug!(account = %account, "Session left; ticker stopping");
                break;
            }

            let before = guard.session().grid().solved_colors().to_vec();
            match self.coordinator.tick(&mut guard) {
                Ok(TickOutcome::Idle) => break,
                Ok(TickOutcome::Running { time_left_secs }) => {
                    self.emit(&account, SessionEvent::TimerTick { time_left_secs });
                }
                Ok(TickOutcome::Expired) => {
                    self.emit(&account, SessionEvent::TimerTick { time_left_secs: 0 });
                    self.emit_end(&account, guard.session(), &before);
                    break;
                }
                Err(e) if e.is_displaced() => {
                    info!(account = %account, error = %e, "Session displaced; ticker stopping");
                    break;
                }
                // Session unchanged; the next tick retries
                Err(e) => warn!(account = %account, error = %e, "Tick failed"),
            }
        }
    }

    // =========================================================================
    // HELPERS
    // =========================================================================

    async fn live(&self, account: &AccountId) -> Result<SharedSession, ProtocolError> {
        self.sessions
            .read()
            .await
            .get(account)
            .cloned()
            .ok_or_else(|| ProtocolError::UnknownSession(account.clone()))
    }

    async fn is_registered(&self, account: &AccountId, live: &SharedSession) -> bool {
        self.sessions
            .read()
            .await
            .get(account)
            .is_some_and(|current| Arc::ptr_eq(current, live))
    }

    fn emit(&self, account: &AccountId, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(HostEvent {
            account: account.clone(),
            event,
        });
    }

    /// Ended, then any auto-solved reveals, then the archive notice.
    fn emit_end(&self, account: &AccountId, session: &GameSession, solved_before: &[DifficultyColor]) {
        let Some(reason) = session.end_reason() else {
            return;
        };
        self.emit(account, SessionEvent::Ended { reason });

        if !reason.is_win() {
            for &color in session.grid().solved_colors() {
                if !solved_before.contains(&color) {
                    self.emit(account, SessionEvent::CategoryAutoSolved { color });
                }
            }
        }
        self.emit(
            account,
            SessionEvent::Archived {
                puzzle_number: session.puzzle_number(),
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::core::clock::{parse_timestamp, ManualClock};
    use crate::game::events::EndReason;
    use crate::game::puzzle::tests::sample_puzzle;
    use crate::game::puzzle::PuzzleCatalog;
    use crate::persist::store::{AccountStore, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        host: SessionHost,
    }

    fn fixture() -> Fixture {
        let catalog = PuzzleCatalog::from_puzzles(vec![sample_puzzle(7)]).unwrap();
        let store = Arc::new(MemoryStore::new(catalog));
        let clock = Arc::new(ManualClock::new(parse_timestamp("2024-06-01T10:00:00-04:00").unwrap()));
        let config = EngineConfig {
            countdown_secs: 0,
            tick_interval: Duration::from_millis(10),
            ..EngineConfig::default()
        };
        let coordinator = Coordinator::new(store.clone(), store.clone(), store.clone(), clock.clone(), config);
        Fixture {
            store,
            clock,
            host: SessionHost::new(Arc::new(coordinator)),
        }
    }

    fn bob() -> AccountId {
        AccountId::new("bob")
    }

    fn drain(rx: &mut broadcast::Receiver<HostEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(host_event) = rx.try_recv() {
            events.push(host_event.event);
        }
        events
    }

    async fn wait_for_phase(host: &SessionHost, phase: SessionPhase) {
        for _ in 0..100 {
            if host.view(&bob()).await.unwrap().session().phase() == phase {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session never reached {phase:?}");
    }

    #[tokio::test]
    async fn test_enter_registers_session() {
        let f = fixture();
        let mut rx = f.host.subscribe();
        let kind = f.host.enter(&bob(), &InstanceId::new("d1")).await.unwrap();
        assert_eq!(kind, EntryKind::ModeSelect);
        assert_eq!(f.host.session_count().await, 1);
        assert_eq!(
            drain(&mut rx),
            vec![SessionEvent::PhaseChanged { phase: SessionPhase::ModeSelect, game_type: None }]
        );
    }

    #[tokio::test]
    async fn test_unknown_session() {
        let f = fixture();
        assert!(matches!(
            f.host.submit_guess(&bob()).await,
            Err(ProtocolError::UnknownSession(_))
        ));
    }

    #[tokio::test]
    async fn test_classic_guess_and_hint_events() {
        let f = fixture();
        f.host.enter(&bob(), &InstanceId::new("d1")).await.unwrap();
        f.host.select_mode(&bob(), GameType::Classic).await.unwrap();
        let mut rx = f.host.subscribe();

        for word in ["sun", "lemon", "banana", "gold"] {
            assert!(f.host.toggle_select(&bob(), word).await.unwrap());
        }
        let outcome = f.host.submit_guess(&bob()).await.unwrap();
        assert!(matches!(outcome, GuessOutcome::Correct { game_won: false, .. }));

        f.host.toggle_select(&bob(), "apple").await.unwrap();
        let hinted = f.host.use_hint(&bob()).await.unwrap();
        assert!(!hinted.is_empty());

        let events = drain(&mut rx);
        assert!(matches!(events[0], SessionEvent::GuessEvaluated { .. }));
        assert!(matches!(events[1], SessionEvent::HintShown { hints_left: 3, .. }));
        f.host.dismiss_hint(&bob()).await.unwrap();
        assert!(f.host.view(&bob()).await.unwrap().session().hint_available());
    }

    #[tokio::test]
    async fn test_time_trial_expires_and_archives() {
        let f = fixture();
        f.host.enter(&bob(), &InstanceId::new("d1")).await.unwrap();
        let mut rx = f.host.subscribe();

        let admission = f.host.select_mode(&bob(), GameType::TimeTrial).await.unwrap();
        assert_eq!(admission, Admission::Started(SessionPhase::Countdown));
        wait_for_phase(&f.host, SessionPhase::Active).await;

        f.clock.advance(chrono::Duration::seconds(61));
        wait_for_phase(&f.host, SessionPhase::Ended).await;

        let events = drain(&mut rx);
        assert!(events.contains(&SessionEvent::Ended { reason: EndReason::OutOfTime }));
        let revealed = events
            .iter()
            .filter(|e| matches!(e, SessionEvent::CategoryAutoSolved { .. }))
            .count();
        assert_eq!(revealed, 4);
        assert_eq!(events.last(), Some(&SessionEvent::Archived { puzzle_number: 7 }));

        let record = f.store.read_account(&bob()).unwrap().unwrap();
        assert_eq!(record.played_games.len(), 1);
        assert!(record.played_games[0].ran_out_of_time());
    }

    #[tokio::test]
    async fn test_blocked_entry_drops_previous_session() {
        let f = fixture();
        f.host.enter(&bob(), &InstanceId::new("d1")).await.unwrap();
        assert_eq!(f.host.session_count().await, 1);

        // Another device starts playing while d1 sits on mode selection
        let mut other = f
            .host
            .coordinator()
            .enter(&bob(), &InstanceId::new("d2"))
            .unwrap()
            .into_live()
            .unwrap();
        f.host.coordinator().select_mode(&mut other, GameType::Classic).unwrap();

        let kind = f.host.enter(&bob(), &InstanceId::new("d1")).await.unwrap();
        assert_eq!(kind, EntryKind::InProgressElsewhere);
        assert_eq!(f.host.session_count().await, 0);
        assert!(matches!(
            f.host.select_mode(&bob(), GameType::Classic).await,
            Err(ProtocolError::UnknownSession(_))
        ));
        let record = f.store.read_account(&bob()).unwrap().unwrap();
        assert_eq!(record.active_instance_id, Some(InstanceId::new("d2")));
    }

    #[tokio::test]
    async fn test_exit_stops_ticker() {
        let f = fixture();
        f.host.enter(&bob(), &InstanceId::new("d1")).await.unwrap();
        f.host.select_mode(&bob(), GameType::TimeTrial).await.unwrap();
        wait_for_phase(&f.host, SessionPhase::Active).await;

        f.clock.advance(chrono::Duration::seconds(5));
        f.host.exit(&bob()).await.unwrap();
        assert_eq!(f.host.session_count().await, 0);

        f.clock.advance(chrono::Duration::seconds(120));
        tokio::time::sleep(Duration::from_millis(50)).await;

        let record = f.store.read_account(&bob()).unwrap().unwrap();
        assert!(record.played_games.is_empty());
        assert!(record.active_instance_id.is_none());
        let save = record.latest_game_save_state.unwrap();
        assert_eq!((save.created_at - save.game_start_time).num_seconds(), 5);
    }
}
