//! Connections Demo
//!
//! Plays one scripted classic session against the in-memory store and
//! logs every event the host emits.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::info;
use tracing_subscriber::EnvFilter;

use connections::{
    persist::AchievementKind, AccountId, AccountStore, Coordinator, EngineConfig, EntryKind, GameType, InstanceId,
    MemoryStore, PuzzleCatalog, SessionHost, SystemClock, VERSION,
};

const PUZZLES_JSON: &str = include_str!("../data/puzzles.json");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Connections engine v{}", VERSION);

    let config = EngineConfig::from_env();
    let catalog = PuzzleCatalog::from_json(PUZZLES_JSON).context("loading puzzle catalog")?;
    info!(puzzles = catalog.len(), "Catalog loaded");

    let store = Arc::new(MemoryStore::new(catalog));
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        store.clone(),
        store.clone(),
        Arc::new(SystemClock),
        config,
    ));
    let host = SessionHost::new(coordinator);

    let mut events = host.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(account = %event.account, event = ?event.event, "Event");
        }
    });

    info!(puzzle = host.coordinator().current_puzzle_number()?, "Today's puzzle");

    let account = AccountId::new("demo-player");
    let device = InstanceId::generate();
    demo_classic(&host, &account, &device).await?;

    // Re-entering after the archive shows results
    let kind = host.enter(&account, &device).await?;
    info!(entry = ?kind, "Re-entered");
    host.exit(&account).await?;

    let record = store.read_account(&account)?.context("account was never written")?;
    let counters = &record.achievements;
    info!(
        regular = counters.count(AchievementKind::RegularGames),
        no_mistakes = counters.count(AchievementKind::NoMistakes),
        tier = ?counters.tier(AchievementKind::RegularGames),
        total = counters.total(),
        "Achievements"
    );

    tokio::time::sleep(Duration::from_millis(50)).await;
    printer.abort();
    Ok(())
}

/// Enter, make one wrong guess, then solve every category.
async fn demo_classic(host: &SessionHost, account: &AccountId, device: &InstanceId) -> anyhow::Result<()> {
    let kind = host.enter(account, device).await?;
    if kind != EntryKind::ModeSelect {
        bail!("expected mode selection, got {kind:?}");
    }
    host.select_mode(account, GameType::Classic).await?;

    // Another device is turned away while this one plays
    let other = host.coordinator().enter(account, &InstanceId::generate())?;
    info!(entry = ?other.kind(), "Second device");

    let puzzle = host.view(account).await?.session().grid().puzzle().clone();
    let categories: Vec<_> = puzzle.categories().cloned().collect();

    // One word from each of the first two categories swapped
    let mut wrong: Vec<String> = categories[0].words()[..3].to_vec();
    wrong.push(categories[1].words()[0].clone());
    guess(host, account, &wrong).await?;

    let hinted = host.use_hint(account).await?;
    info!(words = ?hinted.iter().map(|w| w.text()).collect::<Vec<_>>(), "Hint");
    host.dismiss_hint(account).await?;

    for category in &categories {
        guess(host, account, category.words()).await?;
    }

    host.exit(account).await?;
    Ok(())
}

async fn guess(host: &SessionHost, account: &AccountId, words: &[String]) -> anyhow::Result<()> {
    host.deselect_all(account).await?;
    for word in words {
        host.toggle_select(account, word).await?;
    }
    let outcome = host.submit_guess(account).await?;
    info!(?outcome, "Guess");
    Ok(())
}
