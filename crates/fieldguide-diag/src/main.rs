//! Stale-write diagnostics for the Fieldguide caught-list sync.
//!
//! Demonstrates, against a live store backend, the property the whole
//! mechanism exists for: a commit that started earlier but finishes later
//! with a lower version never overwrites newer state, and overlapping
//! edits compose instead of racing.
//!
//! # Run Sequence
//!
//! 1. Load configuration from `fieldguide.yaml` (optional; defaults apply)
//! 2. Initialize structured logging (tracing)
//! 3. Build the configured store backend and audit event log
//! 4. Race a delayed v1 commit against an immediate v2 commit and verify
//!    the final state is v2's
//! 5. Apply an overlapping edit sequence through the merger and verify the
//!    context, the store, and the audit log all agree

mod config;

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::{Context, ensure};
use fieldguide_session::{EditMerger, MemoryContext, read_selection};
use fieldguide_store::{Committer, EventLog, MemoryStore, SqliteStore};
use fieldguide_types::{SpeciesId, SpeciesRow};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::DiagConfig;

/// Application entry point for the diagnostics binary.
///
/// # Errors
///
/// Returns an error if the configured backend cannot be opened or if
/// either demonstration fails its convergence check.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration (first, so logging can honor its level).
    let config = load_config()?;

    // 2. Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.logging.level.clone())),
        )
        .with_target(true)
        .init();

    info!("fieldguide-diag starting");
    info!(
        backend = config.store.backend,
        probability = config.latency.probability,
        floor_ms = config.latency.floor_ms,
        ceiling_ms = config.latency.ceiling_ms,
        "Configuration loaded"
    );

    let latency = config.latency.to_commit_latency();

    // 3-5. Run both demonstrations against the configured backend.
    match config.store.backend.as_str() {
        "sqlite" => {
            let store = SqliteStore::open(&config.store.db_path)
                .await
                .context("failed to open the caught-list database")?
                .with_latency(latency);
            store
                .reset()
                .await
                .context("failed to reset the caught-list database")?;

            race_demo_sqlite(&store).await?;
            store.reset().await.context("failed to reset between demos")?;
            merge_demo(&config, store.clone()).await?;

            let (ids, version) = store.load().await?;
            info!(version, size = ids.len(), "final sqlite state");
            store.close().await;
        }
        _ => {
            let store = MemoryStore::new().with_latency(latency);

            race_demo_memory(&store).await?;
            store.reset();
            merge_demo(&config, store.clone()).await?;

            let (ids, version) = store.load();
            info!(version, size = ids.len(), "final memory state");
        }
    }

    info!("diagnostics complete");
    Ok(())
}

/// Load `fieldguide.yaml` from the working directory when present,
/// otherwise fall back to defaults. Environment overrides apply either
/// way.
fn load_config() -> anyhow::Result<DiagConfig> {
    let path = Path::new("fieldguide.yaml");
    if path.exists() {
        DiagConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        let mut config = DiagConfig::default();
        config.store.apply_env_overrides();
        Ok(config)
    }
}

/// Race a delayed v1 commit against an immediate v2 commit on the
/// in-memory store and verify convergence to v2.
async fn race_demo_memory(store: &MemoryStore) -> anyhow::Result<()> {
    info!("racing delayed v1 against immediate v2 (memory backend)");
    let slow = store.persist(set(&[1]), 1, true);
    let fast = store.persist(set(&[1, 2]), 2, false);

    let (slow, fast) = tokio::join!(slow, fast);
    let slow = slow.context("slow commit task panicked")??;
    let fast = fast.context("fast commit task panicked")??;
    info!(outcome = ?slow, "v1 commit finished");
    info!(outcome = ?fast, "v2 commit finished");

    let (ids, version) = store.load();
    check_converged(&ids, version)
}

/// Race a delayed v1 commit against an immediate v2 commit on the
/// `SQLite` store and verify convergence to v2.
async fn race_demo_sqlite(store: &SqliteStore) -> anyhow::Result<()> {
    info!("racing delayed v1 against immediate v2 (sqlite backend)");
    let slow = store.persist(set(&[1]), 1, true);
    let fast = store.persist(set(&[1, 2]), 2, false);

    let (slow, fast) = tokio::join!(slow, fast);
    let slow = slow.context("slow commit task panicked")??;
    let fast = fast.context("fast commit task panicked")??;
    info!(outcome = ?slow, "v1 commit finished");
    info!(outcome = ?fast, "v2 commit finished");

    let (ids, version) = store.load().await?;
    check_converged(&ids, version)
}

/// The convergence assertion shared by both race demos: whichever commit
/// finished last, the store must hold the v2 snapshot.
fn check_converged(ids: &BTreeSet<SpeciesId>, version: u64) -> anyhow::Result<()> {
    ensure!(
        version == 2,
        "stale write overwrote newer state: version {version}"
    );
    ensure!(
        *ids == set(&[1, 2]),
        "unexpected membership after race: {ids:?}"
    );
    info!("converged to the newest snapshot despite commit reordering");
    Ok(())
}

/// Apply an overlapping edit sequence (mark 1, mark 2, unmark 1) through
/// the merger and verify the context, the outcome stream, and the audit
/// log all agree on the final set `{2}`.
async fn merge_demo<S: Committer>(config: &DiagConfig, store: S) -> anyhow::Result<()> {
    info!("applying overlapping edits: mark 1, mark 2, unmark 1");
    let log = EventLog::new(&config.store.event_log_path)
        .with_compact_every(config.store.compact_every);
    let context = Arc::new(Mutex::new(MemoryContext::new()));
    let merger = EditMerger::new(context, store).with_audit(log.clone());

    let base = [row(1, false), row(2, false)];
    let step1 = [row(1, true), row(2, false)];
    let step2 = [row(1, true), row(2, true)];
    let step3 = [row(1, false), row(2, true)];

    let reports = vec![
        merger.apply_edits(&base, &step1),
        merger.apply_edits(&step1, &step2),
        merger.apply_edits(&step2, &step3),
    ];
    for report in reports {
        let version = report.version;
        if let Some(commit) = report.commit {
            let outcome = commit.await.context("commit task panicked")??;
            info!(version, outcome = ?outcome, "merge commit finished");
        }
    }

    let context = merger.context();
    let state = {
        let guard = context.lock().unwrap_or_else(PoisonError::into_inner);
        read_selection(&*guard)
    };
    ensure!(
        state.ids == set(&[2]),
        "working set diverged after overlapping edits: {:?}",
        state.ids
    );
    ensure!(
        state.last_committed == 3,
        "committed watermark is {} instead of 3",
        state.last_committed
    );

    let (replayed, events) = log.load().context("failed to replay the audit log")?;
    info!(events, replayed = ?replayed, "audit log replayed");
    ensure!(
        replayed == state.ids,
        "audit replay {replayed:?} disagrees with the working set"
    );

    info!("overlapping edits composed; no update was lost");
    Ok(())
}

/// Build a species set from raw dex numbers.
fn set(raws: &[u32]) -> BTreeSet<SpeciesId> {
    raws.iter().copied().map(SpeciesId::new).collect()
}

/// Build a reported row.
const fn row(raw: u32, caught: bool) -> SpeciesRow {
    SpeciesRow::new(SpeciesId::new(raw), caught)
}
