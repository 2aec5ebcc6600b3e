//! Integration tests for the edit merger.
//!
//! Exercises the lost-update hazards end to end: overlapping merges must
//! compose, a slowed commit must not clobber a newer one, and the final
//! persisted set must always reflect every applied edit.

// Tests use expect/unwrap extensively for clarity -- panicking on failure
// is the correct behavior in test code.
#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::items_after_statements,
    clippy::missing_panics_doc,
    clippy::indexing_slicing
)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fieldguide_session::{EditMerger, MemoryContext, read_selection};
use fieldguide_store::{
    CommitLatency, CommitOutcome, Committer, EventLog, MemoryStore, StoreError,
};
use fieldguide_types::{Snapshot, SpeciesId, SpeciesRow};
use tokio::task::JoinHandle;

fn species(raw: u32) -> SpeciesId {
    SpeciesId::new(raw)
}

fn row(raw: u32, caught: bool) -> SpeciesRow {
    SpeciesRow::new(species(raw), caught)
}

fn set(raws: &[u32]) -> BTreeSet<SpeciesId> {
    raws.iter().copied().map(SpeciesId::new).collect()
}

fn merger_over_memory_store() -> (EditMerger<MemoryContext, MemoryStore>, MemoryStore) {
    let context = Arc::new(Mutex::new(MemoryContext::new()));
    let store = MemoryStore::new();
    (EditMerger::new(context, store.clone()), store)
}

async fn join_commit(
    handle: Option<JoinHandle<Result<CommitOutcome, StoreError>>>,
) -> CommitOutcome {
    handle
        .expect("merge should have dispatched a commit")
        .await
        .expect("commit task panicked")
        .expect("commit failed")
}

/// Captures every dispatched snapshot, optionally holding each commit
/// back; the stand-in for a slow durable store.
#[derive(Clone)]
struct RecordingCommitter {
    saved: Arc<Mutex<Vec<Snapshot>>>,
    delay: Option<Duration>,
}

impl RecordingCommitter {
    fn new(delay: Option<Duration>) -> Self {
        Self {
            saved: Arc::new(Mutex::new(Vec::new())),
            delay,
        }
    }

    fn saved(&self) -> Vec<Snapshot> {
        self.saved.lock().expect("poisoned").clone()
    }
}

impl Committer for RecordingCommitter {
    fn commit(&self, snapshot: Snapshot) -> JoinHandle<Result<CommitOutcome, StoreError>> {
        let saved = Arc::clone(&self.saved);
        let delay = self.delay;
        tokio::spawn(async move {
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let version = snapshot.version;
            saved.lock().expect("poisoned").push(snapshot);
            Ok(CommitOutcome::Accepted { version })
        })
    }
}

// =============================================================================
// Merge correctness under overlapping edits
// =============================================================================

#[tokio::test]
async fn successive_sparse_edits_compose() {
    let (merger, store) = merger_over_memory_store();

    // Rows A=1, B=2, both unmarked. Mark A.
    let table0 = [row(1, false), row(2, false)];
    let mut table1 = table0;
    table1[0] = row(1, true);
    let report = merger.apply_edits(&table0, &table1);
    assert_eq!(report.version, 1);
    join_commit(report.commit).await;

    // Mark B without re-reporting A's change.
    let mut table2 = table1;
    table2[1] = row(2, true);
    let report = merger.apply_edits(&table1, &table2);
    assert_eq!(report.version, 2);
    join_commit(report.commit).await;

    // Unmark A.
    let mut table3 = table2;
    table3[0] = row(1, false);
    let report = merger.apply_edits(&table2, &table3);
    assert_eq!(report.version, 3);
    join_commit(report.commit).await;

    let context = merger.context();
    let state = read_selection(&*context.lock().expect("poisoned"));
    assert_eq!(state.ids, set(&[2]));
    assert_eq!(store.load(), (set(&[2]), 3));
}

#[tokio::test]
async fn final_dispatched_snapshot_reflects_latest_state() {
    // Mirror of the editor flow, but against a recording seam so the
    // exact dispatched snapshots can be inspected.
    let context = Arc::new(Mutex::new(MemoryContext::new()));
    let committer = RecordingCommitter::new(None);
    let merger = EditMerger::new(context, committer.clone());

    let base = [row(1, false), row(2, false)];
    let mut step1 = base;
    step1[0] = row(1, true);
    join_commit(merger.apply_edits(&base, &step1).commit).await;

    let mut step2 = step1;
    step2[1] = row(2, true);
    join_commit(merger.apply_edits(&step1, &step2).commit).await;

    let mut step3 = step2;
    step3[0] = row(1, false);
    join_commit(merger.apply_edits(&step2, &step3).commit).await;

    let saved = committer.saved();
    assert_eq!(saved.len(), 3);
    let last = saved.last().expect("three snapshots were dispatched");
    assert_eq!(last.ids, set(&[2]));
    assert_eq!(last.version, 3);
}

#[tokio::test]
async fn sparse_after_table_applies_unseen_rows_directly() {
    let (merger, store) = merger_over_memory_store();

    // Full before table; the after table names only the changed row.
    let before = [row(1, false), row(2, true)];
    let after = [row(1, true)];
    let report = merger.apply_edits(&before, &after);
    assert_eq!(report.changed, vec![(species(1), true)]);
    join_commit(report.commit).await;

    // Row 3 never appeared in `before` at all.
    let report = merger.apply_edits(&before, &[row(3, true)]);
    assert_eq!(report.changed, vec![(species(3), true)]);
    join_commit(report.commit).await;

    let (ids, version) = store.load();
    assert_eq!(ids, set(&[1, 3]));
    assert_eq!(version, 2);
}

#[tokio::test]
async fn identical_tables_merge_to_noop() {
    let (merger, store) = merger_over_memory_store();

    let table = [row(1, true), row(2, false)];
    let report = merger.apply_edits(&table, &table);
    assert!(report.is_noop());
    assert!(report.commit.is_none());
    assert_eq!(report.version, 0);
    assert_eq!(store.load(), (BTreeSet::new(), 0));
}

// =============================================================================
// Race safety
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_merges_lose_no_updates() {
    // Two tasks toggle different species concurrently; the slow store
    // holds every commit back so the commits also race. Both changes must
    // survive in the context and in the final persisted set.
    let context = Arc::new(Mutex::new(MemoryContext::new()));
    let store = MemoryStore::new().with_latency(CommitLatency::fixed(Duration::from_millis(80)));
    let merger = EditMerger::new(context, store.clone());

    let first = {
        let merger = merger.clone();
        tokio::spawn(async move { merger.apply_toggle(species(1), true) })
    };
    let second = {
        let merger = merger.clone();
        tokio::spawn(async move { merger.apply_toggle(species(2), true) })
    };

    let report1 = first.await.expect("merge task panicked");
    let report2 = second.await.expect("merge task panicked");

    // The lock totally orders the merges: one saw the other's edit.
    let mut versions = [report1.version, report2.version];
    versions.sort_unstable();
    assert_eq!(versions, [1, 2]);

    join_commit(report1.commit).await;
    join_commit(report2.commit).await;

    let (ids, version) = store.load();
    assert_eq!(ids, set(&[1, 2]));
    assert_eq!(version, 2);
}

#[tokio::test]
async fn slowed_commit_does_not_clobber_newer_merge() {
    // First merge's commit is artificially slowed; the second merge's
    // commit lands first. The store must keep the newer snapshot.
    let (merger, store) = merger_over_memory_store();
    let slow_merger = {
        let context = merger.context();
        EditMerger::new(
            context,
            store
                .clone()
                .with_latency(CommitLatency::fixed(Duration::from_millis(120))),
        )
    };

    let slow_report = slow_merger.apply_toggle(species(1), true);
    let fast_report = merger.apply_toggle(species(2), true);
    assert_eq!(slow_report.version, 1);
    assert_eq!(fast_report.version, 2);

    let fast_outcome = join_commit(fast_report.commit).await;
    assert!(fast_outcome.is_accepted());
    let slow_outcome = join_commit(slow_report.commit).await;
    assert!(!slow_outcome.is_accepted());

    let (ids, version) = store.load();
    assert_eq!(ids, set(&[1, 2]));
    assert_eq!(version, 2);
}

// =============================================================================
// End-to-end flows
// =============================================================================

#[tokio::test]
async fn rapid_toggle_sequence_persists_every_species() {
    let (merger, store) = merger_over_memory_store();

    let mut commits = Vec::new();
    for raw in 1..=10 {
        let report = merger.apply_toggle(species(raw), true);
        assert_eq!(report.version, u64::from(raw));
        commits.push(report.commit);
    }
    for commit in commits {
        join_commit(commit).await;
    }

    let (ids, version) = store.load();
    assert_eq!(ids, set(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]));
    assert_eq!(version, 10);

    let context = merger.context();
    let state = read_selection(&*context.lock().expect("poisoned"));
    assert_eq!(state.ids, ids);
    assert_eq!(state.last_committed, 10);
}

#[tokio::test]
async fn accepted_commit_raises_committed_watermark() {
    let (merger, _store) = merger_over_memory_store();

    let report = merger.apply_toggle(species(7), true);
    let outcome = join_commit(report.commit).await;
    assert_eq!(outcome, CommitOutcome::Accepted { version: 1 });

    let context = merger.context();
    let state = read_selection(&*context.lock().expect("poisoned"));
    assert_eq!(state.last_committed, 1);
}

#[tokio::test]
async fn audit_log_replays_to_the_same_set() {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let log = EventLog::new(dir.path().join("caught.log"));

    let context = Arc::new(Mutex::new(MemoryContext::new()));
    let store = MemoryStore::new();
    let merger = EditMerger::new(context, store.clone()).with_audit(log.clone());

    join_commit(merger.apply_toggle(species(1), true).commit).await;
    join_commit(merger.apply_toggle(species(2), true).commit).await;
    join_commit(merger.apply_toggle(species(1), false).commit).await;

    let (replayed, count) = log.load().expect("audit log load failed");
    let (persisted, _) = store.load();
    assert_eq!(replayed, persisted);
    assert_eq!(replayed, set(&[2]));
    assert_eq!(count, 3);
}
