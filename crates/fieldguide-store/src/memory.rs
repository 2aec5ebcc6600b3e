//! In-memory versioned snapshot store.
//!
//! Holds the `(set, version)` pair behind a process-local mutex. Used by
//! tests and the diagnostic binary; the durable counterpart is
//! [`SqliteStore`](crate::sqlite::SqliteStore). Both perform the same
//! compare-and-swap: a commit is accepted only when its version strictly
//! exceeds the stored one, so a slow, older commit can never clobber a
//! faster, newer one.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use fieldguide_types::{Snapshot, SpeciesId};
use tokio::task::JoinHandle;

use crate::commit::{CommitOutcome, Committer};
use crate::error::StoreError;
use crate::latency::CommitLatency;

/// Shared in-memory snapshot store.
///
/// Cloning yields another handle to the same underlying state, mirroring
/// how every connection handle to a durable store sees the same data.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    state: Arc<Mutex<Stored>>,
    latency: CommitLatency,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The store's single shared record.
#[derive(Debug, Default)]
struct Stored {
    ids: BTreeSet<SpeciesId>,
    version: u64,
}

impl MemoryStore {
    /// Create an empty store at version 0.
    pub fn new() -> Self {
        Self {
            state: Arc::default(),
            latency: CommitLatency::disabled(),
        }
    }

    /// Set the simulated latency applied to delayed commits.
    #[must_use]
    pub fn with_latency(mut self, latency: CommitLatency) -> Self {
        self.latency = latency;
        self
    }

    /// Schedule an asynchronous compare-and-swap commit.
    ///
    /// The caller is not blocked; the commit body optionally sleeps (when
    /// `delay` is set) and then performs the check-then-set inside the
    /// store's critical section. A losing commit is discarded, not queued.
    pub fn persist(
        &self,
        ids: BTreeSet<SpeciesId>,
        version: u64,
        delay: bool,
    ) -> JoinHandle<Result<CommitOutcome, StoreError>> {
        let state = Arc::clone(&self.state);
        let latency = self.latency;
        tokio::spawn(async move {
            tracing::debug!(version, size = ids.len(), "memory commit started");
            if delay {
                latency.maybe_sleep().await;
            }
            let outcome = {
                let mut stored = state.lock().unwrap_or_else(PoisonError::into_inner);
                if version > stored.version {
                    stored.ids = ids;
                    stored.version = version;
                    CommitOutcome::Accepted { version }
                } else {
                    CommitOutcome::Stale {
                        version,
                        current: stored.version,
                    }
                }
            };
            match outcome {
                CommitOutcome::Accepted { version } => {
                    tracing::debug!(version, "memory commit accepted");
                }
                CommitOutcome::Stale { version, current } => {
                    tracing::debug!(version, current, "memory commit superseded");
                }
            }
            Ok(outcome)
        })
    }

    /// Return the latest accepted snapshot.
    pub fn load(&self) -> (BTreeSet<SpeciesId>, u64) {
        let stored = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        (stored.ids.clone(), stored.version)
    }

    /// Clear the stored set and version. Testing only.
    pub fn reset(&self) {
        let mut stored = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        *stored = Stored::default();
    }
}

impl Committer for MemoryStore {
    fn commit(&self, snapshot: Snapshot) -> JoinHandle<Result<CommitOutcome, StoreError>> {
        self.persist(snapshot.ids, snapshot.version, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn species(raw: u32) -> SpeciesId {
        SpeciesId::new(raw)
    }

    #[tokio::test]
    async fn accepts_strictly_newer_versions() {
        let store = MemoryStore::new();
        let first: BTreeSet<SpeciesId> = [species(1)].into_iter().collect();
        let outcome = store.persist(first.clone(), 1, false).await;
        assert!(matches!(
            outcome,
            Ok(Ok(CommitOutcome::Accepted { version: 1 }))
        ));
        assert_eq!(store.load(), (first, 1));
    }

    #[tokio::test]
    async fn rejects_equal_and_older_versions() {
        let store = MemoryStore::new();
        let newer: BTreeSet<SpeciesId> = [species(1), species(2)].into_iter().collect();
        let older: BTreeSet<SpeciesId> = [species(9)].into_iter().collect();

        let first = store.persist(newer.clone(), 2, false).await;
        assert!(matches!(first, Ok(Ok(outcome)) if outcome.is_accepted()));

        let stale = store.persist(older, 2, false).await;
        assert!(matches!(
            stale,
            Ok(Ok(CommitOutcome::Stale {
                version: 2,
                current: 2
            }))
        ));
        assert_eq!(store.load(), (newer, 2));
    }

    #[tokio::test]
    async fn reset_returns_to_empty_state() {
        let store = MemoryStore::new();
        let ids: BTreeSet<SpeciesId> = [species(4)].into_iter().collect();
        let done = store.persist(ids, 1, false).await;
        assert!(done.is_ok());
        store.reset();
        assert_eq!(store.load(), (BTreeSet::new(), 0));
    }
}
