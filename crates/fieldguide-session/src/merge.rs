//! Edit merging: reconciling reported row edits into the authoritative
//! working set, then dispatching an asynchronous snapshot commit.
//!
//! The rendering surface may report a full before/after table of all
//! visible rows or a sparse diff naming only the rows that changed. Two
//! edits in quick succession -- including genuinely concurrent calls from
//! different tasks -- must compose rather than race: the merge always
//! reads the *current* authoritative set under the lock, never a value
//! captured earlier, or the second edit would silently undo the first.
//!
//! Row identity is the stable species id, never a positional index;
//! reordering the displayed rows must not change which species an edit
//! applies to.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use fieldguide_store::{CommitOutcome, Committer, EventLog, StoreError};
use fieldguide_types::{Snapshot, SpeciesId, SpeciesRow};
use tokio::task::JoinHandle;

use crate::context::{CAUGHT_IDS_KEY, ContextExt, SELECTION_VERSION_KEY, SessionContext};
use crate::selection::{ensure_initialized, record_committed, toggle_and_bump};

/// Index over a reported row table, keyed by stable species id.
///
/// When the same species appears more than once, the later row wins,
/// matching fold semantics. The index is order-independent: rebuilding it
/// from a reordered table yields the same id set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowIndex {
    caught_by_species: BTreeMap<SpeciesId, bool>,
}

impl RowIndex {
    /// Build the index from a reported table.
    pub fn from_rows(rows: &[SpeciesRow]) -> Self {
        let mut caught_by_species = BTreeMap::new();
        for row in rows {
            caught_by_species.insert(row.species, row.caught);
        }
        Self { caught_by_species }
    }

    /// The reported caught state for `species`, if the table mentions it.
    pub fn caught(&self, species: SpeciesId) -> Option<bool> {
        self.caught_by_species.get(&species).copied()
    }

    /// The set of species the table mentions, independent of row order.
    pub fn species(&self) -> BTreeSet<SpeciesId> {
        self.caught_by_species.keys().copied().collect()
    }

    /// Iterate `(species, caught)` pairs in id order.
    pub fn iter(&self) -> impl Iterator<Item = (SpeciesId, bool)> + '_ {
        self.caught_by_species
            .iter()
            .map(|(species, caught)| (*species, *caught))
    }

    /// Number of distinct species in the table.
    pub fn len(&self) -> usize {
        self.caught_by_species.len()
    }

    /// Whether the table mentions no species.
    pub fn is_empty(&self) -> bool {
        self.caught_by_species.is_empty()
    }
}

/// The result of one merge call.
#[derive(Debug)]
pub struct MergeReport {
    /// The session version after the merge.
    pub version: u64,
    /// The `(species, caught)` pairs the merge applied, in id order.
    pub changed: Vec<(SpeciesId, bool)>,
    /// Handle to the dispatched commit, absent when nothing changed.
    /// Production flow drops it (fire-and-forget); tests join it.
    pub commit: Option<JoinHandle<Result<CommitOutcome, StoreError>>>,
}

impl MergeReport {
    /// A report for a merge that found no differences.
    const fn unchanged(version: u64) -> Self {
        Self {
            version,
            changed: Vec::new(),
            commit: None,
        }
    }

    /// Whether the merge left the working set untouched.
    pub const fn is_noop(&self) -> bool {
        self.changed.is_empty()
    }
}

/// Reconciles reported edits into the shared session context and
/// dispatches snapshot commits through a [`Committer`].
///
/// The context mutex is the merge critical section: it totally orders
/// overlapping merge calls, so no two read-modify-write sequences
/// interleave. The merger never holds a reference into a store's internal
/// state; only owned value snapshots cross the seam.
pub struct EditMerger<C, S> {
    context: Arc<Mutex<C>>,
    store: S,
    audit: Option<EventLog>,
}

impl<C, S: Clone> Clone for EditMerger<C, S> {
    fn clone(&self) -> Self {
        Self {
            context: Arc::clone(&self.context),
            store: self.store.clone(),
            audit: self.audit.clone(),
        }
    }
}

impl<C, S> EditMerger<C, S>
where
    C: SessionContext + Send + 'static,
    S: Committer,
{
    /// Create a merger over a shared session context and a commit seam.
    pub fn new(context: Arc<Mutex<C>>, store: S) -> Self {
        Self {
            context,
            store,
            audit: None,
        }
    }

    /// Also append each applied toggle to an audit event log.
    #[must_use]
    pub fn with_audit(mut self, log: EventLog) -> Self {
        self.audit = Some(log);
        self
    }

    /// Another handle to the shared session context.
    pub fn context(&self) -> Arc<Mutex<C>> {
        Arc::clone(&self.context)
    }

    /// Merge a reported before/after row table into the working set.
    ///
    /// Under the lock: reads the current authoritative set from the
    /// context, applies every row whose before-state differs from its
    /// after-state (rows absent from `before` are applied directly, which
    /// is what makes sparse diffs work), writes the set back, and bumps
    /// the version once. A merge with zero differences neither bumps nor
    /// commits. Outside the lock: audit appends and one commit dispatch.
    ///
    /// Must be called from within a tokio runtime.
    pub fn apply_edits(&self, before: &[SpeciesRow], after: &[SpeciesRow]) -> MergeReport {
        let before_index = RowIndex::from_rows(before);
        let after_index = RowIndex::from_rows(after);

        let (version, ids, changed) = {
            let mut context = self.lock_context();
            ensure_initialized(&mut *context);
            let current_version = context
                .get_json::<u64>(SELECTION_VERSION_KEY)
                .unwrap_or_default();
            let mut ids: BTreeSet<SpeciesId> =
                context.get_json(CAUGHT_IDS_KEY).unwrap_or_default();

            let mut changed = Vec::new();
            for (species, caught) in after_index.iter() {
                if before_index.caught(species) == Some(caught) {
                    continue;
                }
                if caught {
                    ids.insert(species);
                } else {
                    ids.remove(&species);
                }
                changed.push((species, caught));
            }

            if changed.is_empty() {
                return MergeReport::unchanged(current_version);
            }

            let version = current_version.saturating_add(1);
            context.set_json(CAUGHT_IDS_KEY, &ids);
            context.set_json(SELECTION_VERSION_KEY, &version);
            (version, ids, changed)
        };

        tracing::debug!(version, edits = changed.len(), "merged row edits");
        self.finish(version, ids, changed)
    }

    /// Apply a single toggle callback `(species, caught)`.
    ///
    /// Always bumps the version, even when the set membership does not
    /// change (toggling an already-caught species).
    ///
    /// Must be called from within a tokio runtime.
    pub fn apply_toggle(&self, species: SpeciesId, caught: bool) -> MergeReport {
        let (version, ids) = {
            let mut context = self.lock_context();
            toggle_and_bump(&mut *context, species, caught)
        };
        tracing::debug!(version, species = %species, caught, "merged toggle");
        self.finish(version, ids, vec![(species, caught)])
    }

    /// Audit the applied toggles and dispatch the commit, both outside the
    /// critical section.
    fn finish(
        &self,
        version: u64,
        ids: BTreeSet<SpeciesId>,
        changed: Vec<(SpeciesId, bool)>,
    ) -> MergeReport {
        if let Some(log) = &self.audit {
            for (species, caught) in &changed {
                if let Err(error) = log.append_toggle(*species, *caught) {
                    // The audit trail is best-effort; membership truth
                    // lives in the snapshot store.
                    tracing::warn!(species = %species, %error, "audit append failed");
                }
            }
        }
        let commit = self.dispatch(Snapshot::new(ids, version));
        MergeReport {
            version,
            changed,
            commit: Some(commit),
        }
    }

    /// Wrap the store commit so an accepted outcome also raises the
    /// session's committed watermark.
    fn dispatch(&self, snapshot: Snapshot) -> JoinHandle<Result<CommitOutcome, StoreError>> {
        let inner = self.store.commit(snapshot);
        let context = Arc::clone(&self.context);
        tokio::spawn(async move {
            match inner.await {
                Ok(Ok(outcome)) => {
                    if let CommitOutcome::Accepted { version } = outcome {
                        let mut context = context.lock().unwrap_or_else(PoisonError::into_inner);
                        record_committed(&mut *context, version);
                    }
                    Ok(outcome)
                }
                Ok(Err(error)) => {
                    // No retry policy: the failed snapshot is dropped and
                    // the next merge supersedes it.
                    tracing::warn!(%error, "background commit failed");
                    Err(error)
                }
                Err(error) => {
                    tracing::warn!(%error, "commit task aborted");
                    Err(StoreError::TaskJoin(error))
                }
            }
        })
    }

    fn lock_context(&self) -> MutexGuard<'_, C> {
        self.context.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
