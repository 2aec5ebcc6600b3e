//! Per-session selection state: the working set, its version counter, and
//! the committed watermark.
//!
//! These functions run on the single rendering/control path, so no
//! internal locking happens here; callers that share a context across
//! tasks wrap it in the merger's mutex. The set handed back by
//! [`toggle_and_bump`] is always an owned copy, never a live alias, since
//! a background commit task may read it after further toggles occur.

use std::collections::BTreeSet;

use fieldguide_types::SpeciesId;

use crate::context::{
    CAUGHT_IDS_KEY, ContextExt, LAST_COMMITTED_VERSION_KEY, SELECTION_VERSION_KEY, SessionContext,
};

/// Point-in-time view of the selection keys in a session context.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SelectionState {
    /// The working set of caught species.
    pub ids: BTreeSet<SpeciesId>,
    /// Local version counter; bumped by exactly 1 per toggle, never
    /// decremented.
    pub version: u64,
    /// Highest version known to have been accepted by a store.
    pub last_committed: u64,
}

/// Seed any missing (or wrongly shaped) selection keys with their initial
/// values: an empty set and zeroed counters.
pub fn ensure_initialized<C: SessionContext + ?Sized>(context: &mut C) {
    if context
        .get_json::<BTreeSet<SpeciesId>>(CAUGHT_IDS_KEY)
        .is_none()
    {
        context.set_json(CAUGHT_IDS_KEY, &BTreeSet::<SpeciesId>::new());
    }
    if context.get_json::<u64>(SELECTION_VERSION_KEY).is_none() {
        context.set_json(SELECTION_VERSION_KEY, &0_u64);
    }
    if context.get_json::<u64>(LAST_COMMITTED_VERSION_KEY).is_none() {
        context.set_json(LAST_COMMITTED_VERSION_KEY, &0_u64);
    }
}

/// Read the current selection keys, treating missing values as initial
/// state.
pub fn read_selection<C: SessionContext + ?Sized>(context: &C) -> SelectionState {
    SelectionState {
        ids: context.get_json(CAUGHT_IDS_KEY).unwrap_or_default(),
        version: context.get_json(SELECTION_VERSION_KEY).unwrap_or_default(),
        last_committed: context
            .get_json(LAST_COMMITTED_VERSION_KEY)
            .unwrap_or_default(),
    }
}

/// Apply one toggle to the working set and bump the version by exactly 1.
///
/// Returns the new version together with an owned copy of the updated set;
/// the copy is what crosses into the concurrent world as a commit
/// snapshot.
pub fn toggle_and_bump<C: SessionContext + ?Sized>(
    context: &mut C,
    id: SpeciesId,
    caught: bool,
) -> (u64, BTreeSet<SpeciesId>) {
    ensure_initialized(context);
    let mut ids: BTreeSet<SpeciesId> = context.get_json(CAUGHT_IDS_KEY).unwrap_or_default();
    if caught {
        ids.insert(id);
    } else {
        ids.remove(&id);
    }
    let version = context
        .get_json::<u64>(SELECTION_VERSION_KEY)
        .unwrap_or_default()
        .saturating_add(1);
    context.set_json(CAUGHT_IDS_KEY, &ids);
    context.set_json(SELECTION_VERSION_KEY, &version);
    (version, ids)
}

/// Record that `version` was accepted by a store.
///
/// Raise-only: a late-finishing older commit can never lower the
/// watermark.
pub fn record_committed<C: SessionContext + ?Sized>(context: &mut C, version: u64) {
    let current = context
        .get_json::<u64>(LAST_COMMITTED_VERSION_KEY)
        .unwrap_or_default();
    if version > current {
        context.set_json(LAST_COMMITTED_VERSION_KEY, &version);
    }
}
