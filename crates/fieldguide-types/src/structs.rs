//! Core structs for the caught-list synchronization.
//!
//! Covers the immutable [`ToggleEvent`] appended to the audit log, the
//! [`Snapshot`] exchanged with the versioned stores, and the [`SpeciesRow`]
//! reported by the rendering surface.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::enums::ToggleOp;
use crate::ids::SpeciesId;

/// A single append-only entry in the toggle event log.
///
/// Events are immutable once appended. The serialized field names (`op`,
/// `id`, `ts`) are the on-disk line format and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ToggleEvent {
    /// Whether the species was marked or unmarked.
    pub op: ToggleOp,
    /// The species the toggle applies to.
    pub id: SpeciesId,
    /// Event time in seconds since the Unix epoch.
    pub ts: f64,
}

impl ToggleEvent {
    /// Create a new event.
    pub const fn new(op: ToggleOp, id: SpeciesId, ts: f64) -> Self {
        Self { op, id, ts }
    }
}

/// A complete (membership set, version) pair exchanged with a versioned
/// store, as opposed to an incremental event.
///
/// Snapshots are created transiently for each commit attempt and discarded
/// after acceptance or rejection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// The full set of caught species.
    pub ids: BTreeSet<SpeciesId>,
    /// The logical version this set was produced at.
    pub version: u64,
}

impl Snapshot {
    /// Create a snapshot from an owned set and its version.
    pub const fn new(ids: BTreeSet<SpeciesId>, version: u64) -> Self {
        Self { ids, version }
    }
}

/// One row of the table reported by the rendering surface.
///
/// Identity is the stable species id, never the row's position in the
/// reported table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpeciesRow {
    /// The species this row describes.
    pub species: SpeciesId,
    /// The row's caught checkbox state.
    pub caught: bool,
}

impl SpeciesRow {
    /// Create a row.
    pub const fn new(species: SpeciesId, caught: bool) -> Self {
        Self { species, caught }
    }
}
