//! The type-safe species identifier.
//!
//! Every entity tracked by the caught list is addressed by its stable dex
//! number. Wrapping the raw `u32` in a newtype prevents accidental mixing
//! with version counters or row positions at compile time. Row position is
//! never an identity: reordering a displayed table must not change which
//! species an edit applies to.

use serde::{Deserialize, Serialize};

/// Stable identifier for a species in the field guide.
///
/// Serializes as a bare number, matching the `id` field of the event-log
/// line format.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SpeciesId(pub u32);

impl SpeciesId {
    /// Create an identifier from a raw dex number.
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Return the inner dex number.
    pub const fn into_inner(self) -> u32 {
        self.0
    }
}

impl core::fmt::Display for SpeciesId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SpeciesId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl From<SpeciesId> for u32 {
    fn from(id: SpeciesId) -> Self {
        id.0
    }
}
