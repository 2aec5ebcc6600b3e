//! The commit seam between the merge path and a versioned snapshot store.
//!
//! Commits are fire-and-forget: the merge path dispatches a snapshot and
//! never blocks on its completion. The returned [`JoinHandle`] exists so
//! tests (and any caller that chooses to) can await the outcome.

use fieldguide_types::Snapshot;
use tokio::task::JoinHandle;

use crate::error::StoreError;

/// The result of a compare-and-swap commit attempt.
///
/// A stale loss is the designed outcome of the version race, not a failure:
/// the losing snapshot is discarded, never queued or retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    /// The snapshot's version exceeded the stored version; the store now
    /// holds this snapshot.
    Accepted {
        /// The version that was accepted.
        version: u64,
    },
    /// The snapshot's version did not exceed the stored version; the store
    /// is unchanged.
    Stale {
        /// The version that was submitted.
        version: u64,
        /// The version the store held at decision time.
        current: u64,
    },
}

impl CommitOutcome {
    /// Whether the store accepted the snapshot.
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    /// The version the commit was submitted with.
    pub const fn submitted_version(&self) -> u64 {
        match self {
            Self::Accepted { version } | Self::Stale { version, .. } => *version,
        }
    }
}

/// A destination the edit merger can dispatch snapshot commits to.
///
/// Both snapshot stores implement this with delay enabled, so production
/// commits exhibit the variable latency the compare-and-swap is designed
/// around. Tests substitute their own recording implementations.
pub trait Committer: Send + Sync {
    /// Schedule an asynchronous commit of `snapshot`.
    ///
    /// The commit body performs its check-then-set inside a single critical
    /// section; the caller is never blocked. Errors inside the task are
    /// reported only through the returned handle.
    fn commit(&self, snapshot: Snapshot) -> JoinHandle<Result<CommitOutcome, StoreError>>;
}
