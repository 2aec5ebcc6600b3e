//! Session state and edit merging for the Fieldguide caught list.
//!
//! The host framework injects a mutable session context (an opaque
//! key/value surface); this crate owns what lives under the caught-list
//! keys. The rendering surface reports edits either as a single toggle
//! callback or as a before/after row table; the edit merger reconciles
//! them into the authoritative working set under a critical section and
//! dispatches an asynchronous snapshot commit.
//!
//! # Data flow
//!
//! ```text
//! toggle / row edit
//!     |
//!     +-- lock context --> read current set, apply diff, bump version
//!     |
//!     +-- (unlocked) -----> audit EventLog append, one commit dispatch
//!                               |
//!                               +--> versioned store CAS (background task)
//! ```
//!
//! # Modules
//!
//! - [`context`] -- The injected session context trait and typed accessors
//! - [`selection`] -- Working set, version counter, committed watermark
//! - [`merge`] -- Row index by stable identity and the edit merger

pub mod context;
pub mod merge;
pub mod selection;

// Re-export primary types for convenience.
pub use context::{
    CAUGHT_IDS_KEY, ContextExt, LAST_COMMITTED_VERSION_KEY, MemoryContext, SELECTION_VERSION_KEY,
    SessionContext,
};
pub use merge::{EditMerger, MergeReport, RowIndex};
pub use selection::{
    SelectionState, ensure_initialized, read_selection, record_committed, toggle_and_bump,
};
