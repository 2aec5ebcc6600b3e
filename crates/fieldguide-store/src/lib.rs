//! Persistence layer for the Fieldguide caught-list synchronization.
//!
//! Two storage strategies coexist. The versioned snapshot stores are the
//! source of truth for current membership: each commit carries a complete
//! `(set, version)` snapshot and is accepted only if its version exceeds the
//! stored one (compare-and-swap), so the persisted state always corresponds
//! to the highest version ever submitted regardless of the order in which
//! commit tasks finish. The event log is an optional, independently
//! replayable audit trail of individual toggles; the two are never updated
//! atomically together.
//!
//! # Architecture
//!
//! ```text
//! Edit merge
//!     |
//!     +-- dispatch commit ------> MemoryStore | SqliteStore  (CAS snapshot)
//!     |       (background task,       source of truth
//!     |        variable latency)
//!     |
//!     +-- append toggles -------> EventLog  (append-only audit trail)
//! ```
//!
//! # Modules
//!
//! - [`commit`] -- The [`Committer`] seam and [`CommitOutcome`]
//! - [`event_log`] -- Append-only JSON-lines toggle log with fold/compaction
//! - [`latency`] -- Simulated variable commit latency
//! - [`memory`] -- In-memory snapshot store (tests, demos)
//! - [`sqlite`] -- `SQLite`-backed snapshot store (durable, transactional)
//! - [`error`] -- Shared error types

pub mod commit;
pub mod error;
pub mod event_log;
pub mod latency;
pub mod memory;
pub mod sqlite;

// Re-export primary types for convenience.
pub use commit::{CommitOutcome, Committer};
pub use error::StoreError;
pub use event_log::EventLog;
pub use latency::CommitLatency;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
