//! Error types for the persistence layer.
//!
//! Absence of backing storage is never an error: a missing log file or a
//! fresh database reads as empty initial state. A commit losing the
//! version race is likewise not an error (see
//! [`CommitOutcome::Stale`](crate::commit::CommitOutcome)). Only genuine
//! I/O, database, and input failures surface through [`StoreError`].

/// Errors that can occur in the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A file operation on the event log failed.
    #[error("event log I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] sqlx::Error),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A background commit task panicked or was cancelled.
    #[error("commit task failed: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    /// The caller supplied a value the store cannot represent.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}
