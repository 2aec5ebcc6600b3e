//! `SQLite`-backed versioned snapshot store.
//!
//! The durable counterpart of [`MemoryStore`](crate::memory::MemoryStore).
//! Uses [`sqlx`] with runtime query construction (not compile-time checked)
//! so builds never need a live database. All queries are parameterized.
//!
//! # Schema
//!
//! | Table | Columns | Rows |
//! |-------|---------|------|
//! | `meta` | `version INTEGER` | exactly one, seeded to 0 |
//! | `members` | `id INTEGER PRIMARY KEY` | one per present species |
//!
//! The check-then-set runs inside a single transaction *and* a
//! process-local async mutex: `SQLite` alone does not serialize the
//! read-check-write at this granularity, and two interleaved commit bodies
//! could otherwise both observe the same current version.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use fieldguide_types::{Snapshot, SpeciesId};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tokio::task::JoinHandle;

use crate::commit::{CommitOutcome, Committer};
use crate::error::StoreError;
use crate::latency::CommitLatency;

/// Default maximum number of connections in the pool.
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Connection handle to the caught-list database.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    latency: CommitLatency,
    write_lock: Arc<tokio::sync::Mutex<()>>,
}

impl SqliteStore {
    /// Open (creating if necessary) the database at `path` and bootstrap
    /// the schema. A fresh database reads as `(empty set, version 0)`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if parent directories cannot be created,
    /// or [`StoreError::Sqlite`] if the connection or schema setup fails.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        ensure_schema(&pool).await?;
        tracing::info!(path = %path.display(), "Opened caught-list database");
        Ok(Self {
            pool,
            latency: CommitLatency::disabled(),
            write_lock: Arc::new(tokio::sync::Mutex::new(())),
        })
    }

    /// Set the simulated latency applied to delayed commits.
    #[must_use]
    pub fn with_latency(mut self, latency: CommitLatency) -> Self {
        self.latency = latency;
        self
    }

    /// Schedule an asynchronous compare-and-swap commit.
    ///
    /// The commit body optionally sleeps (when `delay` is set), then takes
    /// the process-local write lock and runs the check-then-set inside one
    /// transaction: read `meta.version`, and only if the incoming version
    /// is strictly greater, replace `members` and update `meta`. A losing
    /// commit rolls back having written nothing.
    pub fn persist(
        &self,
        ids: BTreeSet<SpeciesId>,
        version: u64,
        delay: bool,
    ) -> JoinHandle<Result<CommitOutcome, StoreError>> {
        let pool = self.pool.clone();
        let write_lock = Arc::clone(&self.write_lock);
        let latency = self.latency;
        tokio::spawn(async move {
            tracing::debug!(version, size = ids.len(), "sqlite commit started");
            if delay {
                latency.maybe_sleep().await;
            }

            let _guard = write_lock.lock().await;
            let mut tx = pool.begin().await?;
            let (current,): (i64,) = sqlx::query_as("SELECT version FROM meta")
                .fetch_one(&mut *tx)
                .await?;
            let current = u64::try_from(current).unwrap_or(0);
            if version <= current {
                tracing::debug!(version, current, "sqlite commit superseded");
                return Ok(CommitOutcome::Stale { version, current });
            }

            sqlx::query("DELETE FROM members").execute(&mut *tx).await?;
            for id in &ids {
                sqlx::query("INSERT INTO members (id) VALUES (?1)")
                    .bind(i64::from(id.into_inner()))
                    .execute(&mut *tx)
                    .await?;
            }
            sqlx::query("UPDATE meta SET version = ?1")
                .bind(i64::try_from(version).unwrap_or(i64::MAX))
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            tracing::debug!(version, size = ids.len(), "sqlite commit accepted");
            Ok(CommitOutcome::Accepted { version })
        })
    }

    /// Return the latest accepted snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the query fails.
    pub async fn load(&self) -> Result<(BTreeSet<SpeciesId>, u64), StoreError> {
        let rows: Vec<(i64,)> = sqlx::query_as("SELECT id FROM members ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let ids = rows
            .into_iter()
            .map(|(raw,)| SpeciesId::new(u32::try_from(raw).unwrap_or(u32::MAX)))
            .collect();
        let (version,): (i64,) = sqlx::query_as("SELECT version FROM meta")
            .fetch_one(&self.pool)
            .await?;
        Ok((ids, u64::try_from(version).unwrap_or(0)))
    }

    /// Clear all members and reset the version to 0. Testing only.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Sqlite`] if the statements fail.
    pub async fn reset(&self) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM members").execute(&mut *tx).await?;
        sqlx::query("UPDATE meta SET version = 0")
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    /// Close all connections in the pool gracefully.
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::info!("caught-list database closed");
    }
}

impl Committer for SqliteStore {
    fn commit(&self, snapshot: Snapshot) -> JoinHandle<Result<CommitOutcome, StoreError>> {
        self.persist(snapshot.ids, snapshot.version, true)
    }
}

/// Create the two-table schema if absent and seed the single `meta` row.
async fn ensure_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    sqlx::query("CREATE TABLE IF NOT EXISTS meta (version INTEGER NOT NULL)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE TABLE IF NOT EXISTS members (id INTEGER PRIMARY KEY)")
        .execute(pool)
        .await?;
    let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM meta")
        .fetch_one(pool)
        .await?;
    if rows == 0 {
        sqlx::query("INSERT INTO meta (version) VALUES (0)")
            .execute(pool)
            .await?;
    }
    Ok(())
}
