//! Append-only toggle event log with fold and compaction.
//!
//! The log is a plain text file, one JSON-encoded [`ToggleEvent`] per line:
//! `{"op": "add"|"remove", "id": <number>, "ts": <seconds since epoch>}`.
//! Folding replays the lines in append order -- add inserts, remove
//! discards, the last operation per species wins -- which makes replay
//! deterministic even when the same species appears many times.
//!
//! The log is an audit trail, not the source of truth: the versioned
//! snapshot stores own current membership, and nothing couples the two
//! atomically. Robustness is favored over strict validation: a missing
//! file reads as empty state and malformed lines are skipped during fold.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fieldguide_types::{SpeciesId, ToggleEvent, ToggleOp};

use crate::error::StoreError;

/// Compact the log once it grows past this many lines.
const DEFAULT_COMPACT_EVERY: u64 = 100;

/// Handle to an append-only toggle log on disk.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
    compact_every: u64,
}

impl EventLog {
    /// Create a handle for the log at `path`. The file is created lazily on
    /// first append.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            compact_every: DEFAULT_COMPACT_EVERY,
        }
    }

    /// Set the auto-compaction threshold. `0` disables auto-compaction.
    #[must_use]
    pub const fn with_compact_every(mut self, every: u64) -> Self {
        self.compact_every = every;
        self
    }

    /// The log file's location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one toggle event.
    ///
    /// Creates parent directories and the file if absent. When `timestamp`
    /// is `None` the current wall-clock time is stamped. May trigger a
    /// compaction when the line count exceeds the configured threshold.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidInput`] for a non-finite timestamp and
    /// [`StoreError::Io`] if the write fails.
    pub fn append(
        &self,
        id: SpeciesId,
        op: ToggleOp,
        timestamp: Option<f64>,
    ) -> Result<(), StoreError> {
        let ts = match timestamp {
            Some(t) if !t.is_finite() => {
                return Err(StoreError::InvalidInput(format!(
                    "event timestamp must be finite, got {t}"
                )));
            }
            Some(t) => t,
            None => now_epoch_seconds(),
        };

        let line = serde_json::to_string(&ToggleEvent::new(op, id, ts))?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")?;
        tracing::debug!(species = %id, ?op, "appended toggle event");

        if self.compact_every > 0 && self.line_count()? > self.compact_every {
            self.compact()?;
        }
        Ok(())
    }

    /// Append an add/remove event based on a checkbox state.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the write fails.
    pub fn append_toggle(&self, id: SpeciesId, caught: bool) -> Result<(), StoreError> {
        self.append(id, ToggleOp::from_checked(caught), None)
    }

    /// Fold the whole log and return the membership set together with the
    /// number of events folded (a coarse version of the log).
    ///
    /// A missing file is empty state, not an error. Malformed lines are
    /// skipped with a warning and excluded from the count.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the file exists but cannot be read.
    pub fn load(&self) -> Result<(BTreeSet<SpeciesId>, u64), StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => {
                return Ok((BTreeSet::new(), 0));
            }
            Err(error) => return Err(error.into()),
        };

        let mut ids = BTreeSet::new();
        let mut folded: u64 = 0;
        for line in BufReader::new(file).lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<ToggleEvent>(line) {
                Ok(event) => {
                    folded = folded.saturating_add(1);
                    if event.op.is_add() {
                        ids.insert(event.id);
                    } else {
                        ids.remove(&event.id);
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "skipping malformed event line");
                }
            }
        }
        Ok((ids, folded))
    }

    /// Rewrite the log as a minimal set of `add` events for the current
    /// members, stamped with the compaction time.
    ///
    /// The rewrite replaces the whole file, so concurrent compactions
    /// resolve to whichever writer finishes last. Compacting an already
    /// compacted log re-folds to the same set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the rewrite fails.
    pub fn compact(&self) -> Result<(), StoreError> {
        let (ids, _) = self.load()?;
        let ts = now_epoch_seconds();
        let mut contents = String::new();
        for id in &ids {
            contents.push_str(&serde_json::to_string(&ToggleEvent::new(
                ToggleOp::Add,
                *id,
                ts,
            ))?);
            contents.push('\n');
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, contents)?;
        tracing::debug!(members = ids.len(), "compacted event log");
        Ok(())
    }

    /// Count the lines currently in the log, malformed ones included.
    fn line_count(&self) -> Result<u64, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(0),
            Err(error) => return Err(error.into()),
        };
        let mut count: u64 = 0;
        for line in BufReader::new(file).lines() {
            line?;
            count = count.saturating_add(1);
        }
        Ok(count)
    }
}

/// Current wall-clock time in seconds since the Unix epoch.
fn now_epoch_seconds() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or_default()
}
