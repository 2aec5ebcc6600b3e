//! The injected session context.
//!
//! The host framework owns per-session state and hands the core a mutable
//! key/value surface with get/set semantics. The core treats the values as
//! opaque JSON and never assumes anything about how the context is
//! rendered, which keeps this crate framework-agnostic and testable in
//! isolation.
//!
//! # Keys
//!
//! | Key | Value |
//! |-----|-------|
//! | `caught_ids` | JSON array of species ids |
//! | `selection_version` | Local version counter (integer) |
//! | `last_committed_version` | Highest version known committed (integer) |

use std::collections::BTreeMap;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Key holding the caught species set.
pub const CAUGHT_IDS_KEY: &str = "caught_ids";

/// Key holding the per-session selection version counter.
pub const SELECTION_VERSION_KEY: &str = "selection_version";

/// Key holding the highest version known to have been committed.
pub const LAST_COMMITTED_VERSION_KEY: &str = "last_committed_version";

/// A host-provided mutable key/value session surface.
///
/// Implementations only need raw get/set; the typed accessors are layered
/// on top by [`ContextExt`].
pub trait SessionContext: Send {
    /// Read the raw value stored at `key`, if any.
    fn get(&self, key: &str) -> Option<Value>;

    /// Store `value` at `key`, replacing any previous value.
    fn set(&mut self, key: &str, value: Value);
}

/// Typed JSON accessors over any [`SessionContext`].
pub trait ContextExt: SessionContext {
    /// Read and deserialize the value at `key`.
    ///
    /// Returns `None` when the key is absent or holds a value of the wrong
    /// shape; callers treat that as uninitialized state and re-seed it.
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get(key)
            .and_then(|value| serde_json::from_value(value).ok())
    }

    /// Serialize `value` and store it at `key`.
    fn set_json<T: Serialize>(&mut self, key: &str, value: &T) {
        match serde_json::to_value(value) {
            Ok(json) => self.set(key, json),
            Err(error) => {
                tracing::warn!(key, %error, "failed to serialize session context value");
            }
        }
    }
}

impl<C: SessionContext + ?Sized> ContextExt for C {}

/// Map-backed session context for tests, demos, and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryContext {
    values: BTreeMap<String, Value>,
}

impl MemoryContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the context holds no keys.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl SessionContext for MemoryContext {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_owned(), value);
    }
}
