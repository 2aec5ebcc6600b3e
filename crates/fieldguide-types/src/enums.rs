//! Enumeration types for the caught-list event log.

use serde::{Deserialize, Serialize};

/// The operation recorded by a toggle event.
///
/// Folding a log replays these in append order: `Add` inserts the species
/// into the membership set, `Remove` discards it, and the last operation
/// for a given species wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToggleOp {
    /// The species was marked as caught.
    Add,
    /// The species was unmarked.
    Remove,
}

impl ToggleOp {
    /// Map a checkbox state to the operation it records.
    pub const fn from_checked(checked: bool) -> Self {
        if checked { Self::Add } else { Self::Remove }
    }

    /// Whether this operation inserts into the membership set.
    pub const fn is_add(self) -> bool {
        matches!(self, Self::Add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_lowercase() {
        assert_eq!(serde_json::to_string(&ToggleOp::Add).ok().as_deref(), Some("\"add\""));
        assert_eq!(
            serde_json::to_string(&ToggleOp::Remove).ok().as_deref(),
            Some("\"remove\"")
        );
    }

    #[test]
    fn deserializes_lowercase() {
        let op: Result<ToggleOp, _> = serde_json::from_str("\"remove\"");
        assert_eq!(op.ok(), Some(ToggleOp::Remove));
    }

    #[test]
    fn checkbox_mapping() {
        assert_eq!(ToggleOp::from_checked(true), ToggleOp::Add);
        assert_eq!(ToggleOp::from_checked(false), ToggleOp::Remove);
        assert!(ToggleOp::Add.is_add());
        assert!(!ToggleOp::Remove.is_add());
    }
}
