use serde::{Deserialize, Serialize};

/// Revision number for a mutable row, used for optimistic concurrency control.
///
/// Rows are created at revision 1 and every committed mutation increments the
/// revision by 1. Updates are conditional on the revision the caller read; a
/// mismatch means another writer got there first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Revision(i64);

impl Revision {
    /// Creates a revision from a raw value.
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the revision (1) a freshly created row carries.
    pub fn initial() -> Self {
        Self(1)
    }

    /// Returns the next revision.
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }

    /// Returns the raw revision value.
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Revision {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Revision> for i64 {
    fn from(revision: Revision) -> Self {
        revision.0
    }
}
