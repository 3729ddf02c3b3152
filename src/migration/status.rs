//! Migration status tracking

use crate::migration::MigrationRecord;
use serde::Serialize;

/// Where a store stands relative to the revision chain
#[derive(Debug, Clone, Serialize)]
pub struct MigrationStatus {
    /// Applied (or stamped) revisions from the history, in chain order
    pub applied: Vec<MigrationRecord>,

    /// Chain revisions not applied yet, in the order they would run
    pub pending: Vec<PendingRevision>,

    /// Newest applied chain revision, or the baseline if only that is stamped
    pub current: Option<String>,

    /// Last revision of the chain
    pub head: String,
}

/// A chain revision that has not been applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRevision {
    pub revision: String,
    pub down_revision: Option<String>,
    pub description: String,
    pub checksum: String,
}

impl MigrationStatus {
    #[must_use]
    pub fn new(
        applied: Vec<MigrationRecord>,
        pending: Vec<PendingRevision>,
        current: Option<String>,
        head: impl Into<String>,
    ) -> Self {
        Self {
            applied,
            pending,
            current,
            head: head.into(),
        }
    }

    #[must_use]
    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn applied_count(&self) -> usize {
        self.applied.len()
    }

    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Next revision an upgrade would apply
    #[must_use]
    pub fn next_pending(&self) -> Option<&PendingRevision> {
        self.pending.first()
    }
}
