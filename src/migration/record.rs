//! `MigrationRecord` - Represents entries in the migration history

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Checksum stored for revisions recorded by `stamp` rather than applied
pub const STAMPED_CHECKSUM: &str = "stamped";

/// One applied (or stamped) revision
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub revision: String,
    pub description: String,
    /// `SHA-256` checksum of the rendered forward SQL, or [`STAMPED_CHECKSUM`]
    pub checksum: String,
    pub applied_at: DateTime<Utc>,
    /// Execution time in milliseconds (`None` for stamped revisions)
    pub execution_time_ms: Option<i64>,
}

impl MigrationRecord {
    #[must_use]
    pub fn new(
        revision: impl Into<String>,
        description: impl Into<String>,
        checksum: impl Into<String>,
        applied_at: DateTime<Utc>,
        execution_time_ms: Option<i64>,
    ) -> Self {
        Self {
            revision: revision.into(),
            description: description.into(),
            checksum: checksum.into(),
            applied_at,
            execution_time_ms,
        }
    }

    /// Record for a revision marked as applied without running it
    #[must_use]
    pub fn stamped(revision: impl Into<String>, description: impl Into<String>) -> Self {
        Self::new(revision, description, STAMPED_CHECKSUM, Utc::now(), None)
    }

    #[must_use]
    pub fn is_stamped(&self) -> bool {
        self.checksum == STAMPED_CHECKSUM
    }

    /// Create a `MigrationRecord` from a history row
    ///
    /// Expected column order: `revision`, `description`, `checksum`, `applied_at`, `execution_time_ms`
    pub fn from_row(row: &may_postgres::Row) -> Self {
        Self {
            revision: row.get(0),
            description: row.get(1),
            checksum: row.get(2),
            applied_at: row.get(3),
            execution_time_ms: row.get(4),
        }
    }
}
