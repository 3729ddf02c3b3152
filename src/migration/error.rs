//! Migration-specific error types

use crate::executor::StoreError;
use crate::migration::change::Direction;

/// Migration-specific errors
///
/// The first four variants are the failures a schema change itself can raise; they
/// carry the revision that failed and the store's message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Target object already exists on apply
    #[error("Revision '{revision}' cannot be applied: schema object already exists ({message})")]
    SchemaConflict { revision: String, message: String },

    /// Foreign-key target table/column absent on apply
    #[error("Revision '{revision}' cannot be applied: referenced table or column is missing ({message})")]
    ReferentialTargetMissing { revision: String, message: String },

    /// Target object absent on revert
    #[error("Revision '{revision}' cannot be reverted: schema object does not exist ({message})")]
    SchemaObjectMissing { revision: String, message: String },

    /// Other objects still depend on the object being dropped
    #[error("Revision '{revision}' cannot be reverted: other schema objects depend on it ({message})")]
    DependencyConflict { revision: String, message: String },

    /// Any other store failure
    #[error("Database error{}: {source}", .revision.as_deref().map(|r| format!(" in revision '{r}'")).unwrap_or_default())]
    Database {
        revision: Option<String>,
        #[source]
        source: StoreError,
    },

    /// Another runner held the migration lock for longer than the timeout
    #[error(
        "Migration lock timeout: {0}\n\
         Another process may be running migrations. If this persists, check for a stuck migration process."
    )]
    LockTimeout(String),

    /// An applied revision no longer renders the SQL it was applied with
    #[error(
        "Revision '{revision}' has been modified after being applied.\n\
         Stored checksum: {stored}\n\
         Current checksum: {current}"
    )]
    ChecksumMismatch {
        revision: String,
        stored: String,
        current: String,
    },

    #[error("Unknown revision '{0}'")]
    UnknownRevision(String),

    #[error("History contains revision '{0}' which is not part of the revision chain")]
    UnknownAppliedRevision(String),

    #[error("Invalid revision id '{0}': must be 1-255 characters without whitespace")]
    InvalidRevision(String),

    #[error("Revision '{0}' is declared more than once")]
    DuplicateRevision(String),

    #[error("Revision chain has more than one root: {0:?}")]
    MultipleRoots(Vec<String>),

    #[error("Revision chain is empty")]
    EmptyChain,

    #[error("Revisions {children:?} all follow '{parent}'; branching chains are not supported")]
    Branching { parent: String, children: Vec<String> },

    #[error("Revisions {0:?} are not reachable from the chain root")]
    Disconnected(Vec<String>),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("Revision '{revision}' requires '{predecessor}' to be applied first")]
    PredecessorNotApplied { revision: String, predecessor: String },

    #[error("Revision '{0}' has already been applied")]
    AlreadyApplied(String),

    #[error("Revision '{0}' has not been applied")]
    NotApplied(String),

    #[error("Revision '{revision}' cannot be reverted while '{successor}' is applied")]
    SuccessorApplied { revision: String, successor: String },

    #[error("Operation '{0}' needs a live database session")]
    OfflineUnsupported(String),

    #[error("Invalid SQL identifier '{0}'")]
    InvalidIdentifier(String),
}

/// Outcome of classifying a store error raised by a schema change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    SchemaConflict,
    ReferentialTargetMissing,
    SchemaObjectMissing,
    DependencyConflict,
}

/// Map a SQLSTATE raised while running a schema change in `direction`
///
/// `42P01` (undefined_table) means the foreign-key target is missing on apply but
/// the dropped table itself is missing on revert.
#[must_use]
pub fn classify_sqlstate(direction: Direction, code: &str) -> Option<SchemaErrorKind> {
    match (direction, code) {
        // duplicate_table, duplicate_object
        (Direction::Up, "42P07" | "42710") => Some(SchemaErrorKind::SchemaConflict),
        // undefined_table, undefined_column, invalid_foreign_key
        (Direction::Up, "42P01" | "42703" | "42830") => Some(SchemaErrorKind::ReferentialTargetMissing),
        (Direction::Down, "42P01" | "42704") => Some(SchemaErrorKind::SchemaObjectMissing),
        // dependent_objects_still_exist
        (Direction::Down, "2BP01") => Some(SchemaErrorKind::DependencyConflict),
        _ => None,
    }
}

impl MigrationError {
    /// Wrap a store error raised by revision `revision` running in `direction`
    pub fn from_schema_change(revision: &str, direction: Direction, source: StoreError) -> Self {
        let kind = source.code().and_then(|code| classify_sqlstate(direction, code));
        let revision = revision.to_string();
        match kind {
            Some(SchemaErrorKind::SchemaConflict) => MigrationError::SchemaConflict {
                revision,
                message: source.to_string(),
            },
            Some(SchemaErrorKind::ReferentialTargetMissing) => {
                MigrationError::ReferentialTargetMissing {
                    revision,
                    message: source.to_string(),
                }
            }
            Some(SchemaErrorKind::SchemaObjectMissing) => MigrationError::SchemaObjectMissing {
                revision,
                message: source.to_string(),
            },
            Some(SchemaErrorKind::DependencyConflict) => MigrationError::DependencyConflict {
                revision,
                message: source.to_string(),
            },
            None => MigrationError::Database {
                revision: Some(revision),
                source,
            },
        }
    }

    /// Attach a revision to a schema-change error that was raised without one
    pub(crate) fn in_revision(self, revision: &str, direction: Direction) -> Self {
        match self {
            MigrationError::Database { revision: None, source } => {
                Self::from_schema_change(revision, direction, source)
            }
            other => other,
        }
    }

    /// The revision this error is about, when there is one
    #[must_use]
    pub fn revision(&self) -> Option<&str> {
        match self {
            MigrationError::SchemaConflict { revision, .. }
            | MigrationError::ReferentialTargetMissing { revision, .. }
            | MigrationError::SchemaObjectMissing { revision, .. }
            | MigrationError::DependencyConflict { revision, .. }
            | MigrationError::ChecksumMismatch { revision, .. }
            | MigrationError::PredecessorNotApplied { revision, .. }
            | MigrationError::SuccessorApplied { revision, .. } => Some(revision),
            MigrationError::Database { revision, .. } => revision.as_deref(),
            MigrationError::UnknownRevision(r)
            | MigrationError::UnknownAppliedRevision(r)
            | MigrationError::InvalidRevision(r)
            | MigrationError::DuplicateRevision(r)
            | MigrationError::AlreadyApplied(r)
            | MigrationError::NotApplied(r) => Some(r),
            _ => None,
        }
    }
}

impl From<StoreError> for MigrationError {
    fn from(source: StoreError) -> Self {
        MigrationError::Database {
            revision: None,
            source,
        }
    }
}
