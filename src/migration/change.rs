//! Schema change units

use crate::migration::{MigrationError, SchemaManager};
use std::fmt;

/// Signature of the forward and inverse halves of a schema change
pub type ChangeFn = fn(&SchemaManager<'_>) -> Result<(), MigrationError>;

/// Which half of a schema change is running
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Forward (apply)
    Up,
    /// Inverse (revert)
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("upgrade"),
            Direction::Down => f.write_str("downgrade"),
        }
    }
}

/// One versioned, reversible schema transformation
///
/// A unit is a plain value: its own revision id, the revision it must follow, and
/// two functions. Ordering between units is the [`RevisionChain`]'s job.
///
/// ```rust
/// use revchain::migration::{SchemaChange, SchemaManager, MigrationError};
/// use sea_query::{ColumnDef, Table};
///
/// fn up(manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
///     manager.create_table(
///         Table::create()
///             .table("platform")
///             .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
///             .to_owned(),
///     )
/// }
///
/// fn down(manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
///     manager.drop_table(Table::drop().table("platform").to_owned())
/// }
///
/// let change = SchemaChange::new("a1b2c3d4e5f6", None, "add platform table", up, down);
/// assert!(change.is_root());
/// ```
///
/// [`RevisionChain`]: crate::migration::RevisionChain
#[derive(Clone, Copy)]
pub struct SchemaChange {
    pub revision: &'static str,
    pub down_revision: Option<&'static str>,
    pub description: &'static str,
    pub up: ChangeFn,
    pub down: ChangeFn,
}

impl SchemaChange {
    pub const fn new(
        revision: &'static str,
        down_revision: Option<&'static str>,
        description: &'static str,
        up: ChangeFn,
        down: ChangeFn,
    ) -> Self {
        Self {
            revision,
            down_revision,
            description,
            up,
            down,
        }
    }

    /// True when the unit has no predecessor at all
    pub fn is_root(&self) -> bool {
        self.down_revision.is_none()
    }

    /// Run one half of the unit against `manager`
    ///
    /// Store errors are classified for this revision and direction.
    pub fn run(&self, manager: &SchemaManager<'_>, direction: Direction) -> Result<(), MigrationError> {
        let half = match direction {
            Direction::Up => self.up,
            Direction::Down => self.down,
        };
        half(manager).map_err(|e| e.in_revision(self.revision, direction))
    }
}

impl fmt::Debug for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaChange")
            .field("revision", &self.revision)
            .field("down_revision", &self.down_revision)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for SchemaChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.down_revision {
            Some(parent) => write!(f, "{} -> {}, {}", parent, self.revision, self.description),
            None => write!(f, "<base> -> {}, {}", self.revision, self.description),
        }
    }
}

/// Check that a revision id can be stored and printed safely
pub fn validate_revision_id(revision: &str) -> Result<(), MigrationError> {
    let valid = !revision.is_empty()
        && revision.len() <= 255
        && !revision.chars().any(|c| c.is_whitespace() || c.is_control());
    if valid {
        Ok(())
    } else {
        Err(MigrationError::InvalidRevision(revision.to_string()))
    }
}
