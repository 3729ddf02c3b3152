//! Revisions shipped with this crate

use crate::migration::{MigrationError, RevisionChain, SchemaChange};

pub mod i4d5e6f7g8h9_add_folder_rule_table;

/// Every shipped revision, oldest first
pub fn all() -> Vec<SchemaChange> {
    vec![i4d5e6f7g8h9_add_folder_rule_table::CHANGE]
}

/// The shipped revisions as a validated chain
pub fn chain() -> Result<RevisionChain, MigrationError> {
    RevisionChain::new(all())
}
