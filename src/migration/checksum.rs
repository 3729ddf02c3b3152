//! Checksum calculation for schema changes

use crate::migration::{Direction, MigrationError, SchemaChange, SchemaManager};
use sha2::{Digest, Sha256};

/// Render the SQL of one half of a schema change without touching a store
pub fn render_sql(change: &SchemaChange, direction: Direction) -> Result<Vec<String>, MigrationError> {
    let manager = SchemaManager::offline();
    change.run(&manager, direction)?;
    Ok(manager.captured())
}

/// Calculate the SHA-256 checksum of a schema change
///
/// The checksum covers the revision id, its predecessor and the rendered forward
/// SQL, so editing an applied change is detected on the next run.
pub fn calculate_checksum(change: &SchemaChange) -> Result<String, MigrationError> {
    let statements = render_sql(change, Direction::Up)?;

    let mut hasher = Sha256::new();
    hasher.update(change.revision.as_bytes());
    hasher.update([0u8]);
    hasher.update(change.down_revision.unwrap_or("").as_bytes());
    for statement in &statements {
        hasher.update([0u8]);
        hasher.update(statement.as_bytes());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

/// Validate checksum against stored value
pub fn validate_checksum(revision: &str, stored: &str, current: &str) -> Result<(), MigrationError> {
    if stored == current {
        Ok(())
    } else {
        Err(MigrationError::ChecksumMismatch {
            revision: revision.to_string(),
            stored: stored.to_string(),
            current: current.to_string(),
        })
    }
}
