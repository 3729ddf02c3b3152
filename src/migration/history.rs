//! Migration history - which revisions a store has applied

use crate::executor::StoreExecutor;
use crate::migration::{MigrationError, MigrationRecord};
use std::sync::Mutex;

/// Where the runner records applied revisions
///
/// Every method receives the executor the runner is currently using, so a
/// table-backed history writes inside the same transaction as the schema change it
/// records.
pub trait MigrationHistory {
    /// Create the backing storage if needed
    fn ensure(&self, executor: &dyn StoreExecutor) -> Result<(), MigrationError>;

    /// Whether the backing storage exists; read-only callers skip `applied`
    /// when it does not
    fn is_initialized(&self, _executor: &dyn StoreExecutor) -> Result<bool, MigrationError> {
        Ok(true)
    }

    /// All recorded revisions, oldest first
    fn applied(&self, executor: &dyn StoreExecutor) -> Result<Vec<MigrationRecord>, MigrationError>;

    fn has_applied(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<bool, MigrationError>;

    fn record_applied(&self, executor: &dyn StoreExecutor, record: &MigrationRecord) -> Result<(), MigrationError>;

    fn remove_applied(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<(), MigrationError>;

    /// Statements creating the backing storage, for offline scripts
    fn ensure_sql(&self) -> Vec<String> {
        Vec::new()
    }

    /// Statement recording `record`, for offline scripts
    ///
    /// `None` when the history does not live in the store.
    fn record_sql(&self, _record: &MigrationRecord) -> Option<String> {
        None
    }
}

/// History kept in process memory
///
/// Writes are not transactional; use it for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: Mutex<Vec<MigrationRecord>>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing set of records
    pub fn with_records(records: Vec<MigrationRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MigrationRecord>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.records.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MigrationHistory for InMemoryHistory {
    fn ensure(&self, _executor: &dyn StoreExecutor) -> Result<(), MigrationError> {
        Ok(())
    }

    fn applied(&self, _executor: &dyn StoreExecutor) -> Result<Vec<MigrationRecord>, MigrationError> {
        Ok(self.lock().clone())
    }

    fn has_applied(&self, _executor: &dyn StoreExecutor, revision: &str) -> Result<bool, MigrationError> {
        Ok(self.lock().iter().any(|r| r.revision == revision))
    }

    fn record_applied(&self, _executor: &dyn StoreExecutor, record: &MigrationRecord) -> Result<(), MigrationError> {
        let mut records = self.lock();
        if records.iter().any(|r| r.revision == record.revision) {
            return Err(MigrationError::AlreadyApplied(record.revision.clone()));
        }
        records.push(record.clone());
        Ok(())
    }

    fn remove_applied(&self, _executor: &dyn StoreExecutor, revision: &str) -> Result<(), MigrationError> {
        let mut records = self.lock();
        let before = records.len();
        records.retain(|r| r.revision != revision);
        if records.len() == before {
            return Err(MigrationError::NotApplied(revision.to_string()));
        }
        Ok(())
    }
}
