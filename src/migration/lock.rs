//! Advisory-lock based migration locking

use crate::executor::StoreExecutor;
use crate::migration::MigrationError;

#[cfg(feature = "tracing")]
use crate::telemetry::tracing_helpers;

/// Advisory lock key shared by every runner ("revchain" in ASCII)
pub const MIGRATION_LOCK_KEY: i64 = 0x7265_7663_6861_696E;

/// Default time to wait for another runner to finish
pub const DEFAULT_LOCK_TIMEOUT_SECONDS: u64 = 60;

/// SQLSTATE `lock_not_available`, raised when `lock_timeout` expires
const LOCK_NOT_AVAILABLE: &str = "55P03";

/// Lock guard that releases the advisory lock when dropped
///
/// The lock is session-level, so it survives the per-revision transactions run
/// while it is held.
pub struct MigrationLockGuard<'a> {
    executor: &'a dyn StoreExecutor,
}

impl<'a> MigrationLockGuard<'a> {
    /// Acquire the migration lock, waiting at most `timeout_seconds`
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::LockTimeout` if another session holds the lock
    /// for longer than the timeout.
    pub fn acquire(executor: &'a dyn StoreExecutor, timeout_seconds: Option<u64>) -> Result<Self, MigrationError> {
        let timeout = timeout_seconds.unwrap_or(DEFAULT_LOCK_TIMEOUT_SECONDS);
        acquire_migration_lock(executor, timeout)?;
        Ok(Self { executor })
    }
}

impl Drop for MigrationLockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = release_migration_lock(self.executor) {
            log::warn!("failed to release migration lock: {e}");
        }
    }
}

/// Block on `pg_advisory_lock` with `lock_timeout` bounding the wait
pub fn acquire_migration_lock(executor: &dyn StoreExecutor, timeout_seconds: u64) -> Result<(), MigrationError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::migration_lock_span().entered();

    log::debug!("acquiring migration lock (timeout {timeout_seconds}s)");
    executor.execute(&format!("SET lock_timeout = '{timeout_seconds}s'"), &[])?;

    let result = executor.execute(&format!("SELECT pg_advisory_lock({MIGRATION_LOCK_KEY})"), &[]);

    // Restore the session default whatever happened
    if let Err(e) = executor.execute("RESET lock_timeout", &[]) {
        log::warn!("failed to reset lock_timeout: {e}");
    }

    match result {
        Ok(_) => {
            log::debug!("migration lock acquired");
            Ok(())
        }
        Err(e) if e.code() == Some(LOCK_NOT_AVAILABLE) => Err(MigrationError::LockTimeout(format!(
            "could not acquire advisory lock {MIGRATION_LOCK_KEY} within {timeout_seconds} seconds"
        ))),
        Err(e) => Err(e.into()),
    }
}

pub fn release_migration_lock(executor: &dyn StoreExecutor) -> Result<(), MigrationError> {
    executor.execute(&format!("SELECT pg_advisory_unlock({MIGRATION_LOCK_KEY})"), &[])?;
    log::debug!("migration lock released");
    Ok(())
}
