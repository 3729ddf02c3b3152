//! Transaction Module
//!
//! A transaction scope over any [`StoreExecutor`]. Statements issued through the
//! transaction run on the same session between `BEGIN` and `COMMIT`/`ROLLBACK`;
//! dropping an open transaction rolls it back.

use crate::executor::{StoreError, StoreExecutor};
use may_postgres::types::ToSql;
use may_postgres::Row;
use std::cell::Cell;

#[cfg(feature = "tracing")]
use crate::telemetry::tracing_helpers;

/// A database transaction borrowing a session
pub struct Transaction<'a> {
    executor: &'a dyn StoreExecutor,
    closed: Cell<bool>,
}

impl<'a> Transaction<'a> {
    /// Send `BEGIN` and wrap the session
    pub fn begin(executor: &'a dyn StoreExecutor) -> Result<Self, StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::begin_transaction_span().entered();

        executor.execute("BEGIN", &[])?;
        Ok(Self {
            executor,
            closed: Cell::new(false),
        })
    }

    /// Commit the transaction
    ///
    /// # Errors
    ///
    /// Returns `StoreError::TransactionClosed` if already closed, or the store's
    /// error if `COMMIT` fails (the server then rolls the transaction back).
    pub fn commit(self) -> Result<(), StoreError> {
        if self.closed.get() {
            return Err(StoreError::TransactionClosed);
        }

        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::commit_transaction_span().entered();

        self.closed.set(true);
        self.executor.execute("COMMIT", &[])?;
        Ok(())
    }

    /// Roll the transaction back
    pub fn rollback(self) -> Result<(), StoreError> {
        if self.closed.get() {
            return Err(StoreError::TransactionClosed);
        }
        self.closed.set(true);
        self.rollback_inner()
    }

    fn rollback_inner(&self) -> Result<(), StoreError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::rollback_transaction_span().entered();

        self.executor.execute("ROLLBACK", &[])?;
        Ok(())
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.closed.get() {
            self.closed.set(true);
            if let Err(e) = self.rollback_inner() {
                log::warn!("rollback of abandoned transaction failed: {e}");
            }
        }
    }
}

impl StoreExecutor for Transaction<'_> {
    fn execute(&self, query: &str, params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        if self.closed.get() {
            return Err(StoreError::TransactionClosed);
        }
        self.executor.execute(query, params)
    }

    fn query_one(&self, query: &str, params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        if self.closed.get() {
            return Err(StoreError::TransactionClosed);
        }
        self.executor.query_one(query, params)
    }

    fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        if self.closed.get() {
            return Err(StoreError::TransactionClosed);
        }
        self.executor.query_all(query, params)
    }
}
