//! Database fixtures for integration tests
//!
//! Enabled by the `test-helpers` feature. Tests read `TEST_DATABASE_URL` and get
//! their own throw-away schema, dropped again when the fixture goes out of scope.

use crate::connection::{connect, ConnectionError};
use crate::executor::{PgExecutor, StoreError, StoreExecutor};

/// Environment variable holding the test database connection string
pub const TEST_DATABASE_URL: &str = "TEST_DATABASE_URL";

#[derive(Debug, thiserror::Error)]
pub enum TestDatabaseError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A session whose `search_path` points at a fresh, uniquely named schema
pub struct TestDatabase {
    executor: PgExecutor,
    schema: String,
}

impl TestDatabase {
    /// Connect using `TEST_DATABASE_URL`
    ///
    /// Returns `Ok(None)` when the variable is not set so callers can skip.
    pub fn from_env() -> Result<Option<Self>, TestDatabaseError> {
        match std::env::var(TEST_DATABASE_URL) {
            Ok(url) if !url.trim().is_empty() => Self::connect(&url).map(Some),
            _ => Ok(None),
        }
    }

    pub fn connect(url: &str) -> Result<Self, TestDatabaseError> {
        let executor = PgExecutor::new(connect(url)?);
        let schema = format!("revchain_test_{}", uuid::Uuid::new_v4().simple());

        executor.execute(&format!("CREATE SCHEMA {schema}"), &[])?;
        executor.execute(&format!("SET search_path TO {schema}"), &[])?;
        log::debug!("created test schema {schema}");

        Ok(Self { executor, schema })
    }

    pub fn executor(&self) -> &PgExecutor {
        &self.executor
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Names of the tables in the test schema, sorted
    pub fn table_names(&self) -> Result<Vec<String>, StoreError> {
        let rows = self.executor.query_all(
            "SELECT table_name::text FROM information_schema.tables
             WHERE table_schema = $1 ORDER BY table_name",
            &[&self.schema],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        let sql = format!("DROP SCHEMA IF EXISTS {} CASCADE", self.schema);
        if let Err(e) = self.executor.execute(&sql, &[]) {
            log::warn!("failed to drop test schema {}: {}", self.schema, e);
        }
    }
}
