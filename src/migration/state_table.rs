//! Migration state table management

use crate::executor::StoreExecutor;
use crate::migration::{MigrationError, MigrationHistory, MigrationRecord};

/// Default name of the history table
pub const DEFAULT_HISTORY_TABLE: &str = "revchain_history";

/// History stored in a `PostgreSQL` table of the migrated schema
///
/// ```sql
/// CREATE TABLE IF NOT EXISTS revchain_history (
///     revision VARCHAR(255) PRIMARY KEY,
///     description VARCHAR(255) NOT NULL,
///     checksum VARCHAR(64) NOT NULL,
///     applied_at TIMESTAMPTZ NOT NULL,
///     execution_time_ms BIGINT
/// )
/// ```
#[derive(Debug, Clone)]
pub struct TableHistory {
    table: String,
}

impl Default for TableHistory {
    fn default() -> Self {
        Self {
            table: DEFAULT_HISTORY_TABLE.to_string(),
        }
    }
}

impl TableHistory {
    /// History in a custom table
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidIdentifier` unless `table` is a plain
    /// lower-case identifier (`[a-z_][a-z0-9_]*`, at most 63 bytes).
    pub fn new(table: impl Into<String>) -> Result<Self, MigrationError> {
        let table = table.into();
        validate_identifier(&table)?;
        Ok(Self { table })
    }

    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// `CREATE TABLE` statement of the history table
    pub fn create_table_sql(&self) -> String {
        format!(
            "CREATE TABLE IF NOT EXISTS {} (
                revision VARCHAR(255) PRIMARY KEY,
                description VARCHAR(255) NOT NULL,
                checksum VARCHAR(64) NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL,
                execution_time_ms BIGINT
            )",
            self.table
        )
    }

    fn create_index_sql(&self) -> String {
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_applied_at ON {0}(applied_at)",
            self.table
        )
    }

    /// `INSERT` statement with the record inlined, for offline scripts
    pub fn insert_sql_literal(&self, record: &MigrationRecord) -> String {
        format!(
            "INSERT INTO {} (revision, description, checksum, applied_at, execution_time_ms) VALUES ({}, {}, {}, {}, {})",
            self.table,
            quote_literal(&record.revision),
            quote_literal(&record.description),
            quote_literal(&record.checksum),
            quote_literal(&record.applied_at.to_rfc3339()),
            record
                .execution_time_ms
                .map_or_else(|| "NULL".to_string(), |ms| ms.to_string()),
        )
    }
}

impl MigrationHistory for TableHistory {
    fn ensure(&self, executor: &dyn StoreExecutor) -> Result<(), MigrationError> {
        executor.execute(&self.create_table_sql(), &[])?;
        executor.execute(&self.create_index_sql(), &[])?;
        Ok(())
    }

    fn is_initialized(&self, executor: &dyn StoreExecutor) -> Result<bool, MigrationError> {
        let row = executor.query_one(
            "SELECT to_regclass($1::text) IS NOT NULL",
            &[&self.table],
        )?;
        Ok(row.get(0))
    }

    fn applied(&self, executor: &dyn StoreExecutor) -> Result<Vec<MigrationRecord>, MigrationError> {
        let sql = format!(
            "SELECT revision, description, checksum, applied_at, execution_time_ms
             FROM {}
             ORDER BY applied_at ASC, revision ASC",
            self.table
        );
        let rows = executor.query_all(&sql, &[])?;
        Ok(rows.iter().map(MigrationRecord::from_row).collect())
    }

    fn has_applied(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<bool, MigrationError> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE revision = $1)",
            self.table
        );
        let row = executor.query_one(&sql, &[&revision])?;
        Ok(row.get(0))
    }

    fn record_applied(&self, executor: &dyn StoreExecutor, record: &MigrationRecord) -> Result<(), MigrationError> {
        let sql = format!(
            "INSERT INTO {} (revision, description, checksum, applied_at, execution_time_ms)
             VALUES ($1, $2, $3, $4, $5)",
            self.table
        );
        executor.execute(
            &sql,
            &[
                &record.revision,
                &record.description,
                &record.checksum,
                &record.applied_at,
                &record.execution_time_ms,
            ],
        )?;
        Ok(())
    }

    fn remove_applied(&self, executor: &dyn StoreExecutor, revision: &str) -> Result<(), MigrationError> {
        let sql = format!("DELETE FROM {} WHERE revision = $1", self.table);
        let removed = executor.execute(&sql, &[&revision])?;
        if removed == 0 {
            log::warn!("history table {} had no row for revision {}", self.table, revision);
        }
        Ok(())
    }

    fn ensure_sql(&self) -> Vec<String> {
        vec![self.create_table_sql(), self.create_index_sql()]
    }

    fn record_sql(&self, record: &MigrationRecord) -> Option<String> {
        Some(self.insert_sql_literal(record))
    }
}

/// Accept only plain lower-case identifiers so table names can be inlined in SQL
pub fn validate_identifier(identifier: &str) -> Result<(), MigrationError> {
    let mut chars = identifier.chars();
    let valid_start = matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_');
    let valid_rest = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid_start && valid_rest && identifier.len() <= 63 {
        Ok(())
    } else {
        Err(MigrationError::InvalidIdentifier(identifier.to_string()))
    }
}

fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
