//! SchemaManager - Provides methods for schema operations in migrations

use crate::executor::StoreExecutor;
use crate::migration::MigrationError;
use sea_query::{
    IndexCreateStatement, IndexDropStatement, PostgresQueryBuilder, TableAlterStatement,
    TableCreateStatement, TableDropStatement,
};
use std::cell::RefCell;

enum Mode<'a> {
    Live(&'a dyn StoreExecutor),
    Offline(RefCell<Vec<String>>),
}

/// SchemaManager provides methods for performing schema operations in migrations
///
/// A live manager runs every statement on the executor it wraps (normally the
/// transaction of the schema change being applied). An offline manager only
/// captures the rendered SQL, which is what checksums and `sql` scripts are made of.
pub struct SchemaManager<'a> {
    mode: Mode<'a>,
}

impl SchemaManager<'static> {
    /// Create a SchemaManager that records statements instead of running them
    pub fn offline() -> Self {
        SchemaManager {
            mode: Mode::Offline(RefCell::new(Vec::new())),
        }
    }
}

impl<'a> SchemaManager<'a> {
    /// Create a SchemaManager running statements on `executor`
    pub fn new(executor: &'a dyn StoreExecutor) -> Self {
        Self {
            mode: Mode::Live(executor),
        }
    }

    pub fn is_offline(&self) -> bool {
        matches!(self.mode, Mode::Offline(_))
    }

    /// Statements captured so far (always empty for a live manager)
    pub fn captured(&self) -> Vec<String> {
        match &self.mode {
            Mode::Live(_) => Vec::new(),
            Mode::Offline(statements) => statements.borrow().clone(),
        }
    }

    /// Create a table
    ///
    /// ```rust,no_run
    /// # use revchain::migration::{MigrationError, SchemaManager};
    /// use sea_query::{ColumnDef, Table};
    /// # fn up(manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
    /// let table = Table::create()
    ///     .table("platform")
    ///     .col(ColumnDef::new("id").integer().not_null().auto_increment().primary_key())
    ///     .col(ColumnDef::new("name").string().string_len(255).not_null())
    ///     .to_owned();
    ///
    /// manager.create_table(table)?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn create_table(&self, table: TableCreateStatement) -> Result<(), MigrationError> {
        self.run(table.build(PostgresQueryBuilder))
    }

    /// Drop a table
    ///
    /// Fails with the store's `dependent_objects_still_exist` error when other
    /// objects reference the table; nothing is dropped in cascade.
    pub fn drop_table(&self, table: TableDropStatement) -> Result<(), MigrationError> {
        self.run(table.build(PostgresQueryBuilder))
    }

    pub fn alter_table(&self, alter: TableAlterStatement) -> Result<(), MigrationError> {
        self.run(alter.build(PostgresQueryBuilder))
    }

    pub fn create_index(&self, index: IndexCreateStatement) -> Result<(), MigrationError> {
        self.run(index.build(PostgresQueryBuilder))
    }

    pub fn drop_index(&self, index: IndexDropStatement) -> Result<(), MigrationError> {
        self.run(index.build(PostgresQueryBuilder))
    }

    /// Execute raw SQL
    ///
    /// ```rust,no_run
    /// # use revchain::migration::{MigrationError, SchemaManager};
    /// # fn up(manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
    /// manager.execute("COMMENT ON TABLE folder_rule IS 'folder to game mapping'")?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn execute(&self, sql: &str) -> Result<(), MigrationError> {
        self.run(sql.to_string())
    }

    /// Check whether a table exists in the current schema
    pub fn has_table(&self, table: &str) -> Result<bool, MigrationError> {
        let executor = self.live("has_table")?;
        let row = executor.query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = current_schema() AND table_name = $1
            )",
            &[&table],
        )?;
        Ok(row.get(0))
    }

    /// Check whether a column exists on a table in the current schema
    pub fn has_column(&self, table: &str, column: &str) -> Result<bool, MigrationError> {
        let executor = self.live("has_column")?;
        let row = executor.query_one(
            "SELECT EXISTS (
                SELECT 1 FROM information_schema.columns
                WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2
            )",
            &[&table, &column],
        )?;
        Ok(row.get(0))
    }

    fn live(&self, operation: &str) -> Result<&'a dyn StoreExecutor, MigrationError> {
        match &self.mode {
            Mode::Live(executor) => Ok(*executor),
            Mode::Offline(_) => Err(MigrationError::OfflineUnsupported(operation.to_string())),
        }
    }

    fn run(&self, sql: String) -> Result<(), MigrationError> {
        match &self.mode {
            Mode::Live(executor) => {
                log::debug!("{sql}");
                executor.execute(&sql, &[])?;
            }
            Mode::Offline(statements) => statements.borrow_mut().push(sql),
        }
        Ok(())
    }
}
