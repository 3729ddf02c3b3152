//! Shared fixtures for the database-backed tests
#![allow(dead_code)]

use revchain::executor::{StoreError, StoreExecutor};
use revchain::migration::{Migrator, TableHistory};
use revchain::test_helpers::TestDatabase;
use revchain::versions::i4d5e6f7g8h9_add_folder_rule_table::DOWN_REVISION;

/// Evaluate to a `TestDatabase`, or return from the test when none is configured
macro_rules! require_db {
    () => {
        match common::database() {
            Some(db) => db,
            None => return,
        }
    };
}

pub fn database() -> Option<TestDatabase> {
    match TestDatabase::from_env() {
        Ok(Some(db)) => Some(db),
        Ok(None) => {
            eprintln!("skipping: TEST_DATABASE_URL not set");
            None
        }
        Err(e) => panic!("failed to set up test database: {e}"),
    }
}

/// `game_metadata` as the owning application defines it, with one game (id = 1)
pub fn create_game_metadata(db: &TestDatabase) {
    db.executor()
        .execute("CREATE TABLE game_metadata (id INTEGER PRIMARY KEY, name TEXT)", &[])
        .unwrap();
    db.executor()
        .execute("INSERT INTO game_metadata (id, name) VALUES (1, 'Doom')", &[])
        .unwrap();
}

/// Migrator over the shipped chain with its baseline already stamped
pub fn stamped_migrator(db: &TestDatabase) -> Migrator {
    let migrator = Migrator::new(revchain::versions::chain().unwrap(), TableHistory::default());
    migrator.stamp(db.executor(), DOWN_REVISION).unwrap();
    migrator
}

/// `(table, constraint, type)` for every constraint in the test schema, sorted
pub fn constraints(db: &TestDatabase) -> Vec<(String, String, String)> {
    db.executor()
        .query_all(
            "SELECT table_name::text, constraint_name::text, constraint_type::text
             FROM information_schema.table_constraints
             WHERE constraint_schema = current_schema()
             ORDER BY 1, 2",
            &[],
        )
        .unwrap()
        .iter()
        .map(|r| (r.get(0), r.get(1), r.get(2)))
        .collect()
}

pub fn insert_rule(db: &TestDatabase, folder_path: &str, game_id: i32) -> Result<u64, StoreError> {
    db.executor().execute(
        "INSERT INTO folder_rule (folder_path, game_id) VALUES ($1, $2)",
        &[&folder_path, &game_id],
    )
}

pub fn sqlstate(result: Result<u64, StoreError>) -> String {
    match result {
        Ok(_) => panic!("statement unexpectedly succeeded"),
        Err(e) => e.code().unwrap_or_default().to_string(),
    }
}
