//! Integration tests for the Migrator
//!
//! These tests validate locking, history bookkeeping and failure handling
//! against a real PostgreSQL database (TEST_DATABASE_URL).

#[macro_use]
mod common;

use common::{create_game_metadata, stamped_migrator};
use revchain::executor::StoreExecutor;
use revchain::migration::lock::MIGRATION_LOCK_KEY;
use revchain::migration::{
    startup_migrations, MigrationError, MigrationHistory, Migrator, TableHistory, Target,
};
use revchain::versions::i4d5e6f7g8h9_add_folder_rule_table::{DOWN_REVISION, REVISION};

fn history_revisions(migrator: &Migrator, executor: &dyn StoreExecutor) -> Vec<String> {
    migrator
        .history()
        .applied(executor)
        .unwrap()
        .into_iter()
        .map(|r| r.revision)
        .collect()
}

#[test]
fn test_root_requires_stamped_baseline() {
    let db = require_db!();
    create_game_metadata(&db);
    let migrator = Migrator::new(revchain::versions::chain().unwrap(), TableHistory::default());

    let err = migrator.upgrade(db.executor(), &Target::Head).unwrap_err();
    assert!(
        matches!(err, MigrationError::PredecessorNotApplied { ref predecessor, .. } if predecessor == DOWN_REVISION),
        "unexpected error: {err:?}"
    );

    migrator.stamp(db.executor(), DOWN_REVISION).unwrap();
    assert_eq!(migrator.upgrade(db.executor(), &Target::Head).unwrap(), 1);
    assert_eq!(history_revisions(&migrator, db.executor()), vec![DOWN_REVISION, REVISION]);
}

#[test]
fn test_dry_run_plan_leaves_store_untouched() {
    let db = require_db!();
    create_game_metadata(&db);
    let before = db.table_names().unwrap();
    let migrator = Migrator::new(revchain::versions::chain().unwrap(), TableHistory::default());

    let plan = migrator.plan_upgrade(db.executor(), &Target::Head).unwrap();
    let revisions: Vec<&str> = plan.iter().map(|c| c.revision).collect();
    assert_eq!(revisions, vec![REVISION]);
    assert!(migrator.plan_downgrade(db.executor(), &Target::Base).unwrap().is_empty());
    assert_eq!(db.table_names().unwrap(), before);
}

#[test]
fn test_failed_revision_leaves_no_trace() {
    let db = require_db!();
    // no game_metadata: the foreign key target is missing
    let migrator = stamped_migrator(&db);

    let err = migrator.upgrade(db.executor(), &Target::Head).unwrap_err();
    assert!(
        matches!(err, MigrationError::ReferentialTargetMissing { ref revision, .. } if revision == REVISION),
        "unexpected error: {err:?}"
    );
    assert_eq!(history_revisions(&migrator, db.executor()), vec![DOWN_REVISION]);
    assert!(!db.table_names().unwrap().contains(&"folder_rule".to_string()));

    // the session is usable again after the rollback
    create_game_metadata(&db);
    assert_eq!(migrator.upgrade(db.executor(), &Target::Head).unwrap(), 1);
}

#[test]
fn test_status_tracks_current_revision() {
    let db = require_db!();
    create_game_metadata(&db);
    let migrator = stamped_migrator(&db);

    let status = migrator.status(db.executor()).unwrap();
    assert_eq!(status.current.as_deref(), Some(DOWN_REVISION));
    assert_eq!(status.pending_count(), 1);

    migrator.upgrade(db.executor(), &Target::Head).unwrap();
    let status = migrator.status(db.executor()).unwrap();
    assert_eq!(status.current.as_deref(), Some(REVISION));
    assert!(status.is_up_to_date());
    assert!(status.applied[1].execution_time_ms.is_some());
    assert_eq!(status.applied[1].checksum.len(), 64);
}

#[test]
fn test_modified_revision_is_detected() {
    let db = require_db!();
    create_game_metadata(&db);
    let migrator = stamped_migrator(&db);
    migrator.upgrade(db.executor(), &Target::Head).unwrap();

    db.executor()
        .execute(
            "UPDATE revchain_history SET checksum = 'edited' WHERE revision = $1",
            &[&REVISION],
        )
        .unwrap();

    let err = migrator.validate_checksums(db.executor()).unwrap_err();
    assert!(
        matches!(err, MigrationError::ChecksumMismatch { ref stored, .. } if stored == "edited"),
        "unexpected error: {err:?}"
    );
    assert!(startup_migrations(db.executor(), &migrator).is_err());
}

#[test]
fn test_stamp_existing_schema() {
    let db = require_db!();
    create_game_metadata(&db);
    // schema created by earlier tooling
    db.executor()
        .execute(
            "CREATE TABLE folder_rule (id SERIAL PRIMARY KEY, folder_path VARCHAR(2048) NOT NULL UNIQUE, game_id INTEGER NOT NULL REFERENCES game_metadata(id))",
            &[],
        )
        .unwrap();

    let migrator = Migrator::new(revchain::versions::chain().unwrap(), TableHistory::default());
    assert_eq!(migrator.stamp(db.executor(), REVISION).unwrap(), 2);
    assert_eq!(migrator.upgrade(db.executor(), &Target::Head).unwrap(), 0);
    assert!(matches!(
        migrator.stamp(db.executor(), REVISION),
        Err(MigrationError::AlreadyApplied(_))
    ));
}

#[test]
fn test_custom_history_table() {
    let db = require_db!();
    create_game_metadata(&db);
    let history = TableHistory::new("schema_history").unwrap();
    let migrator = Migrator::new(revchain::versions::chain().unwrap(), history);
    migrator.stamp(db.executor(), DOWN_REVISION).unwrap();

    assert_eq!(startup_migrations(db.executor(), &migrator).unwrap(), 1);
    assert_eq!(startup_migrations(db.executor(), &migrator).unwrap(), 0);

    let tables = db.table_names().unwrap();
    assert!(tables.contains(&"schema_history".to_string()));
    assert!(!tables.contains(&"revchain_history".to_string()));
}

#[test]
fn test_lock_timeout_when_another_runner_holds_the_lock() {
    let db = require_db!();
    let holder = require_db!();
    create_game_metadata(&db);
    let migrator = stamped_migrator(&db).with_lock_timeout(1);

    holder
        .executor()
        .execute(&format!("SELECT pg_advisory_lock({MIGRATION_LOCK_KEY})"), &[])
        .unwrap();

    let err = migrator.upgrade(db.executor(), &Target::Head).unwrap_err();
    assert!(matches!(err, MigrationError::LockTimeout(_)), "unexpected error: {err:?}");
    assert_eq!(history_revisions(&migrator, db.executor()), vec![DOWN_REVISION]);

    holder
        .executor()
        .execute(&format!("SELECT pg_advisory_unlock({MIGRATION_LOCK_KEY})"), &[])
        .unwrap();
    assert_eq!(migrator.upgrade(db.executor(), &Target::Head).unwrap(), 1);
}

#[test]
fn test_offline_script_matches_online_upgrade() {
    let db = require_db!();
    create_game_metadata(&db);
    let migrator = stamped_migrator(&db);

    let script = migrator.upgrade_sql(Some(DOWN_REVISION), &Target::Head).unwrap();
    for statement in script.split(";\n\n").map(str::trim).filter(|s| !s.is_empty()) {
        db.executor().execute(statement, &[]).unwrap();
    }

    // the recorded checksum is the one the online runner computes
    migrator.validate_checksums(db.executor()).unwrap();
    assert!(migrator.status(db.executor()).unwrap().is_up_to_date());
    assert!(db.table_names().unwrap().contains(&"folder_rule".to_string()));
}
