//! Revision: i4d5e6f7g8h9
//! Revises: h3c4d5e6f7g8
//! Created: 2026-02-13 12:00:00
//!
//! Adds `folder_rule`: one row maps a filesystem folder to a game in
//! `game_metadata`.

use crate::migration::{MigrationError, SchemaChange, SchemaManager};
use sea_query::{ColumnDef, ForeignKey, Table};

pub const REVISION: &str = "i4d5e6f7g8h9";
pub const DOWN_REVISION: &str = "h3c4d5e6f7g8";

/// Longest folder path a rule can hold
pub const MAX_FOLDER_PATH_LEN: u32 = 2048;

pub const CHANGE: SchemaChange = SchemaChange::new(
    REVISION,
    Some(DOWN_REVISION),
    "add folder_rule table",
    up,
    down,
);

fn up(manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
    // No IF NOT EXISTS: an existing table must surface as a conflict
    manager.create_table(
        Table::create()
            .table("folder_rule")
            .col(
                ColumnDef::new("id")
                    .integer()
                    .not_null()
                    .auto_increment()
                    .primary_key(),
            )
            .col(
                ColumnDef::new("folder_path")
                    .string()
                    .string_len(MAX_FOLDER_PATH_LEN)
                    .not_null()
                    .unique_key(),
            )
            .col(ColumnDef::new("game_id").integer().not_null())
            .foreign_key(
                ForeignKey::create()
                    .name("fk_folder_rule_game_id")
                    .from("folder_rule", "game_id")
                    .to("game_metadata", "id"),
            )
            .to_owned(),
    )
}

fn down(manager: &SchemaManager<'_>) -> Result<(), MigrationError> {
    manager.drop_table(Table::drop().table("folder_rule").to_owned())
}
