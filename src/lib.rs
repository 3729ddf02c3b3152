//! # revchain
//!
//! Revision-chained, transactional PostgreSQL schema migrations on the `may`
//! coroutine runtime.
//!
//! Each schema change is a plain [`migration::SchemaChange`] value naming its
//! predecessor. A [`migration::Migrator`] applies or reverts them in chain order,
//! one transaction per revision, recording progress in an injected
//! [`migration::MigrationHistory`].

pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod telemetry;
pub mod transaction;
pub mod versions;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

#[cfg(test)]
mod test_support;

pub use connection::{connect, ConnectionError};
pub use executor::{PgExecutor, StoreError, StoreExecutor};
pub use transaction::Transaction;
