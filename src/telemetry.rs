//! Span helpers used when the `tracing` feature is enabled.
//!
//! Logging always goes through the `log` facade; these spans only add structure
//! for subscribers that understand `tracing`.

#[cfg(feature = "tracing")]
pub mod tracing_helpers {
    use tracing::{info_span, Span};

    /// Longest statement prefix recorded on a span
    const MAX_STATEMENT_LEN: usize = 120;

    fn truncate(query: &str) -> &str {
        let query = query.trim();
        match query.char_indices().nth(MAX_STATEMENT_LEN) {
            Some((idx, _)) => &query[..idx],
            None => query,
        }
    }

    pub fn execute_query_span(query: &str) -> Span {
        info_span!("revchain.execute", db.system = "postgresql", db.statement = truncate(query))
    }

    pub fn acquire_connection_span() -> Span {
        info_span!("revchain.connect", db.system = "postgresql")
    }

    pub fn begin_transaction_span() -> Span {
        info_span!("revchain.transaction.begin")
    }

    pub fn commit_transaction_span() -> Span {
        info_span!("revchain.transaction.commit")
    }

    pub fn rollback_transaction_span() -> Span {
        info_span!("revchain.transaction.rollback")
    }

    pub fn schema_change_span(revision: &str, direction: &str) -> Span {
        info_span!("revchain.schema_change", revision = revision, direction = direction)
    }

    pub fn migration_lock_span() -> Span {
        info_span!("revchain.lock")
    }

}
