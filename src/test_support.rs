//! In-crate test doubles

use crate::executor::{StoreError, StoreExecutor};
use may_postgres::types::ToSql;
use may_postgres::Row;
use std::cell::RefCell;

/// Executor that records every statement and can be told to fail some of them
pub(crate) struct RecordingExecutor {
    statements: RefCell<Vec<String>>,
    failures: RefCell<Vec<(String, String)>>,
}

impl RecordingExecutor {
    pub(crate) fn new() -> Self {
        Self {
            statements: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
        }
    }

    /// Fail any statement containing `needle` with the given SQLSTATE
    pub(crate) fn fail_on(&self, needle: &str, code: &str) {
        self.failures
            .borrow_mut()
            .push((needle.to_string(), code.to_string()));
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.statements.borrow().clone()
    }
}

impl StoreExecutor for RecordingExecutor {
    fn execute(&self, query: &str, _params: &[&dyn ToSql]) -> Result<u64, StoreError> {
        let query = query.trim().to_string();
        self.statements.borrow_mut().push(query.clone());
        if let Some((_, code)) = self
            .failures
            .borrow()
            .iter()
            .find(|(needle, _)| query.contains(needle.as_str()))
        {
            return Err(StoreError::with_code(code.clone(), format!("injected failure for: {query}")));
        }
        Ok(0)
    }

    fn query_one(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<Row, StoreError> {
        Err(StoreError::Unsupported("RecordingExecutor returns no rows".to_string()))
    }

    fn query_all(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, StoreError> {
        Err(StoreError::Unsupported("RecordingExecutor returns no rows".to_string()))
    }
}
