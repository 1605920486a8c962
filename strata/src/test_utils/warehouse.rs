//! In-memory warehouse gateway for tests.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::{ErrorKind, StrataResult};
use crate::strata_error;
use crate::warehouse::{Row, WarehouseClient, normalize_statement};

#[derive(Debug)]
struct ScriptedResponse {
    pattern: String,
    rows: VecDeque<Vec<Row>>,
}

#[derive(Debug, Default)]
struct Inner {
    executed: Vec<String>,
    responses: Vec<ScriptedResponse>,
    failures: Vec<(String, String)>,
    close_count: usize,
}

/// Scripted in-memory warehouse gateway.
///
/// Records every executed statement (normalized, exactly as a real gateway
/// would submit it) and answers statements matching a scripted substring
/// pattern with canned rows. Statements matching no script return no result
/// set, like DDL. Ideal for asserting the exact statement sequence an
/// orchestration step produces.
#[derive(Debug, Clone, Default)]
pub struct MemoryWarehouse {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answers every statement containing `pattern` with `rows`.
    pub async fn respond(&self, pattern: &str, rows: Vec<Row>) {
        let mut inner = self.inner.lock().await;
        inner.responses.push(ScriptedResponse {
            pattern: pattern.to_string(),
            rows: VecDeque::from(vec![rows]),
        });
    }

    /// Answers successive statements containing `pattern` with successive
    /// entries of `sequence`; the final entry repeats once exhausted.
    pub async fn respond_seq(&self, pattern: &str, sequence: Vec<Vec<Row>>) {
        let mut inner = self.inner.lock().await;
        inner.responses.push(ScriptedResponse {
            pattern: pattern.to_string(),
            rows: VecDeque::from(sequence),
        });
    }

    /// Fails every statement containing `pattern` with a statement error.
    pub async fn fail_on(&self, pattern: &str, message: &str) {
        let mut inner = self.inner.lock().await;
        inner
            .failures
            .push((pattern.to_string(), message.to_string()));
    }

    /// Every statement executed so far, in order.
    pub async fn executed(&self) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner.executed.clone()
    }

    /// Executed statements containing `pattern`.
    pub async fn executed_matching(&self, pattern: &str) -> Vec<String> {
        let inner = self.inner.lock().await;
        inner
            .executed
            .iter()
            .filter(|statement| statement.contains(pattern))
            .cloned()
            .collect()
    }

    /// Forgets recorded statements, keeping scripts in place.
    pub async fn clear_executed(&self) {
        let mut inner = self.inner.lock().await;
        inner.executed.clear();
    }

    /// Number of times the session was closed.
    pub async fn close_count(&self) -> usize {
        let inner = self.inner.lock().await;
        inner.close_count
    }

    /// Builds information-schema rows from `(name, type)` pairs.
    pub fn column_rows(columns: &[(&str, &str)]) -> Vec<Row> {
        columns
            .iter()
            .map(|(name, data_type)| {
                vec![Some(name.to_string()), Some(data_type.to_string())]
            })
            .collect()
    }

    /// Builds the single-cell result of a pipe status query.
    pub fn pipe_status_rows(payload: &str) -> Vec<Row> {
        vec![vec![Some(payload.to_string())]]
    }
}

impl WarehouseClient for MemoryWarehouse {
    async fn execute(&self, statement: &str) -> StrataResult<Option<Vec<Row>>> {
        let statement = normalize_statement(statement);
        let mut inner = self.inner.lock().await;
        inner.executed.push(statement.clone());

        if let Some((_, message)) = inner
            .failures
            .iter()
            .find(|(pattern, _)| statement.contains(pattern))
        {
            return Err(strata_error!(
                ErrorKind::StatementFailed,
                "SQL statement failed",
                format!("statement: {statement}; server message: {message}")
            ));
        }

        let response = inner
            .responses
            .iter_mut()
            .find(|response| statement.contains(&response.pattern));
        let Some(response) = response else {
            return Ok(None);
        };

        let rows = if response.rows.len() > 1 {
            response.rows.pop_front().unwrap_or_default()
        } else {
            response.rows.front().cloned().unwrap_or_default()
        };

        Ok(Some(rows))
    }

    async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.close_count += 1;
    }
}
