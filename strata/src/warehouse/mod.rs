//! Warehouse gateway: SQL execution against the cloud warehouse.
//!
//! [`WarehouseClient`] is the seam every layer operation goes through; the
//! production implementation is [`snowflake::SnowflakeClient`], and tests use
//! the scripted fake in `test_utils`.

pub mod snowflake;
pub mod statements;

use std::future::Future;

use crate::error::StrataResult;

/// A single result row: one optional string per column.
pub type Row = Vec<Option<String>>;

/// Gateway for executing SQL statements against the warehouse.
///
/// One client session is opened per orchestration unit (one per pipeline
/// procedure invocation), which is costly but keeps concurrent namespaces
/// isolated from each other. Implementations must preserve execute order
/// within a session.
pub trait WarehouseClient {
    /// Executes a single SQL statement.
    ///
    /// Returns `Some(rows)` for statements producing a result set and `None`
    /// otherwise. Any execution error propagates to the caller carrying the
    /// submitted statement and the server message.
    fn execute(&self, statement: &str) -> impl Future<Output = StrataResult<Option<Vec<Row>>>> + Send;

    /// Closes the session. Best-effort: never raises.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Collapses all whitespace runs in a statement to single spaces.
///
/// Statements are built from multi-line templates; the warehouse sees (and
/// error messages quote) the normalized form.
pub fn normalize_statement(statement: &str) -> String {
    statement.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::normalize_statement;

    #[test]
    fn normalization_collapses_whitespace() {
        let statement = "  SELECT *\n    FROM t\n  WHERE x = 1  ";
        assert_eq!(normalize_statement(statement), "SELECT * FROM t WHERE x = 1");
    }
}
