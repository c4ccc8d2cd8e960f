use std::sync::{Arc, PoisonError};

use super::manager::SharedSqliteConnection;
use super::params::convert_params;
use super::query::build_result_set;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::statement::Statement;

/// Run synchronous rusqlite work on the blocking pool.
///
/// If the returned future is dropped before the blocking task gets the connection, `func` is
/// skipped, so abandoned work never runs behind a later caller's statements.
///
/// # Errors
/// Returns whatever `func` returns, or `DbError::QueryError` if the blocking task panicked.
pub async fn run_blocking<F, R>(conn: &SharedSqliteConnection, func: F) -> Result<R, DbError>
where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R, DbError> + Send + 'static,
    R: Send + 'static,
{
    let conn = Arc::clone(conn);
    let waiting = Arc::new(());
    let caller = Arc::downgrade(&waiting);
    let res = tokio::task::spawn_blocking(move || {
        let mut guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
        if caller.strong_count() == 0 {
            return Err(DbError::Cancelled(
                "statement abandoned before it started".to_string(),
            ));
        }
        func(&mut guard)
    })
    .await
    .map_err(|e| DbError::QueryError(format!("sqlite worker task failed: {e}")))?;
    drop(waiting);
    res
}

/// Run a statement that returns rows.
///
/// # Errors
/// Returns errors from preparation, execution, or value extraction.
pub async fn query(conn: &SharedSqliteConnection, stmt: &Statement) -> Result<ResultSet, DbError> {
    let sql = stmt.sql.clone();
    let params = convert_params(&stmt.params);
    run_blocking(conn, move |c| {
        let mut prepared = c.prepare(&sql)?;
        build_result_set(&mut prepared, &params)
    })
    .await
}

/// Run a statement and return the number of rows affected.
///
/// # Errors
/// Returns errors from preparation or execution.
pub async fn execute(conn: &SharedSqliteConnection, stmt: &Statement) -> Result<u64, DbError> {
    let sql = stmt.sql.clone();
    let params = convert_params(&stmt.params);
    run_blocking(conn, move |c| {
        let mut prepared = c.prepare(&sql)?;
        let rows = prepared.execute(rusqlite::params_from_iter(params.iter()))?;
        Ok(rows as u64)
    })
    .await
}

/// Run one or more semicolon-separated statements without parameters.
///
/// # Errors
/// Returns any error reported by SQLite.
pub async fn execute_batch(conn: &SharedSqliteConnection, sql: &str) -> Result<(), DbError> {
    let sql = sql.to_string();
    run_blocking(conn, move |c| Ok(c.execute_batch(&sql)?)).await
}
