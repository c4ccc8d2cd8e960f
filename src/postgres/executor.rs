use tokio_postgres::Client;

use super::params::as_refs;
use super::query::build_result_set;
use crate::error::DbError;
use crate::results::ResultSet;
use crate::statement::Statement;

/// Run a statement that returns rows.
///
/// # Errors
/// Returns errors from statement preparation, execution, or value extraction.
pub async fn query(client: &Client, stmt: &Statement) -> Result<ResultSet, DbError> {
    let prepared = client.prepare(&stmt.sql).await?;
    let rows = client.query(&prepared, &as_refs(&stmt.params)).await?;
    build_result_set(&prepared, &rows)
}

/// Run a statement and return the number of rows affected.
///
/// # Errors
/// Returns errors from statement preparation or execution.
pub async fn execute(client: &Client, stmt: &Statement) -> Result<u64, DbError> {
    let prepared = client.prepare(&stmt.sql).await?;
    Ok(client.execute(&prepared, &as_refs(&stmt.params)).await?)
}

/// Run one or more semicolon-separated statements without parameters.
///
/// # Errors
/// Returns any error reported by the server.
pub async fn execute_batch(client: &Client, sql: &str) -> Result<(), DbError> {
    client.batch_execute(sql).await?;
    Ok(())
}
