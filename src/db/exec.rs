// Statement execution shared by pooled helpers and transactional groups.

use crate::error::DbError;
use crate::features::Features;
use crate::pool::DbConnection;
use crate::provider::Provider;
use crate::results::Row;
use crate::statement::{InsertBuilder, SelectBuilder, Statement};
use crate::types::SqlValue;

use super::InsertResult;

pub(crate) async fn select_one(
    conn: &mut DbConnection,
    features: &Features,
    query: &SelectBuilder,
) -> Result<Option<Row>, DbError> {
    let stmt = query.clone().limit(1).to_statement(features);
    let mut rs = conn.query(&stmt).await?;
    Ok(if rs.results.is_empty() {
        None
    } else {
        Some(rs.results.swap_remove(0))
    })
}

pub(crate) async fn count(
    conn: &mut DbConnection,
    features: &Features,
    query: &SelectBuilder,
) -> Result<i64, DbError> {
    let rs = conn.query(&query.to_count().to_statement(features)).await?;
    rs.first()
        .and_then(|row| row.get_by_index(0))
        .and_then(SqlValue::as_int)
        .ok_or_else(|| DbError::QueryError(format!("count on {} returned no total", query.table())))
}

/// Run one insert through the provider hook.
///
/// A customized insert is run as a query and its `RETURNING` row carries the sequence; an
/// empty result means the conflict clause swallowed the row. Otherwise the statement is
/// executed and the provider's last-sequence query runs on the same connection.
pub(crate) async fn insert(
    conn: &mut DbConnection,
    provider: &dyn Provider,
    features: &Features,
    insert: InsertBuilder,
    want_empty_on_conflict: bool,
) -> Result<InsertResult, DbError> {
    let (insert, applied) = provider.customize_insert(insert, want_empty_on_conflict);
    let stmt = insert.to_statement(features)?;

    if applied {
        let rs = conn.query(&stmt).await?;
        if rs.is_empty() {
            tracing::debug!(
                db = provider.name(),
                table = insert.table(),
                ignored_conflict = insert.ignores_conflicts(),
                "insert returned no rows"
            );
            return Ok(InsertResult::default());
        }
        let sequence = rs
            .results
            .last()
            .and_then(|row| row.get(provider.sequence_column()))
            .and_then(SqlValue::as_int);
        return Ok(InsertResult {
            rows_affected: rs.len() as u64,
            sequence,
        });
    }

    let rows_affected = conn.execute(&stmt).await?;
    let sequence = match features.last_sequence_query {
        Some(sql) if rows_affected > 0 => conn
            .query(&Statement::raw(sql))
            .await?
            .first()
            .and_then(|row| row.get_by_index(0))
            .and_then(SqlValue::as_int),
        _ => None,
    };
    Ok(InsertResult {
        rows_affected,
        sequence,
    })
}

/// Same as [`insert`], accumulating per-row results when the dialect cannot take several
/// rows in one statement. Callers wrap the per-row path in a transaction.
pub(crate) async fn insert_rows(
    conn: &mut DbConnection,
    provider: &dyn Provider,
    features: &Features,
    rows: InsertBuilder,
    want_empty_on_conflict: bool,
) -> Result<InsertResult, DbError> {
    if features.multi_row_insert || rows.row_count() <= 1 {
        return insert(conn, provider, features, rows, want_empty_on_conflict).await;
    }
    let mut total = InsertResult::default();
    for row in rows.split_rows() {
        let one = insert(conn, provider, features, row, want_empty_on_conflict).await?;
        total.rows_affected += one.rows_affected;
        if one.sequence.is_some() {
            total.sequence = one.sequence;
        }
    }
    Ok(total)
}
