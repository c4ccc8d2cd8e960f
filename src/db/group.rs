use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::{InsertResult, ReadyState, exec};
use crate::context::Context;
use crate::error::DbError;
use crate::features::Features;
use crate::pool::DbConnection;
use crate::provider::Provider;
use crate::results::{ResultSet, Row};
use crate::statement::{DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder};

/// Boxed future returned by group closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A transaction on one pooled connection, handed to [`Database::run_as_group`] closures.
///
/// If a `Tx` is dropped before the group finishes (cancellation, panic) the transaction is
/// rolled back in the background before the connection goes back to the pool.
///
/// [`Database::run_as_group`]: super::Database::run_as_group
pub struct Tx {
    conn: Option<DbConnection>,
    provider: Arc<dyn Provider>,
    features: Features,
}

impl std::fmt::Debug for Tx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tx")
            .field("db", &self.provider.name())
            .field("open", &self.conn.is_some())
            .finish()
    }
}

impl Tx {
    #[must_use]
    pub fn features(&self) -> &Features {
        &self.features
    }

    fn conn(&mut self) -> Result<&mut DbConnection, DbError> {
        self.conn
            .as_mut()
            .ok_or_else(|| DbError::QueryError("transaction already finished".to_string()))
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn select(&mut self, query: &SelectBuilder) -> Result<ResultSet, DbError> {
        let stmt = query.to_statement(&self.features);
        self.conn()?.query(&stmt).await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn select_one(&mut self, query: &SelectBuilder) -> Result<Option<Row>, DbError> {
        let features = self.features;
        exec::select_one(self.conn()?, &features, query).await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn count(&mut self, query: &SelectBuilder) -> Result<i64, DbError> {
        let features = self.features;
        exec::count(self.conn()?, &features, query).await
    }

    /// Insert within the transaction. See [`Database::insert`](super::Database::insert).
    ///
    /// # Errors
    /// Returns `DbError::ConflictError` on a uniqueness violation the dialect did not absorb.
    pub async fn insert(
        &mut self,
        insert: InsertBuilder,
        want_empty_on_conflict: bool,
    ) -> Result<InsertResult, DbError> {
        let provider = Arc::clone(&self.provider);
        let features = self.features;
        exec::insert_rows(
            self.conn()?,
            provider.as_ref(),
            &features,
            insert,
            want_empty_on_conflict,
        )
        .await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn update(&mut self, update: &UpdateBuilder) -> Result<u64, DbError> {
        let stmt = update.to_statement(&self.features)?;
        self.conn()?.execute(&stmt).await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn delete(&mut self, delete: &DeleteBuilder) -> Result<u64, DbError> {
        let stmt = delete.to_statement(&self.features);
        self.conn()?.execute(&stmt).await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn execute(&mut self, stmt: &Statement) -> Result<u64, DbError> {
        self.conn()?.execute(stmt).await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the statement fails.
    pub async fn query(&mut self, stmt: &Statement) -> Result<ResultSet, DbError> {
        self.conn()?.query(stmt).await
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        let mut conn = self.conn.take().ok_or_else(|| {
            DbError::QueryError("transaction already finished".to_string())
        })?;
        match conn.commit().await {
            Ok(()) => Ok(()),
            Err(e) => {
                // a failed COMMIT may leave the transaction open
                conn.rollback_detached();
                Err(e)
            }
        }
    }

    async fn rollback(&mut self) {
        if let Some(mut conn) = self.conn.take()
            && let Err(e) = conn.rollback().await
        {
            tracing::warn!(db = self.provider.name(), error = %e, "rollback failed");
        }
    }
}

impl Drop for Tx {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            tracing::debug!(db = self.provider.name(), "rolling back abandoned transaction");
            conn.rollback_detached();
        }
    }
}

/// Run `group` in a transaction, optionally holding the provider's named lock for its
/// duration. Commits on `Ok`, rolls back on `Err`.
///
/// When `ctx` is cancelled mid-group the running statement is aborted, the group future is
/// dropped, and the transaction is rolled back before this returns, so a held lock is already
/// released when the caller sees `DbError::Cancelled`.
pub(crate) async fn run_in_tx<T, F>(
    ctx: &Context,
    ready: Arc<ReadyState>,
    lock_name: Option<&str>,
    group: F,
) -> Result<T, DbError>
where
    F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T, DbError>>,
{
    let lock_sql = lock_name
        .map(|name| ready.features.lock_statement(ready.provider.name(), name))
        .transpose()?;

    let mut conn = ctx.run(ready.pool.get()).await?;
    let cancel = conn.cancel_handle();
    ctx.run_interruptible(&cancel, conn.begin()).await?;
    let mut tx = Tx {
        conn: Some(conn),
        provider: Arc::clone(&ready.provider),
        features: ready.features,
    };

    let outcome = tokio::select! {
        res = run_body(&mut tx, lock_name, lock_sql, group) => res,
        err = ctx.done() => {
            cancel.cancel().await;
            Err(err)
        }
    };

    match outcome {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(e) => {
            tx.rollback().await;
            Err(e)
        }
    }
}

async fn run_body<T, F>(
    tx: &mut Tx,
    lock_name: Option<&str>,
    lock_sql: Option<String>,
    group: F,
) -> Result<T, DbError>
where
    F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T, DbError>>,
{
    if let Some(sql) = lock_sql {
        tracing::debug!(db = tx.provider.name(), lock = lock_name, "acquiring lock");
        tx.conn()?.execute_batch(&sql).await?;
    }
    group(tx).await
}
