#[cfg(any(feature = "postgres", feature = "sqlite"))]
use bb8::PooledConnection;

#[cfg(feature = "postgres")]
use crate::postgres::{self, PgManager};
#[cfg(feature = "sqlite")]
use crate::sqlite::{self, SqliteManager};

use crate::error::DbError;
use crate::results::ResultSet;
use crate::statement::Statement;

/// A connection checked out of a [`DbPool`](super::DbPool).
///
/// Dropping it returns the connection to the pool.
pub enum DbConnection {
    #[cfg(feature = "postgres")]
    Postgres(PooledConnection<'static, PgManager>),
    #[cfg(feature = "sqlite")]
    Sqlite(PooledConnection<'static, SqliteManager>),
}

// Manual Debug implementation because pooled connections do not expose `Debug`
impl std::fmt::Debug for DbConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => f.debug_tuple("Postgres").field(&"<Client>").finish(),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => f.debug_tuple("Sqlite").field(&"<Connection>").finish(),
        }
    }
}

/// Aborts whatever statement is running on one checked-out connection.
///
/// Taken before the statement starts so it can be used while the connection is busy.
pub enum CancelHandle {
    #[cfg(feature = "postgres")]
    Postgres(tokio_postgres::CancelToken),
    #[cfg(feature = "sqlite")]
    Sqlite(rusqlite::InterruptHandle),
}

impl std::fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(_) => f.write_str("CancelHandle::Postgres"),
            #[cfg(feature = "sqlite")]
            Self::Sqlite(_) => f.write_str("CancelHandle::Sqlite"),
        }
    }
}

impl CancelHandle {
    /// Ask the backend to stop the running statement. Postgres sends a cancel request on a
    /// side connection and waits for the server to accept it; SQLite sets the interrupt flag.
    pub async fn cancel(&self) {
        match self {
            #[cfg(feature = "postgres")]
            Self::Postgres(token) => {
                if let Err(e) = token.cancel_query(tokio_postgres::NoTls).await {
                    tracing::warn!(error = %e, "postgres cancel request failed");
                }
            }
            #[cfg(feature = "sqlite")]
            Self::Sqlite(handle) => handle.interrupt(),
        }
    }
}

impl DbConnection {
    #[must_use]
    pub fn cancel_handle(&self) -> CancelHandle {
        match self {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(client) => CancelHandle::Postgres(client.cancel_token()),
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => CancelHandle::Sqlite(
                conn.lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .get_interrupt_handle(),
            ),
        }
    }

    /// Run a statement that returns rows.
    ///
    /// # Errors
    /// Returns `DbError::ConflictError` on uniqueness violations, `DbError::QueryError` otherwise.
    pub async fn query(&mut self, stmt: &Statement) -> Result<ResultSet, DbError> {
        tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "query");
        match self {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(client) => postgres::executor::query(client, stmt).await,
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => sqlite::executor::query(conn, stmt).await,
        }
    }

    /// Run a statement and return the number of affected rows.
    ///
    /// # Errors
    /// Returns `DbError::ConflictError` on uniqueness violations, `DbError::QueryError` otherwise.
    pub async fn execute(&mut self, stmt: &Statement) -> Result<u64, DbError> {
        tracing::debug!(sql = %stmt.sql, params = stmt.params.len(), "execute");
        match self {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(client) => postgres::executor::execute(client, stmt).await,
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => sqlite::executor::execute(conn, stmt).await,
        }
    }

    /// Run parameterless, semicolon-separated SQL.
    ///
    /// # Errors
    /// Returns `DbError::QueryError` if any statement fails.
    pub async fn execute_batch(&mut self, sql: &str) -> Result<(), DbError> {
        tracing::debug!(sql = %sql, "execute batch");
        match self {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(client) => postgres::executor::execute_batch(client, sql).await,
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => sqlite::executor::execute_batch(conn, sql).await,
        }
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the transaction cannot be started.
    pub async fn begin(&mut self) -> Result<(), DbError> {
        self.execute_batch("BEGIN").await
    }

    /// # Errors
    /// Returns `DbError::QueryError` (or `ConflictError` for deferred constraints) on failure.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        self.execute_batch("COMMIT").await
    }

    /// # Errors
    /// Returns `DbError::QueryError` if the rollback fails.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        self.execute_batch("ROLLBACK").await
    }

    /// Best-effort rollback for a connection abandoned mid-transaction, usable from `Drop`.
    ///
    /// Postgres rolls back on a spawned task when a runtime is available, and on a throwaway
    /// current-thread runtime otherwise; SQLite rolls back synchronously.
    pub(crate) fn rollback_detached(self) {
        match self {
            #[cfg(feature = "postgres")]
            DbConnection::Postgres(client) => match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        if let Err(e) = client.batch_execute("ROLLBACK").await {
                            tracing::warn!(error = %e, "rollback of abandoned transaction failed");
                        }
                    });
                }
                Err(_) => rollback_without_runtime(&client),
            },
            #[cfg(feature = "sqlite")]
            DbConnection::Sqlite(conn) => {
                let guard = conn
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner);
                if !guard.is_autocommit()
                    && let Err(e) = guard.execute_batch("ROLLBACK")
                {
                    tracing::warn!(error = %e, "rollback of abandoned transaction failed");
                }
            }
        }
    }
}

/// Roll back on a throwaway runtime; the client's connection task keeps running on its own.
/// If that task is gone the client reports `is_closed` and the pool discards it on return.
#[cfg(feature = "postgres")]
fn rollback_without_runtime(client: &tokio_postgres::Client) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "no runtime to roll back abandoned postgres transaction");
            return;
        }
    };
    if let Err(e) = runtime.block_on(client.batch_execute("ROLLBACK")) {
        tracing::error!(error = %e, "rollback of abandoned postgres transaction failed");
    }
}
