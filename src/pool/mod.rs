mod connection;

pub use connection::{CancelHandle, DbConnection};

#[cfg(feature = "postgres")]
use crate::postgres::PgManager;
#[cfg(feature = "sqlite")]
use crate::sqlite::SqliteManager;

use bb8::{ManageConnection, Pool};

use crate::config::PoolOptions;
use crate::error::DbError;

/// A dialect connection handle returned by [`Provider::open`](crate::Provider::open).
///
/// It knows how to reach the database but holds no connections until it is turned into a
/// pool with [`connect_pool`](Self::connect_pool).
#[derive(Debug, Clone)]
pub enum DbConnector {
    #[cfg(feature = "postgres")]
    Postgres(PgManager),
    #[cfg(feature = "sqlite")]
    Sqlite(SqliteManager),
}

impl DbConnector {
    /// Build a pool with the given sizing and check out one connection to prove the database
    /// is reachable.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` if the pool cannot establish a connection.
    pub async fn connect_pool(self, options: &PoolOptions) -> Result<DbPool, DbError> {
        let pool = match self {
            #[cfg(feature = "postgres")]
            DbConnector::Postgres(manager) => DbPool::Postgres(build(manager, options).await?),
            #[cfg(feature = "sqlite")]
            DbConnector::Sqlite(manager) => {
                let mut options = *options;
                if manager.requires_single_connection() {
                    options = PoolOptions {
                        max_size: 1,
                        idle_timeout: None,
                        max_lifetime: None,
                        ..options
                    };
                }
                DbPool::Sqlite(build(manager, &options).await?)
            }
        };
        drop(pool.get().await?);
        Ok(pool)
    }
}

async fn build<M>(manager: M, options: &PoolOptions) -> Result<Pool<M>, DbError>
where
    M: ManageConnection,
{
    Pool::builder()
        .max_size(options.max_size)
        .idle_timeout(options.idle_timeout)
        .max_lifetime(options.max_lifetime)
        .connection_timeout(options.connection_timeout)
        .build(manager)
        .await
        .map_err(|e| DbError::ConnectionError(format!("configure pool: {e:?}")))
}

/// Connection pool for the active provider.
#[derive(Clone)]
pub enum DbPool {
    #[cfg(feature = "postgres")]
    Postgres(Pool<PgManager>),
    #[cfg(feature = "sqlite")]
    Sqlite(Pool<SqliteManager>),
}

impl std::fmt::Debug for DbPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("DbPool")
            .field("connections", &state.0)
            .field("idle", &state.1)
            .finish()
    }
}

impl DbPool {
    /// Check out a connection.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` if no connection becomes available in time.
    pub async fn get(&self) -> Result<DbConnection, DbError> {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => pool
                .get_owned()
                .await
                .map(DbConnection::Postgres)
                .map_err(|e| DbError::ConnectionError(format!("postgres checkout error: {e}"))),
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => pool
                .get_owned()
                .await
                .map(DbConnection::Sqlite)
                .map_err(|e| DbError::ConnectionError(format!("sqlite checkout error: {e}"))),
        }
    }

    /// `(open connections, idle connections)`.
    #[must_use]
    pub fn state(&self) -> (u32, u32) {
        match self {
            #[cfg(feature = "postgres")]
            DbPool::Postgres(pool) => {
                let s = pool.state();
                (s.connections, s.idle_connections)
            }
            #[cfg(feature = "sqlite")]
            DbPool::Sqlite(pool) => {
                let s = pool.state();
                (s.connections, s.idle_connections)
            }
        }
    }
}
