// Database core - lifecycle state machine and the query surface
//
// - exec: statement execution shared by pooled helpers and transactions
// - group: transactional groups and advisory-lock scopes
// - migrations: the startup migration runner

mod exec;
mod group;
mod migrations;

pub use group::{BoxFuture, Tx};
pub use migrations::run_migrations;

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::DbConfig;
use crate::context::Context;
use crate::error::DbError;
use crate::features::Features;
use crate::pool::DbPool;
use crate::provider::Provider;
use crate::results::{ResultSet, Row};
use crate::statement::{DeleteBuilder, InsertBuilder, SelectBuilder, Statement, UpdateBuilder};

/// Lifecycle of a [`Database`].
///
/// `Uninitialized -> Opening -> [Migrating] -> Ready`, with `Failed` reachable from `Opening`
/// and `Migrating`, and `Closed` after [`Database::close`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DbState {
    Uninitialized = 0,
    Opening = 1,
    Migrating = 2,
    Ready = 3,
    Failed = 4,
    Closed = 5,
}

impl DbState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DbState::Uninitialized,
            1 => DbState::Opening,
            2 => DbState::Migrating,
            3 => DbState::Ready,
            5 => DbState::Closed,
            _ => DbState::Failed,
        }
    }
}

/// Outcome of an insert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertResult {
    /// `0` when a conflict-ignoring insert hit an existing key.
    pub rows_affected: u64,
    /// Generated sequence value of the last inserted row, when the dialect reports one.
    pub sequence: Option<i64>,
}

/// What a `Ready` database serves from. Published once, never replaced.
#[derive(Debug)]
pub(crate) struct ReadyState {
    provider: Arc<dyn Provider>,
    features: Features,
    pool: DbPool,
}

/// A provider-backed database: one provider, one pool, migrated once at startup.
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use dbsql::prelude::*;
///
/// # async fn demo() -> Result<(), DbError> {
/// let config = DbConfig::builder("sqlite://./data/app.db")
///     .max_connections(10)
///     .migrations("./db/migrations")
///     .finish();
/// let db = Database::new();
/// db.init(&Context::background(), Arc::new(SqliteProvider::new()), Some(&config))
///     .await?;
///
/// let inserted = db
///     .insert(
///         &Context::background(),
///         InsertBuilder::into("messages").columns(["topic"]).values(["orders"]),
///         false,
///     )
///     .await?;
/// println!("new seq = {:?}", inserted.sequence);
/// # Ok(())
/// # }
/// ```
pub struct Database {
    state: AtomicU8,
    ready: RwLock<Option<Arc<ReadyState>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(DbState::Uninitialized as u8),
            ready: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn state(&self) -> DbState {
        DbState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: DbState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Open the database through `provider`, build the pool, and apply migrations if
    /// configured. Only the first call on an instance can succeed.
    ///
    /// Opening and pool setup honour `ctx`; migrations, once started, run to completion.
    ///
    /// # Errors
    /// - `DbError::AlreadyInitialized` on any call after the first
    /// - `DbError::ConfigInvalid` when `config` is missing or invalid
    /// - `DbError::ConnectionError` when the provider cannot open the URL or the pool cannot
    ///   connect
    /// - `DbError::MigrationDirty`, `DbError::MigrationFailed` or
    ///   `DbError::MigrationDriverError` from the migration run
    /// - `DbError::Cancelled` when `ctx` ends before the pool is ready
    pub async fn init(
        &self,
        ctx: &Context,
        provider: Arc<dyn Provider>,
        config: Option<&DbConfig>,
    ) -> Result<(), DbError> {
        self.state
            .compare_exchange(
                DbState::Uninitialized as u8,
                DbState::Opening as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| DbError::AlreadyInitialized)?;

        let name = provider.name().to_string();
        match self.open(ctx, provider, config).await {
            Ok(ready) => {
                *self.ready.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(ready));
                self.set_state(DbState::Ready);
                tracing::info!(db = %name, "database ready");
                Ok(())
            }
            Err(e) => {
                self.set_state(DbState::Failed);
                tracing::error!(db = %name, error = %e, "database initialization failed");
                Err(e)
            }
        }
    }

    async fn open(
        &self,
        ctx: &Context,
        provider: Arc<dyn Provider>,
        config: Option<&DbConfig>,
    ) -> Result<ReadyState, DbError> {
        let config = config.ok_or_else(|| {
            DbError::ConfigInvalid("database configuration section is missing".to_string())
        })?;
        config.validate()?;
        let url = config.require_url()?;

        tracing::info!(db = provider.name(), "opening database");
        let connector = provider.open(url).map_err(|e| match e {
            DbError::ConnectionError(msg) => DbError::ConnectionError(format!("open: {msg}")),
            other => DbError::ConnectionError(format!("open: {other}")),
        })?;
        let pool = ctx
            .run(connector.connect_pool(&config.pool_options()))
            .await?;

        if config.migrations.auto {
            self.set_state(DbState::Migrating);
            run_migrations(provider.as_ref(), &pool, &config.migrations.directory).await?;
        }

        let features = *provider.features();
        Ok(ReadyState {
            provider,
            features,
            pool,
        })
    }

    fn ready(&self) -> Result<Arc<ReadyState>, DbError> {
        let state = self.state();
        if state != DbState::Ready {
            return Err(DbError::NotReady(state));
        }
        self.ready
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(DbError::NotReady(state))
    }

    /// The active provider.
    ///
    /// # Errors
    /// Returns `DbError::NotReady` unless the database is `Ready`.
    pub fn provider(&self) -> Result<Arc<dyn Provider>, DbError> {
        Ok(Arc::clone(&self.ready()?.provider))
    }

    /// The active capability descriptor.
    ///
    /// # Errors
    /// Returns `DbError::NotReady` unless the database is `Ready`.
    pub fn features(&self) -> Result<Features, DbError> {
        Ok(self.ready()?.features)
    }

    /// `(open connections, idle connections)` of the pool.
    ///
    /// # Errors
    /// Returns `DbError::NotReady` unless the database is `Ready`.
    pub fn pool_state(&self) -> Result<(u32, u32), DbError> {
        Ok(self.ready()?.pool.state())
    }

    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn select(&self, ctx: &Context, query: &SelectBuilder) -> Result<ResultSet, DbError> {
        let ready = self.ready()?;
        let stmt = query.to_statement(&ready.features);
        let mut conn = ctx.run(ready.pool.get()).await?;
        let cancel = conn.cancel_handle();
        ctx.run_interruptible(&cancel, conn.query(&stmt)).await
    }

    /// First row of `query`, or `None`.
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn select_one(
        &self,
        ctx: &Context,
        query: &SelectBuilder,
    ) -> Result<Option<Row>, DbError> {
        let ready = self.ready()?;
        let mut conn = ctx.run(ready.pool.get()).await?;
        let cancel = conn.cancel_handle();
        ctx.run_interruptible(&cancel, exec::select_one(&mut conn, &ready.features, query))
            .await
    }

    /// Number of rows matching `query`'s table and filter.
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn count(&self, ctx: &Context, query: &SelectBuilder) -> Result<i64, DbError> {
        let ready = self.ready()?;
        let mut conn = ctx.run(ready.pool.get()).await?;
        let cancel = conn.cancel_handle();
        ctx.run_interruptible(&cancel, exec::count(&mut conn, &ready.features, query))
            .await
    }

    /// Insert through the provider's insert hook.
    ///
    /// With `want_empty_on_conflict`, a provider that honours it turns a duplicate key into
    /// `rows_affected == 0`; otherwise duplicates are `DbError::ConflictError`. The generated
    /// sequence comes from `RETURNING` when the provider customizes inserts, or from the
    /// provider's last-sequence query on the same connection.
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, `DbError::ConflictError`, or the
    /// statement's error.
    pub async fn insert(
        &self,
        ctx: &Context,
        insert: InsertBuilder,
        want_empty_on_conflict: bool,
    ) -> Result<InsertResult, DbError> {
        let ready = self.ready()?;
        let mut conn = ctx.run(ready.pool.get()).await?;
        let cancel = conn.cancel_handle();
        let inserted = exec::insert(
            &mut conn,
            ready.provider.as_ref(),
            &ready.features,
            insert,
            want_empty_on_conflict,
        );
        ctx.run_interruptible(&cancel, inserted).await
    }

    /// Insert several rows. Uses one statement when the dialect supports multi-row inserts,
    /// otherwise one statement per row inside a single transaction.
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, `DbError::ConflictError`, or the
    /// statement's error. On the per-row path nothing is inserted when any row fails.
    pub async fn insert_many(
        &self,
        ctx: &Context,
        rows: InsertBuilder,
        want_empty_on_conflict: bool,
    ) -> Result<InsertResult, DbError> {
        let ready = self.ready()?;
        if ready.features.multi_row_insert || rows.row_count() <= 1 {
            return self.insert(ctx, rows, want_empty_on_conflict).await;
        }
        group::run_in_tx(ctx, ready, None, move |tx| {
            Box::pin(async move { tx.insert(rows, want_empty_on_conflict).await })
        })
        .await
    }

    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn update(&self, ctx: &Context, update: &UpdateBuilder) -> Result<u64, DbError> {
        let ready = self.ready()?;
        let stmt = update.to_statement(&ready.features)?;
        self.execute_on(ctx, &ready, &stmt).await
    }

    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn delete(&self, ctx: &Context, delete: &DeleteBuilder) -> Result<u64, DbError> {
        let ready = self.ready()?;
        let stmt = delete.to_statement(&ready.features);
        self.execute_on(ctx, &ready, &stmt).await
    }

    /// Run hand-written SQL. Placeholders must follow the provider's
    /// [`PlaceholderStyle`](crate::statement::PlaceholderStyle).
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn execute_raw(&self, ctx: &Context, stmt: &Statement) -> Result<u64, DbError> {
        let ready = self.ready()?;
        self.execute_on(ctx, &ready, stmt).await
    }

    /// Run hand-written SQL that returns rows.
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the statement's error.
    pub async fn query_raw(&self, ctx: &Context, stmt: &Statement) -> Result<ResultSet, DbError> {
        let ready = self.ready()?;
        let mut conn = ctx.run(ready.pool.get()).await?;
        let cancel = conn.cancel_handle();
        ctx.run_interruptible(&cancel, conn.query(stmt)).await
    }

    async fn execute_on(
        &self,
        ctx: &Context,
        ready: &ReadyState,
        stmt: &Statement,
    ) -> Result<u64, DbError> {
        let mut conn = ctx.run(ready.pool.get()).await?;
        let cancel = conn.cancel_handle();
        ctx.run_interruptible(&cancel, conn.execute(stmt)).await
    }

    /// Run `group` in one transaction: committed when it returns `Ok`, rolled back when it
    /// returns `Err` or is cancelled.
    ///
    /// ```rust,no_run
    /// # use dbsql::prelude::*;
    /// # async fn demo(db: &Database) -> Result<(), DbError> {
    /// db.run_as_group(&Context::background(), |tx| {
    ///     Box::pin(async move {
    ///         tx.insert(InsertBuilder::into("audit").columns(["msg"]).values(["a"]), false)
    ///             .await?;
    ///         tx.update(&UpdateBuilder::table("totals").set("n", 1_i64)).await?;
    ///         Ok(())
    ///     })
    /// })
    /// .await
    /// # }
    /// ```
    ///
    /// # Errors
    /// Returns `DbError::NotReady`, `DbError::Cancelled`, or the first error from `group` or
    /// the commit.
    pub async fn run_as_group<T, F>(&self, ctx: &Context, group: F) -> Result<T, DbError>
    where
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T, DbError>>,
    {
        let ready = self.ready()?;
        group::run_in_tx(ctx, ready, None, group).await
    }

    /// Like [`run_as_group`](Self::run_as_group), holding the provider's named advisory lock
    /// for the whole transaction. The lock is released at commit or rollback.
    ///
    /// # Errors
    /// Returns `DbError::LockingUnsupported` when the provider has no lock statement, before
    /// any connection is used; otherwise as `run_as_group`.
    pub async fn with_lock<T, F>(
        &self,
        ctx: &Context,
        lock_name: &str,
        group: F,
    ) -> Result<T, DbError>
    where
        F: for<'t> FnOnce(&'t mut Tx) -> BoxFuture<'t, Result<T, DbError>>,
    {
        let ready = self.ready()?;
        group::run_in_tx(ctx, ready, Some(lock_name), group).await
    }

    /// Release the pool. Pooled connections close once every in-flight checkout returns.
    pub fn close(&self) {
        let released = self
            .ready
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ready) = released {
            self.set_state(DbState::Closed);
            tracing::info!(db = ready.provider.name(), "database closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_atomic() {
        for state in [
            DbState::Uninitialized,
            DbState::Opening,
            DbState::Migrating,
            DbState::Ready,
            DbState::Failed,
            DbState::Closed,
        ] {
            assert_eq!(DbState::from_u8(state as u8), state);
        }
    }

    #[tokio::test]
    async fn helpers_require_ready() {
        let db = Database::new();
        let err = db
            .select(&Context::background(), &SelectBuilder::from("t"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::NotReady(DbState::Uninitialized)));
    }

    #[tokio::test]
    async fn missing_config_fails_before_connecting() {
        let db = Database::new();
        #[cfg(feature = "sqlite")]
        let provider: Arc<dyn Provider> = Arc::new(crate::provider::SqliteProvider::new());
        #[cfg(not(feature = "sqlite"))]
        let provider: Arc<dyn Provider> = Arc::new(crate::provider::PostgresProvider::new());

        let err = db
            .init(&Context::background(), provider, None)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConfigInvalid(_)));
        assert_eq!(db.state(), DbState::Failed);
    }
}
