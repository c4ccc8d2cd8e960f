use async_trait::async_trait;

use crate::error::DbError;
use crate::pool::DbConnection;
use crate::statement::Statement;

/// Table holding the single `(version, dirty)` row.
pub const MIGRATIONS_TABLE: &str = "schema_migrations";

/// Schema version as recorded by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationVersion {
    pub version: u64,
    /// Set while a migration is running; left set if it failed.
    pub dirty: bool,
}

/// Dialect adapter used by the [`Migrator`](super::Migrator).
///
/// Implementations wrap one dedicated connection. Bookkeeping failures are reported as
/// `DbError::MigrationDriverError`.
#[async_trait]
pub trait MigrationDriver: Send {
    /// Take the cross-process migration lock.
    async fn lock(&mut self) -> Result<(), DbError>;

    async fn unlock(&mut self) -> Result<(), DbError>;

    /// The recorded version, or `None` if no migration was ever applied.
    async fn version(&mut self) -> Result<Option<MigrationVersion>, DbError>;

    async fn set_version(&mut self, version: u64, dirty: bool) -> Result<(), DbError>;

    /// Run the body of one migration file.
    async fn run(&mut self, sql: &str) -> Result<(), DbError>;
}

/// Driver that tracks the version in [`MIGRATIONS_TABLE`] on a pooled connection.
///
/// The lock statements are dialect SQL run verbatim; without them locking is a no-op, which
/// is correct for engines that serialize writers on their own.
///
/// The table is created when the lock is taken, never by [`version`](MigrationDriver::version),
/// so reading the status of a database leaves it untouched.
#[derive(Debug)]
pub struct TableMigrationDriver {
    conn: DbConnection,
    table_check_sql: String,
    lock_sql: Option<String>,
    unlock_sql: Option<String>,
    table_ready: bool,
}

impl TableMigrationDriver {
    /// `table_check_sql` must return one row whose `present` column is true when
    /// [`MIGRATIONS_TABLE`] exists.
    #[must_use]
    pub fn new(conn: DbConnection, table_check_sql: impl Into<String>) -> Self {
        Self {
            conn,
            table_check_sql: table_check_sql.into(),
            lock_sql: None,
            unlock_sql: None,
            table_ready: false,
        }
    }

    /// Use session-level lock/unlock statements around the migration run.
    #[must_use]
    pub fn with_lock_statements(mut self, lock: impl Into<String>, unlock: impl Into<String>) -> Self {
        self.lock_sql = Some(lock.into());
        self.unlock_sql = Some(unlock.into());
        self
    }

    async fn ensure_table(&mut self) -> Result<(), DbError> {
        if self.table_ready {
            return Ok(());
        }
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {MIGRATIONS_TABLE} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)"
        );
        self.conn
            .execute_batch(&ddl)
            .await
            .map_err(|e| bookkeeping("create version table", e))?;
        self.table_ready = true;
        Ok(())
    }

    async fn table_exists(&mut self) -> Result<bool, DbError> {
        if self.table_ready {
            return Ok(true);
        }
        let rs = self
            .conn
            .query(&Statement::raw(self.table_check_sql.clone()))
            .await
            .map_err(|e| bookkeeping("look up version table", e))?;
        let present = rs
            .first()
            .and_then(|row| row.get("present"))
            .and_then(crate::types::SqlValue::as_bool)
            .unwrap_or(false);
        self.table_ready = present;
        Ok(present)
    }
}

fn bookkeeping(action: &str, err: DbError) -> DbError {
    DbError::MigrationDriverError(format!("{action}: {err}"))
}

#[async_trait]
impl MigrationDriver for TableMigrationDriver {
    async fn lock(&mut self) -> Result<(), DbError> {
        if let Some(sql) = &self.lock_sql {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| bookkeeping("acquire migration lock", e))?;
        }
        self.ensure_table().await
    }

    async fn unlock(&mut self) -> Result<(), DbError> {
        if let Some(sql) = &self.unlock_sql {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| bookkeeping("release migration lock", e))?;
        }
        Ok(())
    }

    async fn version(&mut self) -> Result<Option<MigrationVersion>, DbError> {
        if !self.table_exists().await? {
            return Ok(None);
        }
        let rs = self
            .conn
            .query(&Statement::raw(format!(
                "SELECT version, dirty FROM {MIGRATIONS_TABLE} LIMIT 1"
            )))
            .await
            .map_err(|e| bookkeeping("read version", e))?;
        let Some(row) = rs.first() else {
            return Ok(None);
        };
        let version = row
            .get("version")
            .and_then(crate::types::SqlValue::as_int)
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| DbError::MigrationDriverError("unreadable version column".to_string()))?;
        let dirty = row
            .get("dirty")
            .and_then(crate::types::SqlValue::as_bool)
            .ok_or_else(|| DbError::MigrationDriverError("unreadable dirty column".to_string()))?;
        Ok(Some(MigrationVersion { version, dirty }))
    }

    async fn set_version(&mut self, version: u64, dirty: bool) -> Result<(), DbError> {
        self.ensure_table().await?;
        let dirty = if dirty { "TRUE" } else { "FALSE" };
        let sql = format!(
            "BEGIN; DELETE FROM {MIGRATIONS_TABLE}; INSERT INTO {MIGRATIONS_TABLE} (version, dirty) VALUES ({version}, {dirty}); COMMIT;"
        );
        if let Err(e) = self.conn.execute_batch(&sql).await {
            let _ = self.conn.execute_batch("ROLLBACK").await;
            return Err(bookkeeping("record version", e));
        }
        Ok(())
    }

    async fn run(&mut self, sql: &str) -> Result<(), DbError> {
        self.conn.execute_batch(sql).await
    }
}
