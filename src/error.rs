use thiserror::Error;

use crate::db::DbState;

/// Every failure the crate can report.
///
/// Startup failures (`ConfigInvalid`, `ConnectionError`, `MigrationDriverError`,
/// `MigrationDirty`, `MigrationFailed`) are fatal to [`Database::init`](crate::Database::init).
/// Runtime failures (`QueryError`, `ConflictError`, `Cancelled`) are returned to the individual
/// caller and leave the database usable.
#[derive(Debug, Error)]
pub enum DbError {
    #[error("invalid database configuration: {0}")]
    ConfigInvalid(String),

    #[error("database connection error: {0}")]
    ConnectionError(String),

    #[error("migration driver error: {0}")]
    MigrationDriverError(String),

    #[error("database schema is dirty at migration version {version}; fix it manually before starting")]
    MigrationDirty { version: u64 },

    #[error("migration failed: {0}")]
    MigrationFailed(String),

    #[error("database has already been initialized")]
    AlreadyInitialized,

    #[error("database is not ready (state: {0:?})")]
    NotReady(DbState),

    #[error("provider '{provider}' does not support advisory locking")]
    LockingUnsupported { provider: String },

    #[error("query error: {0}")]
    QueryError(String),

    #[error("conflict: {0}")]
    ConflictError(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),
}

impl DbError {
    /// True when the error is a uniqueness violation.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, DbError::ConflictError(_))
    }

    /// True for the failures that can only happen while the database is being initialized.
    #[must_use]
    pub fn is_startup(&self) -> bool {
        matches!(
            self,
            DbError::ConfigInvalid(_)
                | DbError::ConnectionError(_)
                | DbError::MigrationDriverError(_)
                | DbError::MigrationDirty { .. }
                | DbError::MigrationFailed(_)
                | DbError::AlreadyInitialized
        )
    }
}

#[cfg(feature = "postgres")]
impl From<tokio_postgres::Error> for DbError {
    fn from(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&tokio_postgres::error::SqlState::UNIQUE_VIOLATION) {
            DbError::ConflictError(err.to_string())
        } else {
            DbError::QueryError(err.to_string())
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(ref failure, _) = err
            && (failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || failure.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY)
        {
            return DbError::ConflictError(err.to_string());
        }
        DbError::QueryError(err.to_string())
    }
}
