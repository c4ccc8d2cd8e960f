use super::Provider;
use crate::error::DbError;
use crate::features::{Features, quote_literal};
use crate::migrate::{MIGRATIONS_TABLE, MigrationDriver, TableMigrationDriver};
use crate::pool::{DbConnection, DbConnector};
use crate::sqlite::SqliteManager;

/// SQLite: baseline capabilities, generated keys via `last_insert_rowid()`.
///
/// Inserts are left unchanged, so duplicate keys surface as `DbError::ConflictError` and the
/// generated key is read with a second statement on the same connection.
#[derive(Debug, Clone)]
pub struct SqliteProvider {
    features: Features,
}

impl SqliteProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            features: Features {
                last_sequence_query: Some("SELECT last_insert_rowid()"),
                ..Features::baseline()
            },
        }
    }
}

impl Default for SqliteProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for SqliteProvider {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn features(&self) -> &Features {
        &self.features
    }

    fn open(&self, url: &str) -> Result<DbConnector, DbError> {
        SqliteManager::from_url(url).map(DbConnector::Sqlite)
    }

    fn migration_driver(&self, conn: DbConnection) -> Result<Box<dyn MigrationDriver>, DbError> {
        if !matches!(conn, DbConnection::Sqlite(_)) {
            return Err(DbError::MigrationDriverError(format!(
                "sqlite provider given a non-sqlite connection: {conn:?}"
            )));
        }
        // Writers are serialized by the database file lock.
        let check = format!(
            "SELECT COUNT(*) AS present FROM sqlite_master WHERE type = 'table' AND name = {}",
            quote_literal(MIGRATIONS_TABLE)
        );
        Ok(Box::new(TableMigrationDriver::new(conn, check)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::InsertBuilder;

    #[test]
    fn unset_fields_match_baseline() {
        let f = *SqliteProvider::new().features();
        let b = Features::baseline();
        assert_eq!(f.use_ilike, b.use_ilike);
        assert_eq!(f.multi_row_insert, b.multi_row_insert);
        assert_eq!(f.placeholder_style, b.placeholder_style);
        assert!(f.acquire_lock.is_none());
    }

    #[test]
    fn locking_is_unsupported() {
        let err = SqliteProvider::new()
            .features()
            .lock_statement("sqlite", "tenant-42")
            .unwrap_err();
        assert!(matches!(err, DbError::LockingUnsupported { .. }));
    }

    #[test]
    fn inserts_are_not_customized() {
        let insert = InsertBuilder::into("t").columns(["k"]).values(["a"]);
        let (out, applied) = SqliteProvider::new().customize_insert(insert.clone(), true);
        assert!(!applied);
        assert!(!out.ignores_conflicts());
        assert_eq!(out, insert);
    }

    #[test]
    fn open_checks_the_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let ok = SqliteProvider::new().open(&format!("sqlite://{}", tmp.path().join("a.db").display()));
        assert!(ok.is_ok());
        let missing = tmp.path().join("nope").join("a.db");
        let err = SqliteProvider::new()
            .open(&format!("sqlite://{}", missing.display()))
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectionError(_)));
    }
}
