use super::Provider;
use crate::error::DbError;
use crate::features::{Features, quote_literal};
use crate::migrate::{MIGRATIONS_TABLE, MigrationDriver, TableMigrationDriver};
use crate::pool::{DbConnection, DbConnector};
use crate::postgres::PgManager;
use crate::statement::{InsertBuilder, PlaceholderStyle};

/// Transaction-scoped advisory lock keyed by the hashed name.
fn pg_advisory_xact_lock(name: &str) -> String {
    format!("SELECT pg_advisory_xact_lock(hashtext({}))", quote_literal(name))
}

/// PostgreSQL: `ILIKE`, `$n` placeholders, advisory locks and `INSERT ... RETURNING`.
#[derive(Debug, Clone)]
pub struct PostgresProvider {
    features: Features,
}

impl PostgresProvider {
    #[must_use]
    pub fn new() -> Self {
        Self {
            features: Features {
                use_ilike: true,
                acquire_lock: Some(pg_advisory_xact_lock),
                placeholder_style: PlaceholderStyle::Postgres,
                last_sequence_query: Some("SELECT lastval()"),
                ..Features::baseline()
            },
        }
    }
}

impl Default for PostgresProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl Provider for PostgresProvider {
    fn name(&self) -> &str {
        "postgres"
    }

    fn features(&self) -> &Features {
        &self.features
    }

    fn open(&self, url: &str) -> Result<DbConnector, DbError> {
        PgManager::from_url(url).map(DbConnector::Postgres)
    }

    fn migration_driver(&self, conn: DbConnection) -> Result<Box<dyn MigrationDriver>, DbError> {
        if !matches!(conn, DbConnection::Postgres(_)) {
            return Err(DbError::MigrationDriverError(format!(
                "postgres provider given a non-postgres connection: {conn:?}"
            )));
        }
        // Session-level lock: it must outlive the per-migration transactions.
        let key = quote_literal(MIGRATIONS_TABLE);
        let driver = TableMigrationDriver::new(
            conn,
            format!("SELECT to_regclass({key}) IS NOT NULL AS present"),
        )
        .with_lock_statements(
            format!("SELECT pg_advisory_lock(hashtext({key}))"),
            format!("SELECT pg_advisory_unlock(hashtext({key}))"),
        );
        Ok(Box::new(driver))
    }

    fn customize_insert(
        &self,
        insert: InsertBuilder,
        want_empty_on_conflict: bool,
    ) -> (InsertBuilder, bool) {
        let insert = if want_empty_on_conflict {
            insert.on_conflict_do_nothing()
        } else {
            insert
        };
        (insert.returning(self.sequence_column()), true)
    }
}
