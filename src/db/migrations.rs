use std::path::Path;

use crate::error::DbError;
use crate::migrate::{MigrateOutcome, MigrationSource, Migrator};
use crate::pool::DbPool;
use crate::provider::Provider;

/// Apply pending migrations from `root/<provider.migrations_dir()>` on a dedicated connection.
///
/// An up-to-date schema yields `MigrateOutcome::NoChange`, which is a success.
///
/// # Errors
/// - `DbError::MigrationDirty` if a previous run failed part-way
/// - `DbError::MigrationFailed` if the source cannot be read or a migration fails
/// - `DbError::MigrationDriverError` if the driver cannot be created or its bookkeeping fails
pub async fn run_migrations(
    provider: &dyn Provider,
    pool: &DbPool,
    root: &Path,
) -> Result<MigrateOutcome, DbError> {
    let dir = root.join(provider.migrations_dir());
    tracing::info!(db = provider.name(), dir = %dir.display(), "running migrations");

    let source = MigrationSource::from_dir(&dir)?;
    let conn = pool
        .get()
        .await
        .map_err(|e| DbError::MigrationDriverError(format!("acquire connection: {e}")))?;
    let driver = provider.migration_driver(conn)?;

    let outcome = Migrator::new(source, driver).up().await?;
    match outcome {
        MigrateOutcome::NoChange => {
            tracing::info!(db = provider.name(), "migrations up to date");
        }
        MigrateOutcome::Applied { from, to } => {
            tracing::info!(db = provider.name(), from = ?from, to, "migrations applied");
        }
    }
    Ok(outcome)
}
