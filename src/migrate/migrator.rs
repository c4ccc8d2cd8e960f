use super::driver::{MigrationDriver, MigrationVersion};
use super::source::MigrationSource;
use crate::error::DbError;

/// What a migration run changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateOutcome {
    /// The schema was already at the latest version.
    NoChange,
    Applied { from: Option<u64>, to: u64 },
}

/// Applies pending migrations from a source through a driver.
pub struct Migrator {
    source: MigrationSource,
    driver: Box<dyn MigrationDriver>,
}

impl std::fmt::Debug for Migrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Migrator")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl Migrator {
    #[must_use]
    pub fn new(source: MigrationSource, driver: Box<dyn MigrationDriver>) -> Self {
        Self { source, driver }
    }

    /// Apply every pending migration while holding the driver lock.
    ///
    /// Before each file the version is recorded dirty; it is cleaned only after the file ran,
    /// so a failure part-way leaves the database flagged for manual repair.
    ///
    /// # Errors
    /// - `DbError::MigrationDirty` if the recorded version is dirty
    /// - `DbError::MigrationFailed` if the recorded version is unknown to the source or a
    ///   migration fails
    /// - `DbError::MigrationDriverError` for lock or bookkeeping failures
    pub async fn up(&mut self) -> Result<MigrateOutcome, DbError> {
        self.driver.lock().await.map_err(driver_error)?;
        let result = self.apply_pending().await;
        let unlocked = self.driver.unlock().await;
        let outcome = result?;
        unlocked.map_err(driver_error)?;
        Ok(outcome)
    }

    async fn apply_pending(&mut self) -> Result<MigrateOutcome, DbError> {
        let from = match self.driver.version().await.map_err(driver_error)? {
            Some(MigrationVersion {
                version,
                dirty: true,
            }) => return Err(DbError::MigrationDirty { version }),
            Some(MigrationVersion { version, .. }) => {
                if !self.source.contains(version) {
                    return Err(DbError::MigrationFailed(format!(
                        "database is at version {version}, which is not in {}",
                        self.source.dir().display()
                    )));
                }
                Some(version)
            }
            None => None,
        };

        let pending: Vec<_> = self.source.pending(from).cloned().collect();
        let Some(last) = pending.last().map(|m| m.version) else {
            tracing::debug!(version = ?from, "schema is up to date");
            return Ok(MigrateOutcome::NoChange);
        };

        for migration in &pending {
            tracing::info!(
                version = migration.version,
                name = %migration.name,
                "applying migration"
            );
            self.driver
                .set_version(migration.version, true)
                .await
                .map_err(driver_error)?;
            self.driver.run(&migration.sql).await.map_err(|e| {
                tracing::error!(version = migration.version, error = %e, "migration failed");
                DbError::MigrationFailed(format!(
                    "{}_{}: {e}",
                    migration.version, migration.name
                ))
            })?;
            self.driver
                .set_version(migration.version, false)
                .await
                .map_err(driver_error)?;
        }

        Ok(MigrateOutcome::Applied { from, to: last })
    }
}

fn driver_error(err: DbError) -> DbError {
    match err {
        DbError::MigrationDriverError(_) | DbError::MigrationDirty { .. } => err,
        other => DbError::MigrationDriverError(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use super::*;

    #[derive(Debug, Default)]
    struct Recorded {
        version: Option<MigrationVersion>,
        ran: Vec<String>,
        locked: bool,
        unlocks: usize,
    }

    /// In-memory driver that fails any SQL containing `FAIL`.
    #[derive(Clone, Default)]
    struct FakeDriver(Arc<Mutex<Recorded>>);

    #[async_trait]
    impl MigrationDriver for FakeDriver {
        async fn lock(&mut self) -> Result<(), DbError> {
            self.0.lock().unwrap().locked = true;
            Ok(())
        }

        async fn unlock(&mut self) -> Result<(), DbError> {
            let mut state = self.0.lock().unwrap();
            state.locked = false;
            state.unlocks += 1;
            Ok(())
        }

        async fn version(&mut self) -> Result<Option<MigrationVersion>, DbError> {
            Ok(self.0.lock().unwrap().version)
        }

        async fn set_version(&mut self, version: u64, dirty: bool) -> Result<(), DbError> {
            self.0.lock().unwrap().version = Some(MigrationVersion { version, dirty });
            Ok(())
        }

        async fn run(&mut self, sql: &str) -> Result<(), DbError> {
            if sql.contains("FAIL") {
                return Err(DbError::QueryError("syntax error".into()));
            }
            self.0.lock().unwrap().ran.push(sql.to_string());
            Ok(())
        }
    }

    fn source(dir: &Path, files: &[(&str, &str)]) -> MigrationSource {
        for (name, sql) in files {
            std::fs::write(dir.join(name), sql).unwrap();
        }
        MigrationSource::from_dir(dir).unwrap()
    }

    #[tokio::test]
    async fn applies_pending_then_reports_no_change() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(
            tmp.path(),
            &[("0001_a.up.sql", "CREATE A"), ("0002_b.up.sql", "CREATE B")],
        );
        let driver = FakeDriver::default();

        let mut migrator = Migrator::new(src.clone(), Box::new(driver.clone()));
        assert_eq!(
            migrator.up().await.unwrap(),
            MigrateOutcome::Applied { from: None, to: 2 }
        );
        let mut again = Migrator::new(src, Box::new(driver.clone()));
        assert_eq!(again.up().await.unwrap(), MigrateOutcome::NoChange);

        let state = driver.0.lock().unwrap();
        assert_eq!(state.ran, ["CREATE A", "CREATE B"]);
        assert_eq!(
            state.version,
            Some(MigrationVersion {
                version: 2,
                dirty: false
            })
        );
        assert!(!state.locked);
        assert_eq!(state.unlocks, 2);
    }

    #[tokio::test]
    async fn failure_leaves_version_dirty_and_unlocks() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(
            tmp.path(),
            &[("0001_a.up.sql", "CREATE A"), ("0002_b.up.sql", "FAIL")],
        );
        let driver = FakeDriver::default();

        let err = Migrator::new(src.clone(), Box::new(driver.clone()))
            .up()
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::MigrationFailed(ref m) if m.starts_with("2_b")));
        {
            let state = driver.0.lock().unwrap();
            assert_eq!(
                state.version,
                Some(MigrationVersion {
                    version: 2,
                    dirty: true
                })
            );
            assert!(!state.locked);
        }

        let err = Migrator::new(src, Box::new(driver)).up().await.unwrap_err();
        assert!(matches!(err, DbError::MigrationDirty { version: 2 }));
    }

    #[tokio::test]
    async fn unknown_database_version_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let src = source(tmp.path(), &[("0001_a.up.sql", "CREATE A")]);
        let driver = FakeDriver::default();
        driver.0.lock().unwrap().version = Some(MigrationVersion {
            version: 9,
            dirty: false,
        });

        let err = Migrator::new(src, Box::new(driver)).up().await.unwrap_err();
        assert!(matches!(err, DbError::MigrationFailed(ref m) if m.contains("version 9")));
    }
}
