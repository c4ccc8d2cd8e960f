use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use crate::error::DbError;

static UP_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)_([^.]+)\.up\.sql$").expect("static pattern compiles"));

/// One forward migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: u64,
    pub name: String,
    pub sql: String,
}

/// Ordered set of migrations read from one directory.
#[derive(Debug, Clone, Default)]
pub struct MigrationSource {
    dir: PathBuf,
    migrations: BTreeMap<u64, Migration>,
}

impl MigrationSource {
    /// Read every `<version>_<title>.up.sql` file in `dir`.
    ///
    /// `.down.sql` files and anything else that does not match the pattern are ignored.
    ///
    /// # Errors
    /// Returns `DbError::MigrationFailed` if the directory or a file cannot be read, or two
    /// files share a version.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, DbError> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir).map_err(|e| {
            DbError::MigrationFailed(format!(
                "read migrations directory {}: {e}",
                dir.display()
            ))
        })?;

        let mut migrations = BTreeMap::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                DbError::MigrationFailed(format!("read migrations directory {}: {e}", dir.display()))
            })?;
            let file_name = entry.file_name();
            let Some(file_name) = file_name.to_str() else {
                continue;
            };
            let Some(caps) = UP_FILE.captures(file_name) else {
                tracing::trace!(file = file_name, "skipping non-migration file");
                continue;
            };
            let version: u64 = caps[1].parse().map_err(|e| {
                DbError::MigrationFailed(format!("bad migration version in {file_name}: {e}"))
            })?;
            let sql = std::fs::read_to_string(entry.path()).map_err(|e| {
                DbError::MigrationFailed(format!("read migration {file_name}: {e}"))
            })?;
            let migration = Migration {
                version,
                name: caps[2].to_string(),
                sql,
            };
            if let Some(existing) = migrations.insert(version, migration) {
                return Err(DbError::MigrationFailed(format!(
                    "duplicate migration version {version} ({}_{} and {file_name})",
                    existing.version, existing.name
                )));
            }
        }

        Ok(Self {
            dir: dir.to_path_buf(),
            migrations,
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn contains(&self, version: u64) -> bool {
        self.migrations.contains_key(&version)
    }

    #[must_use]
    pub fn latest(&self) -> Option<u64> {
        self.migrations.keys().next_back().copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// Migrations newer than `applied`, in version order. `None` means nothing is applied.
    pub fn pending(&self, applied: Option<u64>) -> impl Iterator<Item = &Migration> {
        self.migrations
            .values()
            .filter(move |m| applied.is_none_or(|v| m.version > v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, sql: &str) {
        std::fs::write(dir.join(name), sql).unwrap();
    }

    #[test]
    fn loads_up_files_in_version_order() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "0002_add_owner.up.sql", "ALTER TABLE t ADD COLUMN owner TEXT;");
        write(tmp.path(), "0001_create.up.sql", "CREATE TABLE t (seq INTEGER);");
        write(tmp.path(), "0001_create.down.sql", "DROP TABLE t;");
        write(tmp.path(), "README.md", "notes");

        let source = MigrationSource::from_dir(tmp.path()).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.latest(), Some(2));
        let names: Vec<&str> = source.pending(None).map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["create", "add_owner"]);
        let after_first: Vec<u64> = source.pending(Some(1)).map(|m| m.version).collect();
        assert_eq!(after_first, [2]);
    }

    #[test]
    fn duplicate_versions_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "1_a.up.sql", "SELECT 1;");
        write(tmp.path(), "0001_b.up.sql", "SELECT 1;");
        let err = MigrationSource::from_dir(tmp.path()).unwrap_err();
        assert!(matches!(err, DbError::MigrationFailed(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn missing_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let err = MigrationSource::from_dir(tmp.path().join("nope")).unwrap_err();
        assert!(matches!(err, DbError::MigrationFailed(_)));
    }
}
