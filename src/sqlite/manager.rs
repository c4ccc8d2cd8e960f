use std::future::Future;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bb8::ManageConnection;
use rusqlite::Connection;

use crate::error::DbError;

/// A rusqlite connection shared between the pool and blocking worker tasks.
pub type SharedSqliteConnection = Arc<Mutex<Connection>>;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// bb8 manager for SQLite connections.
#[derive(Debug, Clone)]
pub struct SqliteManager {
    path: String,
}

impl SqliteManager {
    /// Accepts `sqlite://path`, `sqlite:path`, `file:` URIs, `:memory:` and plain paths.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` when the path is empty or its parent directory does
    /// not exist.
    pub fn from_url(url: &str) -> Result<Self, DbError> {
        let path = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url)
            .trim();
        if path.is_empty() {
            return Err(DbError::ConnectionError("empty sqlite path".to_string()));
        }
        let manager = Self {
            path: path.to_string(),
        };
        if !manager.is_memory() && !path.starts_with("file:") {
            let parent = Path::new(path).parent().filter(|p| !p.as_os_str().is_empty());
            if let Some(parent) = parent
                && !parent.is_dir()
            {
                return Err(DbError::ConnectionError(format!(
                    "sqlite directory {} does not exist",
                    parent.display()
                )));
            }
        }
        Ok(manager)
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.path == ":memory:" || self.path.contains("mode=memory") || self.path == "file::memory:"
    }

    /// A private in-memory database lives and dies with a single connection, so the pool must
    /// keep exactly one connection open for its whole lifetime.
    #[must_use]
    pub fn requires_single_connection(&self) -> bool {
        self.is_memory() && !self.path.contains("cache=shared")
    }
}

fn open(path: &str) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

impl ManageConnection for SqliteManager {
    type Connection = SharedSqliteConnection;
    type Error = rusqlite::Error;

    #[allow(clippy::manual_async_fn)]
    fn connect(&self) -> impl Future<Output = Result<Self::Connection, Self::Error>> + Send {
        let path = self.path.clone();
        async move {
            let conn = open(&path)?;
            tracing::debug!(path = %path, "sqlite connection opened");
            Ok(Arc::new(Mutex::new(conn)))
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn is_valid(
        &self,
        conn: &mut Self::Connection,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send {
        let conn = Arc::clone(conn);
        async move {
            let guard = conn.lock().unwrap_or_else(PoisonError::into_inner);
            guard.query_row("SELECT 1", [], |_| Ok(()))
        }
    }

    fn has_broken(&self, conn: &mut Self::Connection) -> bool {
        conn.is_poisoned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_forms_are_normalised() {
        assert_eq!(SqliteManager::from_url("sqlite://:memory:").unwrap().path(), ":memory:");
        assert_eq!(SqliteManager::from_url("sqlite::memory:").unwrap().path(), ":memory:");
        assert_eq!(
            SqliteManager::from_url("file:test?mode=memory&cache=shared").unwrap().path(),
            "file:test?mode=memory&cache=shared"
        );
        assert_eq!(SqliteManager::from_url("app.db").unwrap().path(), "app.db");
    }

    #[test]
    fn private_memory_needs_one_connection() {
        assert!(SqliteManager::from_url(":memory:").unwrap().requires_single_connection());
        assert!(
            !SqliteManager::from_url("file:x?mode=memory&cache=shared")
                .unwrap()
                .requires_single_connection()
        );
    }

    #[test]
    fn missing_directory_is_a_connection_error() {
        let err = SqliteManager::from_url("sqlite:///definitely/not/here/app.db").unwrap_err();
        assert!(matches!(err, DbError::ConnectionError(_)));
        assert!(matches!(
            SqliteManager::from_url("  "),
            Err(DbError::ConnectionError(_))
        ));
    }
}
