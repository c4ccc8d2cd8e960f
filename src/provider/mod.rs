// Provider module - the per-dialect capability set
//
// A provider knows how to open its dialect, which capability descriptor applies, how to
// build a migration driver, and how to adjust inserts. Everything else in the crate is
// dialect-agnostic and consults the provider instead of branching on the backend.

#[cfg(feature = "postgres")]
mod postgres;
#[cfg(feature = "sqlite")]
mod sqlite;

#[cfg(feature = "postgres")]
pub use postgres::PostgresProvider;
#[cfg(feature = "sqlite")]
pub use sqlite::SqliteProvider;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::DbError;
use crate::features::Features;
use crate::migrate::MigrationDriver;
use crate::pool::{DbConnection, DbConnector};
use crate::statement::InsertBuilder;

/// Column every table uses for its generated, monotonically increasing key.
pub const DEFAULT_SEQUENCE_COLUMN: &str = "seq";

/// Dialect adapter consulted by [`Database`](crate::Database).
///
/// A provider is constructed once, then shared read-only for the life of the database.
pub trait Provider: Send + Sync + 'static {
    /// Stable dialect identifier, also used in logs.
    fn name(&self) -> &str;

    /// Generated-key column read back after inserts.
    fn sequence_column(&self) -> &str {
        DEFAULT_SEQUENCE_COLUMN
    }

    /// Sub-directory of the configured migrations root holding this dialect's files.
    fn migrations_dir(&self) -> &str {
        self.name()
    }

    /// The capability descriptor, built once at construction.
    fn features(&self) -> &Features;

    /// Parse `url` into a connector for this dialect. No connection is made yet.
    ///
    /// # Errors
    /// Returns `DbError::ConnectionError` when the URL is not usable by this dialect.
    fn open(&self, url: &str) -> Result<DbConnector, DbError>;

    /// Wrap a dedicated connection in a migration driver.
    ///
    /// # Errors
    /// Returns `DbError::MigrationDriverError` if the connection cannot be used for
    /// migrations.
    fn migration_driver(&self, conn: DbConnection) -> Result<Box<dyn MigrationDriver>, DbError>;

    /// Adjust an insert before execution.
    ///
    /// Returns the (possibly modified) builder and whether the dialect applied its own
    /// return-on-insert and conflict handling. When `false`, the database reads the generated
    /// key with [`Features::last_sequence_query`] and reports conflicts as errors.
    fn customize_insert(
        &self,
        insert: InsertBuilder,
        want_empty_on_conflict: bool,
    ) -> (InsertBuilder, bool) {
        let _ = want_empty_on_conflict;
        (insert, false)
    }
}

impl std::fmt::Debug for dyn Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name())
            .field("features", self.features())
            .finish()
    }
}

/// Name-keyed set of providers, used to pick one from configuration.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn Provider>>,
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .finish()
    }
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every provider compiled into this build.
    #[must_use]
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "postgres")]
        registry.register(Arc::new(PostgresProvider::new()));
        #[cfg(feature = "sqlite")]
        registry.register(Arc::new(SqliteProvider::new()));
        registry
    }

    /// Add a provider under its own name, replacing any previous one with that name.
    pub fn register(&mut self, provider: Arc<dyn Provider>) -> &mut Self {
        self.providers.insert(provider.name().to_string(), provider);
        self
    }

    /// # Errors
    /// Returns `DbError::ConfigInvalid` for an unknown name.
    pub fn get(&self, name: &str) -> Result<Arc<dyn Provider>, DbError> {
        self.providers.get(name).cloned().ok_or_else(|| {
            DbError::ConfigInvalid(format!(
                "unknown database provider '{name}' (available: {})",
                self.names().join(", ")
            ))
        })
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
