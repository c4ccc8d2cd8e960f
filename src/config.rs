//! Connection configuration section.
//!
//! The values are provider-agnostic: the same section shape selects pool sizing and
//! migration behaviour for every dialect. It is normally deserialized from the
//! application's configuration; [`DbConfigBuilder`] covers programmatic setup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DbError;

pub const DEFAULT_MAX_CONNECTIONS: u32 = 50;
pub const DEFAULT_MAX_IDLE_CONNECTIONS: u32 = 2;
pub const DEFAULT_MAX_IDLE_TIME_SECS: u64 = 60;
pub const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_MIGRATIONS_DIRECTORY: &str = "./db/migrations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Connection URL or DSN, interpreted by the selected provider.
    pub url: Option<String>,
    pub max_connections: u32,
    /// Upper bound on idle connections. The pool never opens connections ahead of demand, and
    /// `0` closes idle connections at the next reaper pass instead of after
    /// `max_idle_time_secs`.
    pub max_idle_connections: u32,
    /// Idle connections older than this are closed. `None` or `0` keeps them forever.
    pub max_idle_time_secs: Option<u64>,
    /// Connections older than this are recycled. `None` or `0` means no limit.
    pub max_lifetime_secs: Option<u64>,
    /// How long a checkout may wait for a connection.
    pub connection_timeout_secs: u64,
    pub migrations: MigrationsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationsConfig {
    /// Apply pending migrations during `init`.
    pub auto: bool,
    /// Root directory; the provider's `migrations_dir()` is joined onto it.
    pub directory: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: DEFAULT_MAX_CONNECTIONS,
            max_idle_connections: DEFAULT_MAX_IDLE_CONNECTIONS,
            max_idle_time_secs: Some(DEFAULT_MAX_IDLE_TIME_SECS),
            max_lifetime_secs: None,
            connection_timeout_secs: DEFAULT_CONNECTION_TIMEOUT_SECS,
            migrations: MigrationsConfig::default(),
        }
    }
}

impl Default for MigrationsConfig {
    fn default() -> Self {
        Self {
            auto: false,
            directory: PathBuf::from(DEFAULT_MIGRATIONS_DIRECTORY),
        }
    }
}

/// Pool sizing derived from a validated [`DbConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    pub max_size: u32,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub connection_timeout: Duration,
}

impl DbConfig {
    #[must_use]
    pub fn builder(url: impl Into<String>) -> DbConfigBuilder {
        DbConfigBuilder::new(url)
    }

    /// Parse a JSON configuration section. Missing keys take their defaults.
    ///
    /// # Errors
    /// Returns `DbError::ConfigInvalid` if the JSON is malformed.
    pub fn from_json(json: &str) -> Result<Self, DbError> {
        serde_json::from_str(json).map_err(|e| DbError::ConfigInvalid(e.to_string()))
    }

    /// The configured URL, rejecting missing or blank values.
    ///
    /// # Errors
    /// Returns `DbError::ConfigInvalid` if `url` is absent or blank.
    pub fn require_url(&self) -> Result<&str, DbError> {
        match self.url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => Ok(url),
            _ => Err(DbError::ConfigInvalid("url is required".to_string())),
        }
    }

    /// Check every value needed before a network call is attempted.
    ///
    /// # Errors
    /// Returns `DbError::ConfigInvalid` describing the first problem found.
    pub fn validate(&self) -> Result<(), DbError> {
        self.require_url()?;
        if self.max_connections == 0 {
            return Err(DbError::ConfigInvalid(
                "max_connections must be greater than zero".to_string(),
            ));
        }
        if self.connection_timeout_secs == 0 {
            return Err(DbError::ConfigInvalid(
                "connection_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.migrations.auto && self.migrations.directory.as_os_str().is_empty() {
            return Err(DbError::ConfigInvalid(
                "migrations.directory is required when migrations.auto is set".to_string(),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn pool_options(&self) -> PoolOptions {
        // bb8 only has an idle floor; the cap is kept by never pre-opening and by reaping
        let idle_timeout = if self.max_idle_connections == 0 {
            Some(Duration::from_secs(1))
        } else {
            non_zero_secs(self.max_idle_time_secs)
        };
        PoolOptions {
            max_size: self.max_connections.max(1),
            idle_timeout,
            max_lifetime: non_zero_secs(self.max_lifetime_secs),
            connection_timeout: Duration::from_secs(self.connection_timeout_secs.max(1)),
        }
    }
}

fn non_zero_secs(secs: Option<u64>) -> Option<Duration> {
    secs.filter(|s| *s > 0).map(Duration::from_secs)
}

/// Fluent builder for [`DbConfig`].
#[derive(Debug, Clone)]
pub struct DbConfigBuilder {
    config: DbConfig,
}

impl DbConfigBuilder {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            config: DbConfig {
                url: Some(url.into()),
                ..DbConfig::default()
            },
        }
    }

    #[must_use]
    pub fn max_connections(mut self, max: u32) -> Self {
        self.config.max_connections = max;
        self
    }

    #[must_use]
    pub fn max_idle_connections(mut self, max: u32) -> Self {
        self.config.max_idle_connections = max;
        self
    }

    #[must_use]
    pub fn max_idle_time(mut self, idle: Option<Duration>) -> Self {
        self.config.max_idle_time_secs = idle.map(|d| d.as_secs());
        self
    }

    #[must_use]
    pub fn max_lifetime(mut self, lifetime: Option<Duration>) -> Self {
        self.config.max_lifetime_secs = lifetime.map(|d| d.as_secs());
        self
    }

    #[must_use]
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.config.connection_timeout_secs = timeout.as_secs();
        self
    }

    /// Enable automatic migrations from `directory`.
    #[must_use]
    pub fn migrations(mut self, directory: impl Into<PathBuf>) -> Self {
        self.config.migrations = MigrationsConfig {
            auto: true,
            directory: directory.into(),
        };
        self
    }

    #[must_use]
    pub fn finish(self) -> DbConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_section_fills_defaults() {
        let cfg = DbConfig::from_json(r#"{"url": "postgres://u:p@localhost/db", "max_connections": 10}"#)
            .unwrap();
        assert_eq!(cfg.max_connections, 10);
        assert_eq!(cfg.max_idle_connections, DEFAULT_MAX_IDLE_CONNECTIONS);
        assert!(!cfg.migrations.auto);
        cfg.validate().unwrap();
    }

    #[test]
    fn missing_or_blank_url_is_invalid() {
        let err = DbConfig::default().validate().unwrap_err();
        assert!(matches!(err, DbError::ConfigInvalid(_)));
        let blank = DbConfig::builder("   ").finish();
        assert!(matches!(blank.validate(), Err(DbError::ConfigInvalid(_))));
    }

    #[test]
    fn zero_pool_size_is_invalid() {
        let cfg = DbConfig::builder("sqlite::memory:").max_connections(0).finish();
        assert!(matches!(cfg.validate(), Err(DbError::ConfigInvalid(_))));
    }

    #[test]
    fn pool_options_drop_zero_durations() {
        let cfg = DbConfig::builder("x")
            .max_connections(3)
            .max_idle_connections(8)
            .max_idle_time(Some(Duration::ZERO))
            .max_lifetime(Some(Duration::from_secs(300)))
            .finish();
        let opts = cfg.pool_options();
        assert_eq!(opts.max_size, 3);
        assert_eq!(opts.idle_timeout, None);
        assert_eq!(opts.max_lifetime, Some(Duration::from_secs(300)));
    }

    #[test]
    fn zero_idle_cap_reaps_idle_connections() {
        let keep = DbConfig::builder("x").max_idle_connections(5).finish();
        assert_eq!(
            keep.pool_options().idle_timeout,
            Some(Duration::from_secs(DEFAULT_MAX_IDLE_TIME_SECS))
        );
        let none = DbConfig::builder("x").max_idle_connections(0).finish();
        assert_eq!(none.pool_options().idle_timeout, Some(Duration::from_secs(1)));
    }

    #[test]
    fn malformed_json_is_config_invalid() {
        assert!(matches!(
            DbConfig::from_json("{not json"),
            Err(DbError::ConfigInvalid(_))
        ));
    }
}
