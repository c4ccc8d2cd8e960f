//! Capability descriptor: the declarative record of SQL dialect differences.
//!
//! Every provider starts from [`Features::baseline`] and overrides only the fields where its
//! dialect differs, using struct-update syntax:
//!
//! ```rust
//! use dbsql::prelude::*;
//!
//! let features = Features {
//!     use_ilike: true,
//!     ..Features::baseline()
//! };
//! assert!(features.multi_row_insert);
//! ```

use crate::error::DbError;
use crate::statement::PlaceholderStyle;

/// Builds the SQL that takes a named lock. The name is passed unescaped; the generator is
/// responsible for embedding it safely.
pub type LockStatementFn = fn(&str) -> String;

#[derive(Debug, Clone, Copy)]
pub struct Features {
    /// Use the dialect's `ILIKE` operator for case-insensitive matches instead of
    /// `LOWER(col) LIKE LOWER(?)`.
    pub use_ilike: bool,
    /// Generator for the advisory-lock statement. `None` means locking is unsupported.
    pub acquire_lock: Option<LockStatementFn>,
    /// Whether `INSERT ... VALUES (...), (...)` is accepted.
    pub multi_row_insert: bool,
    /// Positional placeholder syntax.
    pub placeholder_style: PlaceholderStyle,
    /// Query run on the inserting connection to read the last generated sequence value when
    /// the provider does not customize inserts.
    pub last_sequence_query: Option<&'static str>,
}

impl Features {
    /// Defaults shared by all providers.
    #[must_use]
    pub const fn baseline() -> Self {
        Self {
            use_ilike: false,
            acquire_lock: None,
            multi_row_insert: true,
            placeholder_style: PlaceholderStyle::Sqlite,
            last_sequence_query: None,
        }
    }

    /// Render the lock statement for `lock_name`.
    ///
    /// # Errors
    /// Returns `DbError::LockingUnsupported` when the provider has no lock generator.
    pub fn lock_statement(&self, provider: &str, lock_name: &str) -> Result<String, DbError> {
        match self.acquire_lock {
            Some(generate) => Ok(generate(lock_name)),
            None => Err(DbError::LockingUnsupported {
                provider: provider.to_string(),
            }),
        }
    }
}

impl Default for Features {
    fn default() -> Self {
        Self::baseline()
    }
}

/// Quote `value` as a standard SQL string literal, doubling embedded single quotes.
#[must_use]
pub fn quote_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}
