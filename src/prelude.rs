//! Convenient imports for common functionality.
//!
//! This module re-exports the types most applications need to configure a database, pick a
//! provider and build statements.

pub use crate::config::DbConfig;
pub use crate::context::Context;
pub use crate::db::{Database, DbState, InsertResult, Tx};
pub use crate::error::DbError;
pub use crate::features::Features;
pub use crate::provider::{Provider, ProviderRegistry};
pub use crate::results::{ResultSet, Row};
pub use crate::statement::{
    DeleteBuilder, Filter, InsertBuilder, Order, PlaceholderStyle, SelectBuilder, Statement,
    UpdateBuilder,
};
pub use crate::types::SqlValue;

#[cfg(feature = "postgres")]
pub use crate::provider::PostgresProvider;
#[cfg(feature = "sqlite")]
pub use crate::provider::SqliteProvider;
