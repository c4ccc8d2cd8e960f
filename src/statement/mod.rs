// Statement builders - generic SQL construction shared by every provider
//
// - filter: predicate trees rendered with the provider's case-sensitivity rules
// - select / insert / update / delete: one builder per statement kind
//
// Builders only hold structure; rendering happens in `to_statement`, which takes the
// active provider's `Features` so placeholder syntax and LIKE handling follow the dialect.

mod delete;
mod filter;
mod insert;
mod select;
mod update;

pub use delete::DeleteBuilder;
pub use filter::Filter;
pub use insert::InsertBuilder;
pub use select::{Order, SelectBuilder};
pub use update::UpdateBuilder;

use std::fmt::Write;

use crate::types::SqlValue;

/// Positional placeholder syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// PostgreSQL-style placeholders like `$1`.
    Postgres,
    /// SQLite-style placeholders like `?1`.
    Sqlite,
}

/// Rendered SQL text plus its bound parameters, in placeholder order.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl Statement {
    /// A statement without parameters.
    #[must_use]
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Accumulates SQL text and numbers placeholders as parameters are pushed.
pub(crate) struct SqlWriter {
    sql: String,
    params: Vec<SqlValue>,
    style: PlaceholderStyle,
}

impl SqlWriter {
    pub(crate) fn new(style: PlaceholderStyle) -> Self {
        Self {
            sql: String::with_capacity(64),
            params: Vec::new(),
            style,
        }
    }

    pub(crate) fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    pub(crate) fn push_param(&mut self, value: SqlValue) {
        self.params.push(value);
        let n = self.params.len();
        let _ = match self.style {
            PlaceholderStyle::Postgres => write!(self.sql, "${n}"),
            PlaceholderStyle::Sqlite => write!(self.sql, "?{n}"),
        };
    }

    pub(crate) fn push_list<T>(
        &mut self,
        items: impl IntoIterator<Item = T>,
        mut each: impl FnMut(&mut Self, T),
    ) {
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(", ");
            }
            each(self, item);
        }
    }

    pub(crate) fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}
