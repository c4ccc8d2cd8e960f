use std::fmt::Write;

use super::{Filter, SqlWriter, Statement};
use crate::features::Features;

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Order {
    pub column: String,
    pub descending: bool,
}

impl Order {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
        }
    }
}

/// Builder for `SELECT` statements.
///
/// ```rust
/// use dbsql::prelude::*;
///
/// let stmt = SelectBuilder::from("events")
///     .columns(["seq", "topic"])
///     .filter(Filter::gt("seq", 100_i64))
///     .order_by(Order::asc("seq"))
///     .limit(25)
///     .to_statement(&Features::baseline());
/// assert_eq!(
///     stmt.sql,
///     "SELECT seq, topic FROM events WHERE seq > ?1 ORDER BY seq ASC LIMIT 25"
/// );
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SelectBuilder {
    table: String,
    columns: Vec<String>,
    filter: Option<Filter>,
    order: Vec<Order>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl SelectBuilder {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            filter: None,
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Columns to return; `*` when never called.
    #[must_use]
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Set the filter, combining with `AND` if one is already present.
    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: Order) -> Self {
        self.order.push(order);
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// A `SELECT COUNT(*) AS total` over the same table and filter, ignoring order and paging.
    #[must_use]
    pub fn to_count(&self) -> SelectBuilder {
        SelectBuilder {
            table: self.table.clone(),
            columns: vec!["COUNT(*) AS total".to_string()],
            filter: self.filter.clone(),
            order: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    #[must_use]
    pub fn to_statement(&self, features: &Features) -> Statement {
        let mut w = SqlWriter::new(features.placeholder_style);
        w.push("SELECT ");
        if self.columns.is_empty() {
            w.push("*");
        } else {
            w.push_list(self.columns.iter(), |w, c| w.push(c));
        }
        w.push(" FROM ");
        w.push(&self.table);
        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.render(&mut w, features);
        }
        if !self.order.is_empty() {
            w.push(" ORDER BY ");
            w.push_list(self.order.iter(), |w, o| {
                w.push(&o.column);
                w.push(if o.descending { " DESC" } else { " ASC" });
            });
        }
        let mut tail = String::new();
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                let _ = write!(tail, " LIMIT {limit} OFFSET {offset}");
            }
            (Some(limit), None) => {
                let _ = write!(tail, " LIMIT {limit}");
            }
            // SQLite requires a LIMIT before OFFSET; -1 means unbounded there, and Postgres
            // accepts `LIMIT ALL`. Use a portable very large bound instead.
            (None, Some(offset)) => {
                let _ = write!(tail, " LIMIT {} OFFSET {offset}", i64::MAX);
            }
            (None, None) => {}
        }
        w.push(&tail);
        w.finish()
    }
}
