use super::{SqlWriter, Statement};
use crate::error::DbError;
use crate::features::Features;
use crate::types::SqlValue;

/// Builder for `INSERT` statements.
///
/// Providers adjust inserts through [`Provider::customize_insert`](crate::Provider::customize_insert)
/// using [`on_conflict_do_nothing`](Self::on_conflict_do_nothing),
/// [`returning`](Self::returning) and [`suffix`](Self::suffix). The flags stay observable so the
/// database core can tell which behaviour the provider actually applied.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertBuilder {
    table: String,
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
    conflict_do_nothing: bool,
    returning: Vec<String>,
    suffixes: Vec<String>,
}

impl InsertBuilder {
    pub fn into(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            conflict_do_nothing: false,
            returning: Vec::new(),
            suffixes: Vec::new(),
        }
    }

    #[must_use]
    pub fn columns<S: Into<String>>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Append one row of values, in column order.
    #[must_use]
    pub fn values<V: Into<SqlValue>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.rows.push(values.into_iter().map(Into::into).collect());
        self
    }

    /// Add `ON CONFLICT DO NOTHING`, turning uniqueness violations into zero-row inserts.
    #[must_use]
    pub fn on_conflict_do_nothing(mut self) -> Self {
        self.conflict_do_nothing = true;
        self
    }

    /// Add a `RETURNING` column.
    #[must_use]
    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning.push(column.into());
        self
    }

    /// Append raw SQL after everything else.
    #[must_use]
    pub fn suffix(mut self, sql: impl Into<String>) -> Self {
        self.suffixes.push(sql.into());
        self
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.columns
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn ignores_conflicts(&self) -> bool {
        self.conflict_do_nothing
    }

    #[must_use]
    pub fn has_returning(&self) -> bool {
        !self.returning.is_empty()
    }

    /// Split into one builder per row, keeping every clause.
    #[must_use]
    pub fn split_rows(self) -> Vec<InsertBuilder> {
        let template = InsertBuilder {
            rows: Vec::new(),
            ..self.clone()
        };
        self.rows
            .into_iter()
            .map(|row| InsertBuilder {
                rows: vec![row],
                ..template.clone()
            })
            .collect()
    }

    /// Render the statement.
    ///
    /// # Errors
    /// Returns `DbError::QueryError` when there are no rows, a row does not match the column
    /// count, or several rows are given to a dialect without multi-row insert support.
    pub fn to_statement(&self, features: &Features) -> Result<Statement, DbError> {
        if self.rows.is_empty() {
            return Err(DbError::QueryError(format!(
                "insert into {} has no values",
                self.table
            )));
        }
        if self.rows.len() > 1 && !features.multi_row_insert {
            return Err(DbError::QueryError(format!(
                "insert into {} has {} rows but multi-row insert is not supported",
                self.table,
                self.rows.len()
            )));
        }
        if let Some(bad) = self.rows.iter().find(|r| r.len() != self.columns.len()) {
            return Err(DbError::QueryError(format!(
                "insert into {}: {} columns but a row has {} values",
                self.table,
                self.columns.len(),
                bad.len()
            )));
        }

        let mut w = SqlWriter::new(features.placeholder_style);
        w.push("INSERT INTO ");
        w.push(&self.table);
        w.push(" (");
        w.push_list(self.columns.iter(), |w, c| w.push(c));
        w.push(") VALUES ");
        w.push_list(self.rows.iter(), |w, row| {
            w.push("(");
            w.push_list(row.iter(), |w, v| w.push_param(v.clone()));
            w.push(")");
        });
        if self.conflict_do_nothing {
            w.push(" ON CONFLICT DO NOTHING");
        }
        if !self.returning.is_empty() {
            w.push(" RETURNING ");
            w.push_list(self.returning.iter(), |w, c| w.push(c));
        }
        for suffix in &self.suffixes {
            w.push(" ");
            w.push(suffix.trim());
        }
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::PlaceholderStyle;

    fn pg() -> Features {
        Features {
            placeholder_style: PlaceholderStyle::Postgres,
            ..Features::baseline()
        }
    }

    #[test]
    fn renders_conflict_and_returning_clauses() {
        let insert = InsertBuilder::into("messages")
            .columns(["id", "topic"])
            .values([SqlValue::from("m1"), SqlValue::from("orders")])
            .on_conflict_do_nothing()
            .returning("seq");
        let stmt = insert.to_statement(&pg()).unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO messages (id, topic) VALUES ($1, $2) ON CONFLICT DO NOTHING RETURNING seq"
        );
        assert!(insert.ignores_conflicts());
        assert!(insert.has_returning());
    }

    #[test]
    fn multi_row_respects_feature() {
        let insert = InsertBuilder::into("t")
            .columns(["a"])
            .values([1_i64])
            .values([2_i64]);
        let stmt = insert.to_statement(&Features::baseline()).unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (a) VALUES (?1), (?2)");

        let single_row_only = Features {
            multi_row_insert: false,
            ..Features::baseline()
        };
        assert!(insert.to_statement(&single_row_only).is_err());

        let parts = insert.split_rows();
        assert_eq!(parts.len(), 2);
        assert_eq!(
            parts[1].to_statement(&single_row_only).unwrap().params,
            vec![SqlValue::Int(2)]
        );
    }

    #[test]
    fn mismatched_row_is_rejected() {
        let insert = InsertBuilder::into("t").columns(["a", "b"]).values([1_i64]);
        let err = insert.to_statement(&Features::baseline()).unwrap_err();
        assert!(err.to_string().contains("2 columns"));
        assert!(InsertBuilder::into("t").columns(["a"]).to_statement(&Features::baseline()).is_err());
    }

    #[test]
    fn suffix_is_appended_last() {
        let stmt = InsertBuilder::into("t")
            .columns(["a"])
            .values([1_i64])
            .suffix(" RETURNING seq")
            .to_statement(&Features::baseline())
            .unwrap();
        assert_eq!(stmt.sql, "INSERT INTO t (a) VALUES (?1) RETURNING seq");
    }
}
