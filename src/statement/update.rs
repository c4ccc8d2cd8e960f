use super::{Filter, SqlWriter, Statement};
use crate::error::DbError;
use crate::features::Features;
use crate::types::SqlValue;

/// Builder for `UPDATE` statements.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateBuilder {
    table: String,
    sets: Vec<(String, SqlValue)>,
    filter: Option<Filter>,
}

impl UpdateBuilder {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            sets: Vec::new(),
            filter: None,
        }
    }

    #[must_use]
    pub fn set(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.sets.push((column.into(), value.into()));
        self
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    /// Render the statement. An update without a filter touches every row; that is allowed.
    ///
    /// # Errors
    /// Returns `DbError::QueryError` when no column is set.
    pub fn to_statement(&self, features: &Features) -> Result<Statement, DbError> {
        if self.sets.is_empty() {
            return Err(DbError::QueryError(format!(
                "update of {} sets no columns",
                self.table
            )));
        }
        let mut w = SqlWriter::new(features.placeholder_style);
        w.push("UPDATE ");
        w.push(&self.table);
        w.push(" SET ");
        w.push_list(self.sets.iter(), |w, (col, value)| {
            w.push(col);
            w.push(" = ");
            w.push_param(value.clone());
        });
        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.render(&mut w, features);
        }
        Ok(w.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_params_precede_filter_params() {
        let stmt = UpdateBuilder::table("jobs")
            .set("state", "done")
            .set("attempts", 3_i64)
            .filter(Filter::eq("id", "j-1"))
            .to_statement(&Features::baseline())
            .unwrap();
        assert_eq!(stmt.sql, "UPDATE jobs SET state = ?1, attempts = ?2 WHERE id = ?3");
        assert_eq!(stmt.params[2], SqlValue::Text("j-1".into()));
    }

    #[test]
    fn empty_update_is_rejected() {
        assert!(UpdateBuilder::table("jobs").to_statement(&Features::baseline()).is_err());
    }
}
