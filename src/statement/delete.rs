use super::{Filter, SqlWriter, Statement};
use crate::features::Features;

/// Builder for `DELETE` statements.
#[derive(Debug, Clone, PartialEq)]
pub struct DeleteBuilder {
    table: String,
    filter: Option<Filter>,
}

impl DeleteBuilder {
    pub fn from(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    #[must_use]
    pub fn to_statement(&self, features: &Features) -> Statement {
        let mut w = SqlWriter::new(features.placeholder_style);
        w.push("DELETE FROM ");
        w.push(&self.table);
        if let Some(filter) = &self.filter {
            w.push(" WHERE ");
            filter.render(&mut w, features);
        }
        w.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_filtered_delete() {
        let stmt = DeleteBuilder::from("sessions")
            .filter(Filter::lt("expires", 1000_i64))
            .to_statement(&Features::baseline());
        assert_eq!(stmt.sql, "DELETE FROM sessions WHERE expires < ?1");
    }
}
