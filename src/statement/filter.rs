use super::SqlWriter;
use crate::features::Features;
use crate::types::SqlValue;

/// A predicate tree rendered into a `WHERE` clause.
///
/// Column names are emitted verbatim; only values become bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, SqlValue),
    NotEq(String, SqlValue),
    Lt(String, SqlValue),
    Lte(String, SqlValue),
    Gt(String, SqlValue),
    Gte(String, SqlValue),
    /// Case-sensitive `LIKE`.
    Like(String, String),
    /// Case-insensitive `LIKE`; rendered per [`Features::use_ilike`].
    ILike(String, String),
    In(String, Vec<SqlValue>),
    IsNull(String),
    IsNotNull(String),
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn neq(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::NotEq(column.into(), value.into())
    }

    pub fn lt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Lt(column.into(), value.into())
    }

    pub fn lte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Lte(column.into(), value.into())
    }

    pub fn gt(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Gt(column.into(), value.into())
    }

    pub fn gte(column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        Filter::Gte(column.into(), value.into())
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::Like(column.into(), pattern.into())
    }

    pub fn ilike(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Filter::ILike(column.into(), pattern.into())
    }

    pub fn is_in<V: Into<SqlValue>>(
        column: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        Filter::In(column.into(), values.into_iter().map(Into::into).collect())
    }

    #[must_use]
    pub fn and(self, other: Filter) -> Self {
        match self {
            Filter::And(mut items) => {
                items.push(other);
                Filter::And(items)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    #[must_use]
    pub fn or(self, other: Filter) -> Self {
        match self {
            Filter::Or(mut items) => {
                items.push(other);
                Filter::Or(items)
            }
            first => Filter::Or(vec![first, other]),
        }
    }

    #[must_use]
    pub fn negate(self) -> Self {
        Filter::Not(Box::new(self))
    }

    pub(crate) fn render(&self, w: &mut SqlWriter, features: &Features) {
        match self {
            Filter::Eq(col, v) => binary(w, col, "=", v),
            Filter::NotEq(col, v) => binary(w, col, "<>", v),
            Filter::Lt(col, v) => binary(w, col, "<", v),
            Filter::Lte(col, v) => binary(w, col, "<=", v),
            Filter::Gt(col, v) => binary(w, col, ">", v),
            Filter::Gte(col, v) => binary(w, col, ">=", v),
            Filter::Like(col, pattern) => {
                binary(w, col, "LIKE", &SqlValue::Text(pattern.clone()));
            }
            Filter::ILike(col, pattern) => {
                if features.use_ilike {
                    binary(w, col, "ILIKE", &SqlValue::Text(pattern.clone()));
                } else {
                    w.push("LOWER(");
                    w.push(col);
                    w.push(") LIKE LOWER(");
                    w.push_param(SqlValue::Text(pattern.clone()));
                    w.push(")");
                }
            }
            Filter::In(col, values) => {
                if values.is_empty() {
                    // `IN ()` is a syntax error in most dialects
                    w.push("1 = 0");
                    return;
                }
                w.push(col);
                w.push(" IN (");
                w.push_list(values.iter(), |w, v| w.push_param(v.clone()));
                w.push(")");
            }
            Filter::IsNull(col) => {
                w.push(col);
                w.push(" IS NULL");
            }
            Filter::IsNotNull(col) => {
                w.push(col);
                w.push(" IS NOT NULL");
            }
            Filter::And(items) => group(w, items, " AND ", "1 = 1", features),
            Filter::Or(items) => group(w, items, " OR ", "1 = 0", features),
            Filter::Not(inner) => {
                w.push("NOT (");
                inner.render(w, features);
                w.push(")");
            }
        }
    }
}

fn binary(w: &mut SqlWriter, col: &str, op: &str, value: &SqlValue) {
    // `= NULL` never matches; equality uses the IS forms. Ordering against NULL is bound
    // as-is and matches nothing, as in SQL.
    if value.is_null() && (op == "=" || op == "<>") {
        w.push(col);
        w.push(if op == "<>" { " IS NOT NULL" } else { " IS NULL" });
        return;
    }
    w.push(col);
    w.push(" ");
    w.push(op);
    w.push(" ");
    w.push_param(value.clone());
}

fn group(w: &mut SqlWriter, items: &[Filter], joiner: &str, empty: &str, features: &Features) {
    if items.is_empty() {
        w.push(empty);
        return;
    }
    w.push("(");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            w.push(joiner);
        }
        item.render(w, features);
    }
    w.push(")");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::PlaceholderStyle;

    fn render(filter: &Filter, features: &Features) -> (String, Vec<SqlValue>) {
        let mut w = SqlWriter::new(features.placeholder_style);
        filter.render(&mut w, features);
        let stmt = w.finish();
        (stmt.sql, stmt.params)
    }

    #[test]
    fn ilike_uses_operator_when_supported() {
        let features = Features {
            use_ilike: true,
            placeholder_style: PlaceholderStyle::Postgres,
            ..Features::baseline()
        };
        let (sql, params) = render(&Filter::ilike("name", "%bob%"), &features);
        assert_eq!(sql, "name ILIKE $1");
        assert_eq!(params, vec![SqlValue::Text("%bob%".into())]);
    }

    #[test]
    fn ilike_folds_case_without_operator() {
        let (sql, _) = render(&Filter::ilike("name", "%Bob%"), &Features::baseline());
        assert_eq!(sql, "LOWER(name) LIKE LOWER(?1)");
    }

    #[test]
    fn nested_groups_and_nulls() {
        let filter = Filter::eq("topic", "orders")
            .and(Filter::gt("seq", 10_i64).or(Filter::IsNull("seq".into())))
            .and(Filter::neq("owner", None::<String>));
        let (sql, params) = render(&filter, &Features::baseline());
        assert_eq!(
            sql,
            "(topic = ?1 AND (seq > ?2 OR seq IS NULL) AND owner IS NOT NULL)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn ordering_against_null_binds_the_null() {
        let (sql, params) = render(&Filter::lt("a", None::<i64>), &Features::baseline());
        assert_eq!(sql, "a < ?1");
        assert_eq!(params, vec![SqlValue::Null]);

        let (sql, _) = render(
            &Filter::gte("a", None::<i64>).or(Filter::eq("b", None::<i64>)),
            &Features::baseline(),
        );
        assert_eq!(sql, "(a >= ?1 OR b IS NULL)");
    }

    #[test]
    fn empty_in_never_matches() {
        let (sql, params) = render(&Filter::is_in("id", Vec::<i64>::new()), &Features::baseline());
        assert_eq!(sql, "1 = 0");
        assert!(params.is_empty());

        let (sql, _) = render(&Filter::is_in("id", [1_i64, 2, 3]), &Features::baseline());
        assert_eq!(sql, "id IN (?1, ?2, ?3)");
    }

    #[test]
    fn negation_wraps_inner() {
        let (sql, _) = render(&Filter::like("path", "/tmp/%").negate(), &Features::baseline());
        assert_eq!(sql, "NOT (path LIKE ?1)");
    }
}
