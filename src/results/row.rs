use std::collections::HashMap;
use std::sync::Arc;

use crate::types::SqlValue;

/// A single row of a [`ResultSet`](super::ResultSet).
///
/// Column names and the name-to-index map are shared by every row of the same result set.
#[derive(Debug, Clone)]
pub struct Row {
    pub(crate) column_names: Arc<Vec<String>>,
    pub(crate) column_index: Arc<HashMap<String, usize>>,
    pub(crate) values: Vec<SqlValue>,
}

impl Row {
    /// Build a standalone row, mainly useful for tests.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let column_index = Arc::new(index_columns(&column_names));
        Self {
            column_names,
            column_index,
            values,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Get a value by column name. Falls back to a case-insensitive match because
    /// dialects disagree on how unquoted identifiers are folded.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        let idx = self.column_index.get(column_name).copied().or_else(|| {
            self.column_names
                .iter()
                .position(|col| col.eq_ignore_ascii_case(column_name))
        })?;
        self.values.get(idx)
    }

    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }
}

pub(crate) fn index_columns(column_names: &[String]) -> HashMap<String, usize> {
    column_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect()
}
