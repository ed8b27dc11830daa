use std::collections::HashMap;
use std::sync::Arc;

use crate::types::SqlValue;

/// A single result row with access by column name or index.
///
/// Column names are shared across every row of one result via `Arc`, with a
/// prebuilt name→index map so repeated by-name reads stay cheap.
#[derive(Debug, Clone)]
pub struct Row {
    column_names: Arc<Vec<String>>,
    values: Vec<SqlValue>,
    column_index: Arc<HashMap<String, usize>>,
}

impl Row {
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, values: Vec<SqlValue>) -> Self {
        let column_index = Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect::<HashMap<_, _>>(),
        );
        Self {
            column_names,
            values,
            column_index,
        }
    }

    pub(crate) fn with_index(
        column_names: Arc<Vec<String>>,
        column_index: Arc<HashMap<String, usize>>,
        values: Vec<SqlValue>,
    ) -> Self {
        Self {
            column_names,
            values,
            column_index,
        }
    }

    /// Build the shared name→index map for a column set.
    pub(crate) fn build_index(column_names: &[String]) -> Arc<HashMap<String, usize>> {
        Arc::new(
            column_names
                .iter()
                .enumerate()
                .map(|(i, name)| (name.clone(), i))
                .collect(),
        )
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    #[must_use]
    pub fn column_index(&self, column_name: &str) -> Option<usize> {
        if let Some(&idx) = self.column_index.get(column_name) {
            return Some(idx);
        }
        self.column_names.iter().position(|col| col == column_name)
    }

    /// Value by column name, or `None` when the column does not exist.
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&SqlValue> {
        self.column_index(column_name).and_then(|i| self.values.get(i))
    }

    /// Value by column position.
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_and_index_access_agree() {
        let row = Row::new(
            Arc::new(vec!["id".to_string(), "value".to_string()]),
            vec![SqlValue::Int(1), SqlValue::Int(123)],
        );
        assert_eq!(row.get("value"), row.get_by_index(1));
        assert_eq!(row.get("value"), Some(&SqlValue::Int(123)));
        assert_eq!(row.get("missing"), None);
        assert_eq!(row.get_by_index(5), None);
    }
}
