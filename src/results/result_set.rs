use std::sync::Arc;

use serde::Serialize;

use super::record::Record;
use crate::types::Value;

/// A fully materialized query result.
///
/// Serializes as `{"results": [ {column: value, ...}, ... ]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResultSet {
    /// The records returned by the query, in cursor order
    pub results: Vec<Record>,
    /// Column names shared by all records (to avoid duplicating in each record)
    #[serde(skip)]
    column_names: Arc<Vec<String>>,
}

impl ResultSet {
    /// Create an empty result set with a known capacity
    #[must_use]
    pub fn with_capacity(column_names: Arc<Vec<String>>, capacity: usize) -> ResultSet {
        ResultSet {
            results: Vec::with_capacity(capacity),
            column_names,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Add a row of values, sharing this result set's column names.
    pub fn add_row_values(&mut self, values: Vec<Value>) {
        let record = Record::new(Arc::clone(&self.column_names), values);
        self.results.push(record);
    }

    pub fn push(&mut self, record: Record) {
        self.results.push(record);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Record> {
        self.results.iter()
    }
}

impl IntoIterator for ResultSet {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Record;
    type IntoIter = std::slice::Iter<'a, Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_under_results_key() {
        let mut rs = ResultSet::with_capacity(Arc::new(vec!["n".to_string()]), 2);
        rs.add_row_values(vec![Value::Number(1.0)]);
        rs.add_row_values(vec![Value::Null]);
        assert_eq!(rs.len(), 2);
        assert_eq!(
            serde_json::to_value(&rs).unwrap(),
            json!({"results": [{"n": 1.0}, {"n": null}]})
        );
    }
}
