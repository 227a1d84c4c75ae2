use std::sync::Arc;

use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::types::Value;

/// One row of a query result.
///
/// Column names are shared by every record of a result set; the values follow the
/// cursor's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// The column names for this record (shared across all records in a result set)
    column_names: Arc<Vec<String>>,
    values: Vec<Value>,
}

impl Record {
    /// Create a record from shared column names and this row's values.
    ///
    /// Missing trailing values are filled with `Value::Null` so the record always has one
    /// value per column.
    #[must_use]
    pub fn new(column_names: Arc<Vec<String>>, mut values: Vec<Value>) -> Self {
        if values.len() < column_names.len() {
            values.resize(column_names.len(), Value::Null);
        }
        values.truncate(column_names.len());
        Self {
            column_names,
            values,
        }
    }

    #[must_use]
    pub fn column_names(&self) -> &[String] {
        &self.column_names
    }

    /// Index of a column by name. Later columns shadow earlier ones with the same name,
    /// as they would in a map.
    #[must_use]
    pub fn get_column_index(&self, column_name: &str) -> Option<usize> {
        self.column_names.iter().rposition(|col| col == column_name)
    }

    /// Get a value from the record by column name
    #[must_use]
    pub fn get(&self, column_name: &str) -> Option<&Value> {
        self.get_column_index(column_name)
            .and_then(|idx| self.values.get(idx))
    }

    /// Get a value from the record by column index
    #[must_use]
    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(cols: &[&str]) -> Arc<Vec<String>> {
        Arc::new(cols.iter().map(|c| (*c).to_string()).collect())
    }

    #[test]
    fn lookups_by_name_and_index() {
        let record = Record::new(
            names(&["id", "name"]),
            vec![Value::Number(1.0), Value::Text("a".into())],
        );
        assert_eq!(record.get("name"), Some(&Value::Text("a".into())));
        assert_eq!(record.get_by_index(0), Some(&Value::Number(1.0)));
        assert_eq!(record.get("missing"), None);
        let order: Vec<&str> = record.iter().map(|(name, _)| name).collect();
        assert_eq!(order, ["id", "name"]);
    }

    #[test]
    fn short_rows_are_padded_with_null() {
        let record = Record::new(names(&["a", "b"]), vec![Value::Number(1.0)]);
        assert_eq!(record.len(), 2);
        assert_eq!(record.get("b"), Some(&Value::Null));
    }

    #[test]
    fn serializes_as_ordered_map() {
        let record = Record::new(
            names(&["z", "a"]),
            vec![Value::Text("last".into()), Value::Null],
        );
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"z":"last","a":null}"#
        );
    }
}
