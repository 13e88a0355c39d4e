//! Row container keyed by column name.

use std::collections::BTreeMap;

use serde::Serialize;

use super::value::SqlValue;

/// One fetched row: column name to value.
///
/// Columns are stored sorted so iteration order never depends on how the
/// driver laid the row out.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, SqlValue>);

/// Rows for one table on one side, in fetch order.
pub type RowSet = Vec<Row>;

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<SqlValue>) -> Self {
        self.0.insert(column.into(), value.into());
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<SqlValue>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut SqlValue> {
        self.0.values_mut()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Build a row from a JSON object. Non-object input yields an empty row.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => map
                .into_iter()
                .map(|(k, v)| (k, SqlValue::from(v)))
                .collect(),
            _ => Row::new(),
        }
    }

    /// Copy of the row with byte values decoded to text.
    pub fn normalized(&self) -> Row {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.normalized()))
            .collect()
    }
}

impl FromIterator<(String, SqlValue)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, SqlValue)>>(iter: I) -> Self {
        Row(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, SqlValue>> for Row {
    fn from(map: BTreeMap<String, SqlValue>) -> Self {
        Row(map)
    }
}
