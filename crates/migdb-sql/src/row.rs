//! Result rows.

use std::sync::Arc;

use sqlx::any::AnyRow;
use sqlx::{Column, Row as _};

use crate::value::SqlValue;

/// One result row with its column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Creates a row from column names and values.
    #[must_use]
    pub fn new(columns: Arc<[String]>, values: Vec<SqlValue>) -> Self {
        Self { columns, values }
    }

    /// Decodes a driver row.
    pub(crate) fn from_any(row: &AnyRow) -> Result<Self, sqlx::Error> {
        let columns: Arc<[String]> = row
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let values = (0..columns.len())
            .map(|i| decode_column(row, i))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { columns, values })
    }

    /// Returns the column names.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub(crate) fn shared_columns(&self) -> Arc<[String]> {
        Arc::clone(&self.columns)
    }

    /// Returns the values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Returns the value of the named column.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Returns the value at a column index.
    #[must_use]
    pub fn get_index(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Returns the named column as an integer.
    #[must_use]
    pub fn get_i64(&self, column: &str) -> Option<i64> {
        self.get(column).and_then(SqlValue::as_i64)
    }

    /// Returns the named column as text.
    #[must_use]
    pub fn get_str(&self, column: &str) -> Option<&str> {
        self.get(column).and_then(SqlValue::as_str)
    }
}

/// Decodes one column by trying the types the `Any` driver can carry.
fn decode_column(row: &AnyRow, index: usize) -> Result<SqlValue, sqlx::Error> {
    if let Ok(v) = row.try_get::<Option<i64>, _>(index) {
        return Ok(v.map_or(SqlValue::Null, SqlValue::Int));
    }
    if let Ok(v) = row.try_get::<f64, _>(index) {
        return Ok(SqlValue::Float(v));
    }
    if let Ok(v) = row.try_get::<bool, _>(index) {
        return Ok(SqlValue::Bool(v));
    }
    if let Ok(v) = row.try_get::<String, _>(index) {
        return Ok(SqlValue::Text(v));
    }
    row.try_get::<Vec<u8>, _>(index).map(SqlValue::Blob)
}

/// The outcome of executing one or more statements.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Returned rows, in order.
    pub rows: Vec<Row>,
    /// Column names of the result, taken from the first statement that
    /// described any. Later chunks of a bulk statement never replace it.
    pub columns: Option<Arc<[String]>>,
    /// Rows affected, totalled over every statement executed.
    pub rows_affected: u64,
    /// Number of statements sent to the database.
    pub statements: usize,
}

impl RowSet {
    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true when no rows were returned.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the first row.
    #[must_use]
    pub fn first(&self) -> Option<&Row> {
        self.rows.first()
    }

    /// Appends another result, keeping row order.
    pub fn extend(&mut self, other: Self) {
        if self.columns.is_none() {
            self.columns = other.columns;
        }
        self.rows.extend(other.rows);
        self.rows_affected += other.rows_affected;
        self.statements += other.statements;
    }
}

impl IntoIterator for RowSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(values: Vec<SqlValue>) -> Row {
        Row::new(Arc::from(vec!["id".to_string(), "name".to_string()]), values)
    }

    #[test]
    fn test_row_accessors() {
        let r = row(vec![SqlValue::Int(1), SqlValue::Text("a".into())]);
        assert_eq!(r.get_i64("id"), Some(1));
        assert_eq!(r.get_str("name"), Some("a"));
        assert_eq!(r.get("missing"), None);
        assert_eq!(r.get_index(1), Some(&SqlValue::Text("a".into())));
        assert_eq!(r.columns(), ["id", "name"]);
    }

    #[test]
    fn test_row_set_extend() {
        let mut first = RowSet {
            rows: vec![row(vec![SqlValue::Int(1), SqlValue::Null])],
            columns: Some(Arc::from(vec!["id".to_string(), "name".to_string()])),
            rows_affected: 1,
            statements: 1,
        };
        first.extend(RowSet {
            rows: vec![row(vec![SqlValue::Int(2), SqlValue::Null])],
            columns: Some(Arc::from(vec!["other".to_string()])),
            rows_affected: 1,
            statements: 1,
        });
        assert_eq!(first.columns.as_deref(), Some(&["id".to_string(), "name".to_string()][..]));
        assert_eq!(first.len(), 2);
        assert_eq!(first.rows_affected, 2);
        assert_eq!(first.statements, 2);
        let ids: Vec<i64> = first.into_iter().filter_map(|r| r.get_i64("id")).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
