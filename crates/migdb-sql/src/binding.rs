//! Named binding translation.
//!
//! Rewrites a template with named markers into a statement with numbered
//! positional placeholders plus the matching value list:
//!
//! ```rust
//! use migdb_sql::{Bindings, Dialect, SqlValue, translate};
//!
//! let bindings = Bindings::new().bind("name", "alice").bind("id", 7);
//! let (sql, values) = translate(
//!     "SELECT * FROM users WHERE id = :id OR (name = :name AND id > :id)",
//!     &bindings,
//!     Dialect::Postgres,
//! )
//! .unwrap();
//!
//! assert_eq!(sql, "SELECT * FROM users WHERE id = $1 OR (name = $2 AND id > $1)");
//! assert_eq!(values, vec![SqlValue::Int(7), SqlValue::Text("alice".into())]);
//! ```

use std::collections::HashMap;

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::template::{self, Segment};
use crate::value::{SqlValue, ToSqlValue};

/// Named parameter values for one statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bindings {
    values: HashMap<String, SqlValue>,
}

impl Bindings {
    /// Creates an empty binding map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a binding, replacing any previous value under the same name.
    #[must_use]
    pub fn bind(mut self, name: impl Into<String>, value: impl ToSqlValue) -> Self {
        self.insert(name, value);
        self
    }

    /// Adds a binding in place.
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToSqlValue) {
        self.values.insert(name.into(), value.to_sql_value());
    }

    /// Looks up a binding by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&SqlValue> {
        self.values.get(name)
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns true when there are no bindings.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<K: Into<String>, V: ToSqlValue> FromIterator<(K, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut bindings = Self::new();
        for (name, value) in iter {
            bindings.insert(name, value);
        }
        bindings
    }
}

/// Translates a named-marker template into a positional statement.
///
/// Each distinct marker name is assigned one placeholder on first appearance;
/// repeated names reuse it.
pub fn translate(
    template: &str,
    bindings: &Bindings,
    dialect: Dialect,
) -> Result<(String, Vec<SqlValue>)> {
    let segments = template::scan(template)?;

    let mut sql = String::with_capacity(template.len());
    let mut values = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();

    for segment in segments {
        match segment {
            Segment::Text(text) => sql.push_str(text),
            Segment::Marker { name, .. } => {
                let index = if let Some(&index) = positions.get(name) {
                    index
                } else {
                    let value = bindings.get(name).ok_or_else(|| Error::UnknownBinding {
                        name: name.to_string(),
                        statement: template.to_string(),
                    })?;
                    values.push(value.clone());
                    positions.insert(name, values.len());
                    values.len()
                };
                sql.push_str(&dialect.placeholder(index));
            }
        }
    }

    Ok((sql, values))
}
