//! Bulk statement compilation.
//!
//! A bulk template carries exactly one `:VALUES` marker, which is replaced by
//! an inline `VALUES (...), (...)` clause built from a row set. Literal cells
//! become positional placeholders; sub-statement cells are inlined as
//! parenthesized SQL with their placeholders shifted to follow the values
//! flattened before them.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::substatement::SubStatement;
use crate::template::{self, Segment, BULK_MARKER};
use crate::value::{SqlValue, ToSqlValue};

/// One cell of a bulk row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// A value bound as a positional parameter.
    Literal(SqlValue),
    /// A sub-query inlined into the row.
    SubStatement(SubStatement),
}

impl Cell {
    /// Creates a literal cell.
    #[must_use]
    pub fn literal(value: impl ToSqlValue) -> Self {
        Self::Literal(value.to_sql_value())
    }
}

impl<T: ToSqlValue> From<T> for Cell {
    fn from(value: T) -> Self {
        Self::Literal(value.to_sql_value())
    }
}

impl From<SubStatement> for Cell {
    fn from(sub: SubStatement) -> Self {
        Self::SubStatement(sub)
    }
}

/// Builds a row from a list of cell-convertible expressions.
///
/// ```rust
/// use migdb_sql::{row, Cell, SubStatement};
///
/// let r = row![SubStatement::new("SELECT id FROM job WHERE name = $1").bind("Chef"), "Gordon", 42];
/// assert_eq!(r.len(), 3);
/// assert!(matches!(r[0], Cell::SubStatement(_)));
/// ```
#[macro_export]
macro_rules! row {
    ($($cell:expr),* $(,)?) => {
        vec![$($crate::Cell::from($cell)),*]
    };
}

/// A template split around its single bulk marker.
#[derive(Debug, Clone, Copy)]
pub struct BulkTemplate<'a> {
    head: &'a str,
    tail: &'a str,
}

impl<'a> BulkTemplate<'a> {
    /// Validates the template and locates its `:VALUES` marker.
    pub fn parse(template: &'a str) -> Result<Self> {
        let segments = template::scan(template)?;

        let mut marker = None;
        let mut count = 0;
        for segment in &segments {
            if let Segment::Marker { name, position } = *segment {
                if name != BULK_MARKER {
                    return Err(Error::UnknownBinding {
                        name: name.to_string(),
                        statement: template.to_string(),
                    });
                }
                count += 1;
                marker.get_or_insert(position);
            }
        }

        match (count, marker) {
            (1, Some(position)) => Ok(Self {
                head: &template[..position],
                tail: &template[position + 1 + BULK_MARKER.len()..],
            }),
            (0, _) | (_, None) => Err(Error::MissingBulkMarker {
                statement: template.to_string(),
            }),
            (count, _) => Err(Error::AmbiguousBulkMarker {
                count,
                statement: template.to_string(),
            }),
        }
    }

    /// Compiles the rows into one statement and its flattened values.
    pub fn compile(&self, rows: &[Vec<Cell>], dialect: Dialect) -> Result<(String, Vec<SqlValue>)> {
        let mut values: Vec<SqlValue> = Vec::new();
        let mut clause = String::from("VALUES ");

        for (i, row) in rows.iter().enumerate() {
            if i > 0 {
                clause.push_str(", ");
            }
            clause.push('(');
            for (j, cell) in row.iter().enumerate() {
                if j > 0 {
                    clause.push_str(", ");
                }
                match cell {
                    Cell::Literal(value) => {
                        values.push(value.clone());
                        clause.push_str(&dialect.placeholder(values.len()));
                    }
                    Cell::SubStatement(sub) => {
                        let (sql, sub_values) = sub.reindex(values.len(), dialect)?;
                        clause.push('(');
                        clause.push_str(&sql);
                        clause.push(')');
                        values.extend(sub_values);
                    }
                }
            }
            clause.push(')');
        }

        let mut sql = String::with_capacity(self.head.len() + clause.len() + self.tail.len());
        sql.push_str(self.head);
        sql.push_str(&clause);
        sql.push_str(self.tail);
        Ok((sql, values))
    }
}

/// Parses and compiles a bulk template in one step.
pub fn compile_bulk(
    template: &str,
    rows: &[Vec<Cell>],
    dialect: Dialect,
) -> Result<(String, Vec<SqlValue>)> {
    BulkTemplate::parse(template)?.compile(rows, dialect)
}

/// Splits rows into chunks of at most `chunk_size` rows; `0` keeps them whole.
pub fn chunks(rows: &[Vec<Cell>], chunk_size: usize) -> Vec<&[Vec<Cell>]> {
    if rows.is_empty() {
        return Vec::new();
    }
    if chunk_size == 0 {
        return vec![rows];
    }
    rows.chunks(chunk_size).collect()
}
