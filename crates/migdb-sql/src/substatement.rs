//! Correlated sub-statements for bulk cells.

use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::template::{self, is_name_char, Region};
use crate::value::{SqlValue, ToSqlValue};

/// A parameterized sub-query used as the value of one bulk cell, such as
/// `SELECT id FROM job WHERE name = $1`.
///
/// The statement uses the session dialect's numbered placeholders starting at
/// 1. When embedded in a bulk statement its placeholders are shifted past the
/// values that precede it.
#[derive(Debug, Clone, PartialEq)]
pub struct SubStatement {
    statement: String,
    values: Vec<SqlValue>,
}

impl SubStatement {
    /// Creates a sub-statement without values.
    #[must_use]
    pub fn new(statement: impl Into<String>) -> Self {
        Self {
            statement: statement.into(),
            values: Vec::new(),
        }
    }

    /// Appends the value for the next placeholder.
    #[must_use]
    pub fn bind(mut self, value: impl ToSqlValue) -> Self {
        self.values.push(value.to_sql_value());
        self
    }

    /// Creates a sub-statement with all of its values at once.
    #[must_use]
    pub fn with_values(statement: impl Into<String>, values: Vec<SqlValue>) -> Self {
        Self {
            statement: statement.into(),
            values,
        }
    }

    /// Returns the statement as written.
    #[must_use]
    pub fn statement(&self) -> &str {
        &self.statement
    }

    /// Returns the positional values.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Shifts every positional placeholder by `offset`.
    ///
    /// String literals, quoted identifiers, comments and dollar-quoted bodies
    /// are copied unchanged. Values are returned unchanged.
    pub fn reindex(&self, offset: usize, dialect: Dialect) -> Result<(String, Vec<SqlValue>)> {
        let mut out = String::with_capacity(self.statement.len() + 8);
        for region in template::regions(&self.statement)? {
            match region {
                Region::Quoted(text) => out.push_str(text),
                Region::Code { text, offset: base } => {
                    self.reindex_code(text, base, offset, dialect, &mut out)?;
                }
            }
        }
        Ok((out, self.values.clone()))
    }

    fn reindex_code(
        &self,
        text: &str,
        base: usize,
        offset: usize,
        dialect: Dialect,
        out: &mut String,
    ) -> Result<()> {
        let sigil = dialect.positional_sigil();
        let mut chars = text.char_indices().peekable();
        let mut previous: Option<char> = None;

        while let Some((pos, c)) = chars.next() {
            // A sigil inside a name (`a$1` in PostgreSQL) is not a placeholder.
            if c != sigil || previous.is_some_and(is_name_char) {
                out.push(c);
                previous = Some(c);
                continue;
            }

            let mut digits = String::new();
            while let Some(&(_, d)) = chars.peek() {
                if !d.is_ascii_digit() {
                    break;
                }
                digits.push(d);
                chars.next();
            }

            if digits.is_empty() {
                if dialect == Dialect::Sqlite {
                    return Err(Error::MalformedTemplate {
                        position: base + pos,
                        reason: "sub-statement placeholders must be numbered (?1, ?2, ...)"
                            .to_string(),
                        statement: self.statement.clone(),
                    });
                }
                out.push(c);
                previous = Some(c);
                continue;
            }

            let index: usize = digits.parse().map_err(|_| Error::MalformedTemplate {
                position: base + pos,
                reason: format!("placeholder index {digits} is out of range"),
                statement: self.statement.clone(),
            })?;
            out.push_str(&dialect.placeholder(index + offset));
            previous = digits.chars().last();
        }
        Ok(())
    }
}
