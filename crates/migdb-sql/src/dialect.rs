//! Database dialects.
//!
//! Statements are executed through sqlx's `Any` driver, which passes SQL text
//! to the backend untouched. The dialect decides what a positional placeholder
//! looks like and how the catalog is queried.

use crate::error::{Error, Result};

/// A supported database backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL: placeholders are `$1`, `$2`, ...
    Postgres,
    /// SQLite: placeholders are `?1`, `?2`, ...
    Sqlite,
}

impl Dialect {
    /// Determines the dialect from a connection URL scheme.
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default();
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(Error::UnsupportedBackend(scheme.to_string())),
        }
    }

    /// Returns the dialect name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Returns the character that introduces a numbered positional placeholder.
    #[must_use]
    pub const fn positional_sigil(self) -> char {
        match self {
            Self::Postgres => '$',
            Self::Sqlite => '?',
        }
    }

    /// Renders the 1-based positional placeholder `index`.
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        format!("{}{index}", self.positional_sigil())
    }

    /// Returns a query counting ordinary tables named by placeholder 1.
    #[must_use]
    pub const fn table_exists_sql(self) -> &'static str {
        match self {
            Self::Postgres => {
                "SELECT COUNT(*) FROM pg_catalog.pg_class WHERE relname = $1 AND relkind = 'r'"
            }
            Self::Sqlite => "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        }
    }

    /// Quote an identifier (table name, column name, etc.).
    #[must_use]
    pub fn quote_identifier(self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_url() {
        assert_eq!(
            Dialect::from_url("postgres://localhost/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(
            Dialect::from_url("postgresql://u@h:5432/db").unwrap(),
            Dialect::Postgres
        );
        assert_eq!(Dialect::from_url("sqlite::memory:").unwrap(), Dialect::Sqlite);
        assert_eq!(Dialect::from_url("SQLITE://x.db").unwrap(), Dialect::Sqlite);
        assert!(matches!(
            Dialect::from_url("mysql://localhost/db"),
            Err(Error::UnsupportedBackend(s)) if s == "mysql"
        ));
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(Dialect::Postgres.placeholder(3), "$3");
        assert_eq!(Dialect::Sqlite.placeholder(12), "?12");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(Dialect::Postgres.quote_identifier("meta"), "\"meta\"");
        assert_eq!(Dialect::Sqlite.quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
