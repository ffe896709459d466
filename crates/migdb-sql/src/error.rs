//! Error types for statement binding and execution.

use std::time::Duration;

use crate::value::SqlValue;

/// Errors raised while translating templates or talking to the database.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A named marker has no entry in the binding map.
    #[error("No binding supplied for ':{name}' in statement:\n{statement}")]
    UnknownBinding {
        /// The marker name, without the sigil.
        name: String,
        /// The template that referenced it.
        statement: String,
    },

    /// The template could not be tokenized.
    #[error("Malformed template at byte {position}: {reason}\n{statement}")]
    MalformedTemplate {
        /// Byte offset where scanning failed.
        position: usize,
        /// What went wrong.
        reason: String,
        /// The offending template.
        statement: String,
    },

    /// A bulk template has no `:VALUES` marker.
    #[error("Bulk statement has no :VALUES marker:\n{statement}")]
    MissingBulkMarker {
        /// The offending template.
        statement: String,
    },

    /// A bulk template has more than one `:VALUES` marker.
    #[error("Bulk statement has {count} :VALUES markers, expected exactly one:\n{statement}")]
    AmbiguousBulkMarker {
        /// How many markers were found.
        count: usize,
        /// The offending template.
        statement: String,
    },

    /// A statement failed on the database.
    #[error("Statement failed: {source}\nStatement:\n{statement}\nValues: {values:?}")]
    Statement {
        /// The statement text as sent to the database.
        statement: String,
        /// The positional values sent with it.
        values: Vec<SqlValue>,
        /// The driver error.
        #[source]
        source: sqlx::Error,
    },

    /// A result column has a type the `Any` driver cannot carry.
    ///
    /// PostgreSQL `timestamptz`, `uuid`, `numeric` and `json` columns, and SQLite
    /// columns declared `DATETIME` or `BOOLEAN`, land here. Cast such columns to
    /// text or a number in the statement (`created_at::text`,
    /// `CAST(created_at AS TEXT)`).
    #[error("Column '{column}' cannot be decoded ({reason}); cast it to text or a number\nStatement:\n{statement}")]
    UnsupportedColumnType {
        /// The column name or ordinal.
        column: String,
        /// The driver's description of the type.
        reason: String,
        /// The statement text as sent to the database.
        statement: String,
        /// The positional values sent with it.
        values: Vec<SqlValue>,
    },

    /// A transaction body failed and the transaction was rolled back.
    #[error("{}", transaction_message(.source, .rollback_error.as_ref()))]
    Transaction {
        /// The failure that aborted the transaction.
        #[source]
        source: Box<Error>,
        /// Set when the rollback itself also failed.
        rollback_error: Option<sqlx::Error>,
    },

    /// No working connection could be established before the deadline.
    #[error("Connection unavailable after {attempts} attempt(s) over {waited:?}: {source}")]
    ConnectionUnavailable {
        /// Number of connection attempts made.
        attempts: u32,
        /// Time spent trying.
        waited: Duration,
        /// The last connection error.
        #[source]
        source: sqlx::Error,
    },

    /// The connection URL names a backend without positional placeholders support.
    #[error("Unsupported database backend in URL: {0}")]
    UnsupportedBackend(String),

    /// `begin` or `transact` was called on a session that is already transactional.
    #[error("Session is already inside a transaction")]
    NestedTransaction,

    /// `commit` or `rollback` was called on a pooled session.
    #[error("Session is not inside a transaction")]
    NotInTransaction,

    /// A caller-defined failure raised from inside a transaction body or migration.
    #[error("{0}")]
    Aborted(String),

    /// Database error outside statement execution (pool, transaction boundaries).
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

fn transaction_message(source: &Error, rollback_error: Option<&sqlx::Error>) -> String {
    match rollback_error {
        Some(rollback) => format!("Transaction failed ({source}) and rollback failed too: {rollback}"),
        None => format!("Transaction rolled back: {source}"),
    }
}

impl Error {
    /// Classifies a driver failure raised while running `statement`.
    pub(crate) fn from_statement(statement: String, values: Vec<SqlValue>, source: sqlx::Error) -> Self {
        match source {
            sqlx::Error::ColumnDecode { index, source }
                if matches!(
                    source.downcast_ref::<sqlx::Error>(),
                    Some(sqlx::Error::AnyDriverError(_))
                ) =>
            {
                Self::UnsupportedColumnType {
                    column: index,
                    reason: source.to_string(),
                    statement,
                    values,
                }
            }
            source => Self::Statement {
                statement,
                values,
                source,
            },
        }
    }

    /// Returns the statement text attached to this error, if any.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::UnknownBinding { statement, .. }
            | Self::MalformedTemplate { statement, .. }
            | Self::MissingBulkMarker { statement }
            | Self::AmbiguousBulkMarker { statement, .. }
            | Self::Statement { statement, .. }
            | Self::UnsupportedColumnType { statement, .. } => Some(statement),
            Self::Transaction { source, .. } => source.statement(),
            _ => None,
        }
    }

    /// Returns true for template errors, which are never worth retrying.
    #[must_use]
    pub const fn is_template_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownBinding { .. }
                | Self::MalformedTemplate { .. }
                | Self::MissingBulkMarker { .. }
                | Self::AmbiguousBulkMarker { .. }
        )
    }
}

/// Result type for binding and session operations.
pub type Result<T> = std::result::Result<T, Error>;
