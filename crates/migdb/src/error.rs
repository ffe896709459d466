//! Error types for the migration system.

use std::path::PathBuf;

use crate::config::ConfigError;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Statement or session failure outside a migration unit.
    #[error(transparent)]
    Query(#[from] migdb_sql::Error),

    /// A non-transactional migration unit failed. Units before it stay recorded.
    #[error("Migration '{version}' failed: {source}")]
    Unit {
        /// The failing unit.
        version: String,
        /// What went wrong.
        #[source]
        source: migdb_sql::Error,
    },

    /// A transactional run failed and was rolled back as a whole.
    #[error("Migration run [{}] rolled back: {source}", .versions.join(", "))]
    Run {
        /// Every unit of the run, none of which is recorded.
        versions: Vec<String>,
        /// The transaction failure.
        #[source]
        source: migdb_sql::Error,
    },

    /// A migration unit could not be loaded.
    #[error("Failed to load migration '{version}': {reason}")]
    UnitLoad {
        /// The unit identifier.
        version: String,
        /// Why loading failed.
        reason: String,
    },

    /// No migrations directory found.
    #[error("Migrations directory not found: {0}")]
    MigrationsDirNotFound(PathBuf),

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// A metadata record to delete is missing.
    #[error("Migration not recorded as applied: {0}")]
    MigrationNotFound(String),

    /// A revert target that is neither known nor applied.
    #[error("Unknown migration version: {0}")]
    UnknownVersion(String),

    /// The metadata table name is not a plain identifier.
    #[error("Invalid metadata table name: {0}")]
    InvalidTableName(String),

    /// A group name that cannot be used as a directory name.
    #[error("Invalid migrator group name: {0:?}")]
    InvalidGroupName(String),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MigrateError {
    /// Returns the failing statement, when the error came from the database.
    #[must_use]
    pub fn statement(&self) -> Option<&str> {
        match self {
            Self::Query(source) | Self::Unit { source, .. } | Self::Run { source, .. } => {
                source.statement()
            }
            _ => None,
        }
    }
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
