//! Ordered, versioned schema migrations for groups of databases.
//!
//! `migdb` applies migration units in identifier order and records each one in
//! a `migrate_meta` table, so every database of a group can be brought to the
//! same version and rolled back to an earlier one.
//!
//! # Architecture
//!
//! - **Units** - anything implementing [`Migration`]; SQL files are parsed into
//!   [`SqlMigration`]
//! - **Loaders** - [`MigrationLoader`] implementations hand units to the
//!   sequencer by identifier
//! - **Sequencer** - [`Migrator`] applies or reverts pending units, grouping
//!   consecutive transactional units into one transaction
//! - **Metadata** - [`MetadataStore`] reads and writes the applied versions
//! - **Groups** - [`Config`] names the databases of each group and
//!   [`GroupRunner`] walks them in order; [`env::layered_vars`] supplies the
//!   variables their connection URIs reference
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use migdb::prelude::*;
//! use migdb_sql::{Session, SessionOptions};
//!
//! struct CreateJobs;
//!
//! #[async_trait]
//! impl Migration for CreateJobs {
//!     async fn apply(&self, session: &mut Session) -> migdb_sql::Result<()> {
//!         session
//!             .execute_raw("CREATE TABLE job (id INTEGER PRIMARY KEY, name TEXT)", &[])
//!             .await?;
//!         Ok(())
//!     }
//!
//!     async fn revert(&self, session: &mut Session) -> migdb_sql::Result<()> {
//!         session.execute_raw("DROP TABLE job", &[]).await?;
//!         Ok(())
//!     }
//!
//!     fn apply_is_transactional(&self) -> bool {
//!         true
//!     }
//! }
//!
//! # async fn run() -> migdb::error::Result<()> {
//! let mut session = Session::connect("sqlite://app.db?mode=rwc", &SessionOptions::default()).await?;
//! let migrator = Migrator::new(Registry::new().with("20230101000000000-create_jobs", CreateJobs));
//! let report = migrator.apply(&mut session).await?;
//! println!("applied {:?}", report.applied);
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Create a migrator group and its directory
//! migdb init accounts
//!
//! # Add a migration file to the group
//! migdb create accounts
//!
//! # Apply pending migrations to every group, waiting up to 30s per node
//! migdb migrate --wait 30
//!
//! # Roll the group back to just after a version
//! migdb rollback accounts 20230101000000000-new_migration
//! ```

pub mod config;
pub mod env;
pub mod error;
pub mod executor;
pub mod history;
pub mod loader;
pub mod migration;
pub mod runner;
pub mod scaffold;

pub use config::Config;
pub use error::{MigrateError, Result};
pub use executor::Migrator;
pub use history::MetadataStore;
pub use loader::{DirectoryLoader, MigrationLoader, Registry};
pub use migration::{Migration, SqlMigration};
pub use runner::GroupRunner;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::{Config, ConfigError, ConfigFile, Group, Node, ResolvedNode};
    pub use crate::env::layered_vars;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{
        partition_runs, ApplyReport, Migrator, RevertReport, Run, Status, TargetState,
    };
    pub use crate::history::MetadataStore;
    pub use crate::loader::{DirectoryLoader, MigrationLoader, Registry};
    pub use crate::migration::{Migration, SqlMigration, SqlScript};
    pub use crate::runner::{GroupRunner, NodeReport};
    pub use crate::scaffold::{create_migration, init_group};
}
