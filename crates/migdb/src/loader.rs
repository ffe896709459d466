//! Migration loaders.
//!
//! The sequencer never reads files or guesses at unit types itself: it asks a
//! [`MigrationLoader`] for the known identifiers and loads each unit by
//! identifier.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{MigrateError, Result};
use crate::migration::{Migration, SqlMigration};

/// File extension of SQL migration units.
pub const SQL_EXTENSION: &str = "sql";

/// Source of migration units, keyed by identifier.
#[async_trait]
pub trait MigrationLoader: Send + Sync {
    /// Returns every known identifier, in any order.
    async fn identifiers(&self) -> Result<Vec<String>>;

    /// Loads one unit.
    async fn load(&self, id: &str) -> Result<Arc<dyn Migration>>;
}

#[async_trait]
impl<L: MigrationLoader + ?Sized> MigrationLoader for Arc<L> {
    async fn identifiers(&self) -> Result<Vec<String>> {
        (**self).identifiers().await
    }

    async fn load(&self, id: &str) -> Result<Arc<dyn Migration>> {
        (**self).load(id).await
    }
}

/// In-memory loader for migrations written in Rust.
#[derive(Default, Clone)]
pub struct Registry {
    units: BTreeMap<String, Arc<dyn Migration>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("units", &self.units.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a unit, replacing any unit with the same identifier.
    #[must_use]
    pub fn with(mut self, id: impl Into<String>, migration: impl Migration + 'static) -> Self {
        self.register(id, migration);
        self
    }

    /// Registers a unit in place.
    pub fn register(&mut self, id: impl Into<String>, migration: impl Migration + 'static) {
        self.units.insert(id.into(), Arc::new(migration));
    }

    /// Returns the number of registered units.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true when nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

#[async_trait]
impl MigrationLoader for Registry {
    async fn identifiers(&self) -> Result<Vec<String>> {
        Ok(self.units.keys().cloned().collect())
    }

    async fn load(&self, id: &str) -> Result<Arc<dyn Migration>> {
        self.units
            .get(id)
            .cloned()
            .ok_or_else(|| MigrateError::UnitLoad {
                version: id.to_string(),
                reason: "not registered".to_string(),
            })
    }
}

/// Loads `<identifier>.sql` files from one group directory.
#[derive(Debug, Clone)]
pub struct DirectoryLoader {
    dir: PathBuf,
}

impl DirectoryLoader {
    /// Creates a loader over `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Returns the directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.{SQL_EXTENSION}"))
    }
}

#[async_trait]
impl MigrationLoader for DirectoryLoader {
    async fn identifiers(&self) -> Result<Vec<String>> {
        if !self.dir.is_dir() {
            return Err(MigrateError::MigrationsDirNotFound(self.dir.clone()));
        }

        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !path.is_file() || path.extension().map_or(true, |ext| ext != SQL_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                ids.push(stem.to_string());
            }
        }
        ids.sort();
        debug!(dir = %self.dir.display(), count = ids.len(), "Discovered migration files");
        Ok(ids)
    }

    async fn load(&self, id: &str) -> Result<Arc<dyn Migration>> {
        let path = self.path_for(id);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| MigrateError::UnitLoad {
                version: id.to_string(),
                reason: format!("{}: {e}", path.display()),
            })?;
        Ok(Arc::new(SqlMigration::parse(id, &source)?))
    }
}
