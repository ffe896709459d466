//! Project scaffolding: migrator groups and migration files.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::ConfigFile;
use crate::error::{MigrateError, Result};
use crate::loader::SQL_EXTENSION;

/// Directory holding the config file and one directory per group.
pub const MIGRATORS_DIR: &str = "migrators";

/// Config file name inside [`MIGRATORS_DIR`].
pub const CONFIG_FILE: &str = "config.json";

/// Suffix of generated migration identifiers.
pub const NEW_MIGRATION_SUFFIX: &str = "new_migration";

/// Body of a generated migration file.
pub const MIGRATION_TEMPLATE: &str = "\
-- Describe the change here.

-- migrate:apply transactional


-- migrate:revert transactional

";

/// Returns `<root>/migrators/config.json`.
#[must_use]
pub fn config_path(root: &Path) -> PathBuf {
    root.join(MIGRATORS_DIR).join(CONFIG_FILE)
}

/// Returns `<root>/migrators/<group>`.
#[must_use]
pub fn group_dir(root: &Path, group: &str) -> PathBuf {
    root.join(MIGRATORS_DIR).join(group)
}

/// Formats the identifier of a migration created at `now`.
#[must_use]
pub fn migration_id(now: DateTime<Utc>) -> String {
    format!("{}-{NEW_MIGRATION_SUFFIX}", now.format("%Y%m%d%H%M%S%3f"))
}

/// Creates a group directory and registers the group in every environment.
///
/// Safe to run again: an existing directory or group entry is kept.
/// Returns the config file path.
pub fn init_group(root: &Path, name: &str) -> Result<PathBuf> {
    if !is_valid_group_name(name) {
        return Err(MigrateError::InvalidGroupName(name.to_string()));
    }

    let dir = group_dir(root, name);
    std::fs::create_dir_all(&dir)?;

    let path = config_path(root);
    let mut file = if path.exists() {
        ConfigFile::load(&path)?
    } else {
        ConfigFile::initial()
    };
    file.add_group(name);
    file.save(&path)?;

    info!(group = %name, "Migrator group \"{name}\" initialized.");
    Ok(path)
}

/// Writes an empty migration file into an existing group directory.
pub fn create_migration(root: &Path, group: &str, now: DateTime<Utc>) -> Result<PathBuf> {
    let dir = group_dir(root, group);
    if !dir.is_dir() {
        return Err(MigrateError::MigrationsDirNotFound(dir));
    }

    let path = dir.join(format!("{}.{SQL_EXTENSION}", migration_id(now)));
    if path.exists() {
        return Err(MigrateError::MigrationExists(path));
    }
    std::fs::write(&path, MIGRATION_TEMPLATE)?;

    info!(path = %path.display(), "Created migration");
    Ok(path)
}

fn is_valid_group_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
