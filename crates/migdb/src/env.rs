//! Layered `.env` files.
//!
//! Before connection URIs are resolved, variables are read from files in the
//! project root, each layer overriding the one before it:
//!
//! 1. `.env`
//! 2. `.env.docker`, when `DOCKER_ENV` is set by the process or by `.env`
//! 3. `.env.prod`, when the selected environment is `production`
//!
//! File values override the process environment. Missing files are skipped.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, info};

use crate::config::ConfigError;

/// Base variables, always read.
pub const BASE_FILE: &str = ".env";

/// Variables for containerized runs.
pub const DOCKER_FILE: &str = ".env.docker";

/// Variables for the production environment.
pub const PRODUCTION_FILE: &str = ".env.prod";

/// Variable whose presence enables [`DOCKER_FILE`].
pub const DOCKER_FLAG: &str = "DOCKER_ENV";

/// Environment name that enables [`PRODUCTION_FILE`].
pub const PRODUCTION_ENVIRONMENT: &str = "production";

/// Layers the `.env` files under `root` over `vars` for `environment`.
pub fn layered_vars(
    root: &Path,
    environment: &str,
    mut vars: HashMap<String, String>,
) -> Result<HashMap<String, String>, ConfigError> {
    merge_file(&mut vars, &root.join(BASE_FILE), "base")?;

    if vars.contains_key(DOCKER_FLAG) {
        merge_file(&mut vars, &root.join(DOCKER_FILE), "docker")?;
    }

    if environment == PRODUCTION_ENVIRONMENT {
        merge_file(&mut vars, &root.join(PRODUCTION_FILE), "production")?;
    }

    Ok(vars)
}

/// Merges one file into `vars`. Returns false when the file does not exist.
fn merge_file(
    vars: &mut HashMap<String, String>,
    path: &Path,
    layer: &str,
) -> Result<bool, ConfigError> {
    let entries = match dotenvy::from_path_iter(path) {
        Ok(entries) => entries,
        Err(e) if e.not_found() => {
            debug!(path = %path.display(), "No {layer} environment defined");
            return Ok(false);
        }
        Err(source) => {
            return Err(ConfigError::EnvFile {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    for entry in entries {
        let (key, value) = entry.map_err(|source| ConfigError::EnvFile {
            path: path.to_path_buf(),
            source,
        })?;
        vars.insert(key, value);
    }

    info!(path = %path.display(), "Picked up {layer} environment");
    Ok(true)
}
