//! Group configuration.
//!
//! `migrators/config.json` maps environment names to migrator groups, and each
//! group to an ordered list of database nodes:
//!
//! ```json
//! {
//!   "development": {
//!     "groups": [
//!       {
//!         "name": "accounts",
//!         "nodes": [
//!           { "alias": "primary", "conn_uri": "postgres://${DB_USER}@localhost/accounts" }
//!         ]
//!       }
//!     ]
//!   }
//! }
//! ```
//!
//! Connection URIs may reference variables as `${NAME}`. They are resolved
//! against an explicit map supplied by the caller, never evaluated.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Environment used when none is selected.
pub const DEFAULT_ENVIRONMENT: &str = "development";

/// Environments written to a freshly created config file.
pub const INITIAL_ENVIRONMENTS: [&str; 2] = ["development", "production"];

static VARIABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("Invalid variable reference regex")
});

/// Errors that can occur while loading or resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("Cannot access {path}: {source}")]
    Io {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON of the expected shape.
    #[error("Invalid config file {path}: {source}")]
    Parse {
        /// The config file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },

    /// A `.env` file could not be read or parsed.
    #[error("Invalid environment file {path}: {source}")]
    EnvFile {
        /// The offending file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: dotenvy::Error,
    },

    /// The selected environment has no section.
    #[error("There is no configuration for \"{0}\" in config.json")]
    UnknownEnvironment(String),

    /// The requested group is not configured.
    #[error("Migrator group \"{group}\" is not configured for \"{environment}\"")]
    UnknownGroup {
        /// The group name.
        group: String,
        /// The selected environment.
        environment: String,
    },

    /// A connection URI references a variable that is not supplied.
    #[error("Unknown variable ${{{name}}} in connection URI for node \"{alias}\"")]
    UnknownVariable {
        /// The variable name.
        name: String,
        /// The node whose URI referenced it.
        alias: String,
    },

    /// A connection URI has a `${` that does not start a valid reference.
    #[error("Malformed variable reference at byte {position} in connection URI for node \"{alias}\"")]
    MalformedUri {
        /// Byte offset of the offending `${`.
        position: usize,
        /// The node whose URI is malformed.
        alias: String,
    },
}

/// One database of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Display name used in progress messages.
    pub alias: String,
    /// Connection URI, possibly with `${NAME}` references.
    pub conn_uri: String,
}

/// A named set of databases sharing one migration directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Group name, also the directory name under `migrators/`.
    pub name: String,
    /// Nodes, processed in order.
    #[serde(default)]
    pub nodes: Vec<Node>,
}

impl Group {
    /// Creates a group without nodes.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
        }
    }
}

/// The groups of one environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Environment {
    /// Configured groups.
    #[serde(default)]
    pub groups: Vec<Group>,
}

/// The whole config file: environment name to environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigFile {
    environments: BTreeMap<String, Environment>,
}

impl ConfigFile {
    /// Creates a file with the initial empty environments.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            environments: INITIAL_ENVIRONMENTS
                .iter()
                .map(|name| ((*name).to_string(), Environment::default()))
                .collect(),
        }
    }

    /// Parses JSON text.
    pub fn from_json(path: &Path, text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Reads and parses a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(path, &text)
    }

    /// Writes the file as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let text = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        std::fs::write(path, text + "\n").map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Returns the environment names.
    pub fn environment_names(&self) -> impl Iterator<Item = &str> {
        self.environments.keys().map(String::as_str)
    }

    /// Adds an empty group to every environment lacking it.
    ///
    /// Returns true when anything changed.
    pub fn add_group(&mut self, name: &str) -> bool {
        let mut changed = false;
        for env in self.environments.values_mut() {
            if !env.groups.iter().any(|g| g.name == name) {
                env.groups.push(Group::new(name));
                changed = true;
            }
        }
        changed
    }

    /// Picks one environment.
    pub fn select(mut self, environment: &str) -> Result<Config, ConfigError> {
        let env = self
            .environments
            .remove(environment)
            .ok_or_else(|| ConfigError::UnknownEnvironment(environment.to_string()))?;
        Ok(Config {
            environment: environment.to_string(),
            groups: env.groups,
        })
    }
}

/// A node with its connection URI resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedNode {
    /// Display name.
    pub alias: String,
    /// Literal connection URI.
    pub url: String,
}

/// The configuration of the selected environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    environment: String,
    groups: Vec<Group>,
}

impl Config {
    /// Loads `path` and selects `environment`.
    pub fn load(path: &Path, environment: &str) -> Result<Self, ConfigError> {
        ConfigFile::load(path)?.select(environment)
    }

    /// Returns the selected environment name.
    #[must_use]
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Returns the configured groups, in file order.
    #[must_use]
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Looks up a group by name.
    pub fn group(&self, name: &str) -> Result<&Group, ConfigError> {
        self.groups
            .iter()
            .find(|g| g.name == name)
            .ok_or_else(|| ConfigError::UnknownGroup {
                group: name.to_string(),
                environment: self.environment.clone(),
            })
    }

    /// Returns the nodes of a group with every URI interpolated.
    pub fn resolve_group(
        &self,
        name: &str,
        vars: &HashMap<String, String>,
    ) -> Result<Vec<ResolvedNode>, ConfigError> {
        self.group(name)?
            .nodes
            .iter()
            .map(|node| {
                Ok(ResolvedNode {
                    alias: node.alias.clone(),
                    url: interpolate(&node.conn_uri, vars).map_err(|e| e.for_node(&node.alias))?,
                })
            })
            .collect()
    }
}

/// Why [`interpolate`] failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpolationError {
    /// `${NAME}` with no entry for `NAME`.
    UnknownVariable(String),
    /// A `${` not starting a valid reference, at this byte offset.
    Malformed(usize),
}

impl InterpolationError {
    fn for_node(self, alias: &str) -> ConfigError {
        match self {
            Self::UnknownVariable(name) => ConfigError::UnknownVariable {
                name,
                alias: alias.to_string(),
            },
            Self::Malformed(position) => ConfigError::MalformedUri {
                position,
                alias: alias.to_string(),
            },
        }
    }
}

/// Replaces every `${NAME}` in `template` with its value from `vars`.
pub fn interpolate(
    template: &str,
    vars: &HashMap<String, String>,
) -> Result<String, InterpolationError> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for caps in VARIABLE.captures_iter(template) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        check_literal(template, last, whole.start())?;
        let value = vars
            .get(name.as_str())
            .ok_or_else(|| InterpolationError::UnknownVariable(name.as_str().to_string()))?;
        out.push_str(&template[last..whole.start()]);
        out.push_str(value);
        last = whole.end();
    }
    check_literal(template, last, template.len())?;
    out.push_str(&template[last..]);
    Ok(out)
}

fn check_literal(template: &str, start: usize, end: usize) -> Result<(), InterpolationError> {
    match template[start..end].find("${") {
        Some(offset) => Err(InterpolationError::Malformed(start + offset)),
        None => Ok(()),
    }
}
