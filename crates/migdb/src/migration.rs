//! Migration units.
//!
//! A unit is anything implementing [`Migration`]: Rust code registered in a
//! [`Registry`](crate::loader::Registry), or a `.sql` file parsed into a
//! [`SqlMigration`].
//!
//! # SQL file format
//!
//! ```sql
//! -- migrate:apply transactional
//! CREATE TABLE job (id SERIAL PRIMARY KEY, name TEXT NOT NULL);
//!
//! -- migrate:revert transactional
//! DROP TABLE job;
//! ```
//!
//! Either section may be missing, in which case that direction does nothing.
//! The `transactional` option makes the section join a run of units that
//! commit or roll back together.

use async_trait::async_trait;
use migdb_sql::Session;

use crate::error::{MigrateError, Result};

/// Prefix of a section directive line.
pub const DIRECTIVE_PREFIX: &str = "-- migrate:";

/// Option word marking a section transactional.
pub const TRANSACTIONAL_OPTION: &str = "transactional";

/// One versioned schema change.
///
/// Both directions default to no-ops and to running outside a transaction.
#[async_trait]
pub trait Migration: Send + Sync {
    /// Applies the change.
    async fn apply(&self, _session: &mut Session) -> migdb_sql::Result<()> {
        Ok(())
    }

    /// Undoes the change.
    async fn revert(&self, _session: &mut Session) -> migdb_sql::Result<()> {
        Ok(())
    }

    /// Whether `apply` runs inside a transaction shared with its neighbours.
    fn apply_is_transactional(&self) -> bool {
        false
    }

    /// Whether `revert` runs inside a transaction shared with its neighbours.
    fn revert_is_transactional(&self) -> bool {
        false
    }
}

/// A section of a SQL migration file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlScript {
    /// The SQL text, possibly several statements.
    pub sql: String,
    /// Whether the section carried the `transactional` option.
    pub transactional: bool,
}

impl SqlScript {
    /// Creates a script.
    #[must_use]
    pub fn new(sql: impl Into<String>, transactional: bool) -> Self {
        Self {
            sql: sql.into(),
            transactional,
        }
    }

    fn is_blank(&self) -> bool {
        self.sql.trim().is_empty()
    }
}

/// A migration made of plain SQL scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlMigration {
    apply: Option<SqlScript>,
    revert: Option<SqlScript>,
}

impl SqlMigration {
    /// Creates a migration with no sections.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the apply script.
    #[must_use]
    pub fn with_apply(mut self, script: SqlScript) -> Self {
        self.apply = Some(script);
        self
    }

    /// Sets the revert script.
    #[must_use]
    pub fn with_revert(mut self, script: SqlScript) -> Self {
        self.revert = Some(script);
        self
    }

    /// Returns the apply script.
    #[must_use]
    pub const fn apply_script(&self) -> Option<&SqlScript> {
        self.apply.as_ref()
    }

    /// Returns the revert script.
    #[must_use]
    pub const fn revert_script(&self) -> Option<&SqlScript> {
        self.revert.as_ref()
    }

    /// Parses the contents of a migration file.
    ///
    /// `version` only labels errors.
    pub fn parse(version: &str, source: &str) -> Result<Self> {
        let fail = |line: usize, reason: &str| MigrateError::UnitLoad {
            version: version.to_string(),
            reason: format!("line {line}: {reason}"),
        };

        let mut migration = Self::default();
        let mut current: Option<Direction> = None;
        let mut body = String::new();

        for (index, line) in source.lines().enumerate() {
            let number = index + 1;
            let trimmed = line.trim();

            let Some(directive) = trimmed.strip_prefix(DIRECTIVE_PREFIX) else {
                if current.is_some() {
                    body.push_str(line);
                    body.push('\n');
                } else if !trimmed.is_empty() && !trimmed.starts_with("--") {
                    return Err(fail(number, "statement before the first directive"));
                }
                continue;
            };

            let mut words = directive.split_whitespace();
            let direction = match words.next() {
                Some("apply") => Direction::Apply,
                Some("revert") => Direction::Revert,
                Some(other) => return Err(fail(number, &format!("unknown directive '{other}'"))),
                None => return Err(fail(number, "empty directive")),
            };
            let mut transactional = false;
            for word in words {
                if word == TRANSACTIONAL_OPTION && !transactional {
                    transactional = true;
                } else {
                    return Err(fail(number, &format!("unexpected option '{word}'")));
                }
            }
            if migration.section(direction).is_some() {
                return Err(fail(
                    number,
                    &format!("duplicate '{}' directive", direction.name()),
                ));
            }

            if let Some(previous) = current.take() {
                migration.finish(previous, std::mem::take(&mut body));
            }
            *migration.section_mut(direction) = Some(SqlScript::new(String::new(), transactional));
            current = Some(direction);
        }

        if let Some(previous) = current {
            migration.finish(previous, body);
        }
        Ok(migration)
    }

    fn section(&self, direction: Direction) -> Option<&SqlScript> {
        match direction {
            Direction::Apply => self.apply.as_ref(),
            Direction::Revert => self.revert.as_ref(),
        }
    }

    fn section_mut(&mut self, direction: Direction) -> &mut Option<SqlScript> {
        match direction {
            Direction::Apply => &mut self.apply,
            Direction::Revert => &mut self.revert,
        }
    }

    fn finish(&mut self, direction: Direction, body: String) {
        if let Some(script) = self.section_mut(direction) {
            script.sql = body.trim().to_string();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Apply,
    Revert,
}

impl Direction {
    const fn name(self) -> &'static str {
        match self {
            Self::Apply => "apply",
            Self::Revert => "revert",
        }
    }
}

async fn run_script(script: Option<&SqlScript>, session: &mut Session) -> migdb_sql::Result<()> {
    match script {
        Some(script) if !script.is_blank() => {
            session.execute_raw(&script.sql, &[]).await?;
            Ok(())
        }
        _ => Ok(()),
    }
}

#[async_trait]
impl Migration for SqlMigration {
    async fn apply(&self, session: &mut Session) -> migdb_sql::Result<()> {
        run_script(self.apply.as_ref(), session).await
    }

    async fn revert(&self, session: &mut Session) -> migdb_sql::Result<()> {
        run_script(self.revert.as_ref(), session).await
    }

    fn apply_is_transactional(&self) -> bool {
        self.apply.as_ref().is_some_and(|s| s.transactional)
    }

    fn revert_is_transactional(&self) -> bool {
        self.revert.as_ref().is_some_and(|s| s.transactional)
    }
}
