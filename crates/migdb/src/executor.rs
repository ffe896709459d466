//! Migration sequencer.
//!
//! This module applies and reverts migration units against one database,
//! tracking progress in the metadata table. Consecutive transactional units
//! share a single transaction; every other unit runs and is recorded on its
//! own.

use std::fmt;
use std::sync::Arc;

use migdb_sql::Session;
use tracing::{debug, info, warn};

use crate::error::{MigrateError, Result};
use crate::history::MetadataStore;
use crate::loader::MigrationLoader;
use crate::migration::Migration;

/// Where a database stands relative to the known units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// The metadata table does not exist.
    Uninitialized,
    /// Nothing to do.
    Current,
    /// Units remain to be applied.
    Pending,
    /// Applied units remain to be reverted.
    Revertible,
}

impl fmt::Display for TargetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Uninitialized => "uninitialized",
            Self::Current => "current",
            Self::Pending => "pending",
            Self::Revertible => "revertible",
        };
        f.write_str(name)
    }
}

/// A stretch of units executed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Run<T> {
    /// Units sharing one transaction.
    Transaction(Vec<T>),
    /// A unit executed outside any transaction.
    Single(T),
}

/// Groups an ordered unit list into runs.
///
/// Each maximal stretch of units flagged transactional becomes one
/// [`Run::Transaction`]; every unflagged unit becomes its own [`Run::Single`].
/// Order is preserved.
pub fn partition_runs<T: Clone>(units: &[(T, bool)]) -> Vec<Run<T>> {
    let mut runs = Vec::new();
    let mut open: Vec<T> = Vec::new();

    for (unit, transactional) in units {
        if *transactional {
            open.push(unit.clone());
            continue;
        }
        if !open.is_empty() {
            runs.push(Run::Transaction(std::mem::take(&mut open)));
        }
        runs.push(Run::Single(unit.clone()));
    }
    if !open.is_empty() {
        runs.push(Run::Transaction(open));
    }
    runs
}

/// Outcome of [`Migrator::apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyReport {
    /// State before anything ran.
    pub state: TargetState,
    /// Whether the metadata table was created.
    pub table_created: bool,
    /// Applied units, in order.
    pub applied: Vec<String>,
}

/// Outcome of [`Migrator::revert`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevertReport {
    /// State before anything ran.
    pub state: TargetState,
    /// Reverted units, in order.
    pub reverted: Vec<String>,
}

/// Result of [`Migrator::status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Current state.
    pub state: TargetState,
    /// Applied versions, ascending.
    pub applied: Vec<String>,
    /// Versions that `apply` would run, ascending.
    pub pending: Vec<String>,
}

#[derive(Clone)]
struct LoadedUnit {
    version: String,
    migration: Arc<dyn Migration>,
}

#[derive(Debug, Clone, Copy)]
enum Direction {
    Apply,
    Revert,
}

/// Applies and reverts units from a loader.
#[derive(Debug)]
pub struct Migrator<L> {
    loader: L,
    store: MetadataStore,
}

impl<L: MigrationLoader> Migrator<L> {
    /// Creates a migrator using the default metadata table.
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            store: MetadataStore::new(),
        }
    }

    /// Uses a different metadata store.
    #[must_use]
    pub fn with_store(mut self, store: MetadataStore) -> Self {
        self.store = store;
        self
    }

    /// Returns the loader.
    pub const fn loader(&self) -> &L {
        &self.loader
    }

    /// Returns the metadata store.
    pub const fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Applies every unit newer than the latest applied version.
    ///
    /// Creates the metadata table when missing. Stops at the first failure;
    /// units committed before it stay recorded.
    pub async fn apply(&self, session: &mut Session) -> Result<ApplyReport> {
        let mut state = TargetState::Current;
        let mut table_created = false;

        if !self.store.exists(session).await? {
            state = TargetState::Uninitialized;
            let store = self.store.clone();
            session
                .transact(move |tx| {
                    Box::pin(async move { store.create(tx).await.map_err(into_sql_error) })
                })
                .await?;
            table_created = true;
        }

        let pending = self.pending(session).await?;
        if pending.is_empty() {
            info!("Already up to date.");
            return Ok(ApplyReport {
                state,
                table_created,
                applied: Vec::new(),
            });
        }
        if state == TargetState::Current {
            state = TargetState::Pending;
        }

        let units = self.load_all(&pending, Direction::Apply).await?;

        let mut applied = Vec::new();
        for run in partition_runs(&units) {
            applied.extend(self.execute_run(session, run, Direction::Apply).await?);
        }

        Ok(ApplyReport {
            state,
            table_created,
            applied,
        })
    }

    /// Reverts applied units newer than `target`, newest first.
    ///
    /// `None` reverts everything. A missing metadata table is a logged no-op.
    pub async fn revert(&self, session: &mut Session, target: Option<&str>) -> Result<RevertReport> {
        if !self.store.exists(session).await? {
            warn!("Migrator table not initialized, backing out.");
            return Ok(RevertReport {
                state: TargetState::Uninitialized,
                reverted: Vec::new(),
            });
        }

        let versions = match target {
            Some(version) => {
                let known = self.loader.identifiers().await?.iter().any(|id| id == version);
                if !known && !self.store.is_applied(session, version).await? {
                    return Err(MigrateError::UnknownVersion(version.to_string()));
                }
                self.store.applied_after(session, version).await?
            }
            None => {
                let mut all = self.store.applied(session).await?;
                all.reverse();
                all
            }
        };

        if versions.is_empty() {
            info!("Nothing to do");
            return Ok(RevertReport {
                state: TargetState::Current,
                reverted: Vec::new(),
            });
        }

        let units = self.load_all(&versions, Direction::Revert).await?;

        let mut reverted = Vec::new();
        for run in partition_runs(&units) {
            reverted.extend(self.execute_run(session, run, Direction::Revert).await?);
        }

        Ok(RevertReport {
            state: TargetState::Revertible,
            reverted,
        })
    }

    /// Reports applied and pending versions without changing anything.
    pub async fn status(&self, session: &mut Session) -> Result<Status> {
        if !self.store.exists(session).await? {
            let mut pending = self.loader.identifiers().await?;
            pending.sort();
            pending.dedup();
            return Ok(Status {
                state: TargetState::Uninitialized,
                applied: Vec::new(),
                pending,
            });
        }

        let applied = self.store.applied(session).await?;
        let pending = self.pending(session).await?;
        let state = if pending.is_empty() {
            TargetState::Current
        } else {
            TargetState::Pending
        };
        Ok(Status {
            state,
            applied,
            pending,
        })
    }

    /// Sorted identifiers greater than the latest applied version.
    async fn pending(&self, session: &mut Session) -> Result<Vec<String>> {
        let latest = self.store.latest(session).await?;
        let mut ids = self.loader.identifiers().await?;
        ids.sort();
        ids.dedup();
        if let Some(latest) = latest {
            ids.retain(|id| id.as_str() > latest.as_str());
        }
        Ok(ids)
    }

    /// Loads every unit up front, paired with its transactional flag.
    async fn load_all(
        &self,
        versions: &[String],
        direction: Direction,
    ) -> Result<Vec<(LoadedUnit, bool)>> {
        let mut units = Vec::with_capacity(versions.len());
        for version in versions {
            let migration = self.loader.load(version).await?;
            let transactional = match direction {
                Direction::Apply => migration.apply_is_transactional(),
                Direction::Revert => migration.revert_is_transactional(),
            };
            debug!(version = %version, transactional, "Loaded migration");
            units.push((
                LoadedUnit {
                    version: version.clone(),
                    migration,
                },
                transactional,
            ));
        }
        Ok(units)
    }

    async fn execute_run(
        &self,
        session: &mut Session,
        run: Run<LoadedUnit>,
        direction: Direction,
    ) -> Result<Vec<String>> {
        match run {
            Run::Single(unit) => {
                execute_unit(&unit, &self.store, session, direction)
                    .await
                    .map_err(|source| MigrateError::Unit {
                        version: unit.version.clone(),
                        source,
                    })?;
                Ok(vec![unit.version])
            }
            Run::Transaction(units) => {
                let versions: Vec<String> = units.iter().map(|u| u.version.clone()).collect();
                let store = self.store.clone();
                session
                    .transact(move |tx| {
                        Box::pin(async move {
                            for unit in &units {
                                execute_unit(unit, &store, tx, direction).await?;
                            }
                            Ok::<_, migdb_sql::Error>(())
                        })
                    })
                    .await
                    .map_err(|source| MigrateError::Run {
                        versions: versions.clone(),
                        source,
                    })?;
                Ok(versions)
            }
        }
    }
}

async fn execute_unit(
    unit: &LoadedUnit,
    store: &MetadataStore,
    session: &mut Session,
    direction: Direction,
) -> migdb_sql::Result<()> {
    match direction {
        Direction::Apply => {
            info!(version = %unit.version, "Migrating: {}", unit.version);
            unit.migration.apply(session).await?;
            store
                .record_applied(session, &unit.version)
                .await
                .map_err(into_sql_error)
        }
        Direction::Revert => {
            info!(version = %unit.version, "Rolling back: {}", unit.version);
            unit.migration.revert(session).await?;
            store
                .record_reverted(session, &unit.version)
                .await
                .map_err(into_sql_error)
        }
    }
}

/// Flattens a metadata error back into the statement error it wraps.
fn into_sql_error(error: MigrateError) -> migdb_sql::Error {
    match error {
        MigrateError::Query(inner) => inner,
        other => migdb_sql::Error::Aborted(other.to_string()),
    }
}
