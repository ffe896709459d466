//! Runs a migrator over every node of a group.

use std::time::Duration;

use migdb_sql::{acquire, AcquireOptions, Session};
use tracing::info;

use crate::config::ResolvedNode;
use crate::error::Result;
use crate::executor::{ApplyReport, Migrator, RevertReport, Status};
use crate::loader::MigrationLoader;

/// What happened on one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeReport<R> {
    /// The node alias.
    pub alias: String,
    /// The per-node outcome.
    pub report: R,
}

/// Processes the nodes of one group sequentially, stopping at the first
/// failure.
#[derive(Debug)]
pub struct GroupRunner<L> {
    group: String,
    nodes: Vec<ResolvedNode>,
    migrator: Migrator<L>,
    acquire: AcquireOptions,
}

impl<L: MigrationLoader> GroupRunner<L> {
    /// Creates a runner that makes a single connection attempt per node.
    pub fn new(group: impl Into<String>, nodes: Vec<ResolvedNode>, migrator: Migrator<L>) -> Self {
        Self {
            group: group.into(),
            nodes,
            migrator,
            acquire: AcquireOptions::default(),
        }
    }

    /// Keeps retrying each node's connection for up to `wait`.
    #[must_use]
    pub fn wait(mut self, wait: Duration) -> Self {
        self.acquire.max_wait = wait;
        self
    }

    /// Replaces the connection options.
    #[must_use]
    pub fn acquire_options(mut self, options: AcquireOptions) -> Self {
        self.acquire = options;
        self
    }

    /// Returns the nodes.
    #[must_use]
    pub fn nodes(&self) -> &[ResolvedNode] {
        &self.nodes
    }

    /// Applies pending units on every node.
    pub async fn apply(&self) -> Result<Vec<NodeReport<ApplyReport>>> {
        let mut reports = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut session = self.connect(node).await?;
            let outcome = self.migrator.apply(&mut session).await;
            session.close().await?;
            reports.push(NodeReport {
                alias: node.alias.clone(),
                report: outcome?,
            });
        }
        Ok(reports)
    }

    /// Reverts every node to just after `target`; `None` reverts everything.
    pub async fn revert(&self, target: Option<&str>) -> Result<Vec<NodeReport<RevertReport>>> {
        let mut reports = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut session = self.connect(node).await?;
            let outcome = self.migrator.revert(&mut session, target).await;
            session.close().await?;
            reports.push(NodeReport {
                alias: node.alias.clone(),
                report: outcome?,
            });
        }
        Ok(reports)
    }

    /// Reports the status of every node.
    pub async fn status(&self) -> Result<Vec<NodeReport<Status>>> {
        let mut reports = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let mut session = self.connect(node).await?;
            let outcome = self.migrator.status(&mut session).await;
            session.close().await?;
            reports.push(NodeReport {
                alias: node.alias.clone(),
                report: outcome?,
            });
        }
        Ok(reports)
    }

    async fn connect(&self, node: &ResolvedNode) -> Result<Session> {
        info!(group = %self.group, node = %node.alias, "Checking {}, node: {}", self.group, node.alias);
        Ok(acquire(&node.url, &self.acquire).await?)
    }
}
