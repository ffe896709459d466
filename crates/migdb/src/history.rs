//! Migration metadata tracking.
//!
//! This module manages the `migrate_meta` table, which holds one row per
//! applied migration. Versions are opaque strings ordered by plain string
//! comparison.

use migdb_sql::{Bindings, RowSet, Session, SqlValue};
use tracing::info;

use crate::error::{MigrateError, Result};

/// Default name of the metadata table.
pub const DEFAULT_TABLE: &str = "migrate_meta";

/// Reads and writes applied-version records through a caller's session.
///
/// The store holds no connection. Passing a transactional session makes the
/// record part of that transaction.
#[derive(Debug, Clone)]
pub struct MetadataStore {
    table: String,
}

impl Default for MetadataStore {
    fn default() -> Self {
        Self {
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl MetadataStore {
    /// Creates a store over the default `migrate_meta` table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store over a custom table.
    pub fn with_table(table: impl Into<String>) -> Result<Self> {
        let table = table.into();
        if !is_plain_identifier(&table) {
            return Err(MigrateError::InvalidTableName(table));
        }
        Ok(Self { table })
    }

    /// Returns the table name.
    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Checks the catalog for the table.
    pub async fn exists(&self, session: &mut Session) -> Result<bool> {
        let sql = session.dialect().table_exists_sql();
        let rows = session
            .execute_raw(sql, &[SqlValue::Text(self.table.clone())])
            .await?;
        Ok(rows
            .first()
            .and_then(|r| r.get_index(0))
            .and_then(SqlValue::as_i64)
            .is_some_and(|n| n > 0))
    }

    /// Creates the table.
    pub async fn create(&self, session: &mut Session) -> Result<()> {
        info!(table = %self.table, "Creating migrator metadata table");
        let sql = format!("CREATE TABLE {} (version TEXT PRIMARY KEY)", self.table);
        session.execute_raw(&sql, &[]).await?;
        Ok(())
    }

    /// Returns the greatest applied version.
    pub async fn latest(&self, session: &mut Session) -> Result<Option<String>> {
        let sql = format!("SELECT MAX(version) AS version FROM {}", self.table);
        let rows = session.execute_raw(&sql, &[]).await?;
        Ok(rows
            .first()
            .and_then(|r| r.get_str("version"))
            .map(str::to_string))
    }

    /// Returns every applied version, ascending.
    pub async fn applied(&self, session: &mut Session) -> Result<Vec<String>> {
        let sql = format!("SELECT version FROM {} ORDER BY version ASC", self.table);
        let rows = session.execute_raw(&sql, &[]).await?;
        Ok(versions(rows))
    }

    /// Returns applied versions strictly greater than `version`, descending.
    pub async fn applied_after(&self, session: &mut Session, version: &str) -> Result<Vec<String>> {
        let sql = format!(
            "SELECT version FROM {} WHERE version > :version ORDER BY version DESC",
            self.table
        );
        let rows = session
            .execute(&sql, &Bindings::new().bind("version", version))
            .await?;
        Ok(versions(rows))
    }

    /// Checks whether a version is recorded.
    pub async fn is_applied(&self, session: &mut Session, version: &str) -> Result<bool> {
        let sql = format!("SELECT 1 AS found FROM {} WHERE version = :version", self.table);
        let rows = session
            .execute(&sql, &Bindings::new().bind("version", version))
            .await?;
        Ok(!rows.is_empty())
    }

    /// Records a version as applied.
    pub async fn record_applied(&self, session: &mut Session, version: &str) -> Result<()> {
        let sql = format!("INSERT INTO {} (version) VALUES (:version)", self.table);
        session
            .execute(&sql, &Bindings::new().bind("version", version))
            .await?;
        Ok(())
    }

    /// Removes the record of a reverted version.
    pub async fn record_reverted(&self, session: &mut Session, version: &str) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE version = :version", self.table);
        let result = session
            .execute(&sql, &Bindings::new().bind("version", version))
            .await?;

        if result.rows_affected == 0 {
            return Err(MigrateError::MigrationNotFound(version.to_string()));
        }

        Ok(())
    }
}

fn versions(rows: RowSet) -> Vec<String> {
    rows.into_iter()
        .filter_map(|r| r.get_str("version").map(str::to_string))
        .collect()
}

fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use migdb_sql::SessionOptions;

    async fn create_test_session() -> Session {
        Session::connect("sqlite::memory:", &SessionOptions::default().max_connections(1))
            .await
            .expect("Failed to create in-memory SQLite session")
    }

    #[tokio::test]
    async fn test_create_and_exists() {
        let mut session = create_test_session().await;
        let store = MetadataStore::new();

        assert!(!store.exists(&mut session).await.unwrap());
        store.create(&mut session).await.unwrap();
        assert!(store.exists(&mut session).await.unwrap());
    }

    #[tokio::test]
    async fn test_record_and_check_applied() {
        let mut session = create_test_session().await;
        let store = MetadataStore::new();
        store.create(&mut session).await.unwrap();

        // Initially not applied
        assert!(!store.is_applied(&mut session, "20230101-a").await.unwrap());
        assert_eq!(store.latest(&mut session).await.unwrap(), None);

        store.record_applied(&mut session, "20230101-a").await.unwrap();
        assert!(store.is_applied(&mut session, "20230101-a").await.unwrap());
    }

    #[tokio::test]
    async fn test_latest_and_ordering() {
        let mut session = create_test_session().await;
        let store = MetadataStore::new();
        store.create(&mut session).await.unwrap();

        for version in ["20230102-b", "20230101-a", "20230103-c"] {
            store.record_applied(&mut session, version).await.unwrap();
        }

        assert_eq!(
            store.latest(&mut session).await.unwrap().as_deref(),
            Some("20230103-c")
        );
        assert_eq!(
            store.applied(&mut session).await.unwrap(),
            vec!["20230101-a", "20230102-b", "20230103-c"]
        );
        assert_eq!(
            store.applied_after(&mut session, "20230101-a").await.unwrap(),
            vec!["20230103-c", "20230102-b"]
        );
        assert!(store
            .applied_after(&mut session, "20230103-c")
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_record_is_rejected() {
        let mut session = create_test_session().await;
        let store = MetadataStore::new();
        store.create(&mut session).await.unwrap();

        store.record_applied(&mut session, "20230101-a").await.unwrap();
        assert!(store.record_applied(&mut session, "20230101-a").await.is_err());
    }

    #[tokio::test]
    async fn test_record_reverted() {
        let mut session = create_test_session().await;
        let store = MetadataStore::new();
        store.create(&mut session).await.unwrap();

        store.record_applied(&mut session, "20230101-a").await.unwrap();
        store.record_reverted(&mut session, "20230101-a").await.unwrap();
        assert!(!store.is_applied(&mut session, "20230101-a").await.unwrap());

        let err = store
            .record_reverted(&mut session, "20230101-a")
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::MigrationNotFound(v) if v == "20230101-a"));
    }

    #[test]
    fn test_table_name_validation() {
        assert!(MetadataStore::with_table("schema_versions").is_ok());
        assert!(MetadataStore::with_table("_meta2").is_ok());
        assert!(matches!(
            MetadataStore::with_table("meta; DROP TABLE x"),
            Err(MigrateError::InvalidTableName(_))
        ));
        assert!(MetadataStore::with_table("").is_err());
        assert!(MetadataStore::with_table("2meta").is_err());
    }
}
