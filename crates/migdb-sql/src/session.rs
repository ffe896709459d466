//! Statement execution and transaction demarcation.
//!
//! A [`Session`] wraps either a connection pool or one dedicated transactional
//! connection. Pooled sessions hand out transactional sessions through
//! [`Session::begin`] and [`Session::transact`]; a transactional session owns its
//! connection until `commit`, `rollback` or drop releases it. Since `commit` and
//! `rollback` consume the session, a released connection cannot be used again.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::TryStreamExt;
use sqlx::any::AnyPoolOptions;
use sqlx::{Any, AnyPool, Either, Executor, Transaction};
use tracing::{debug, error, warn};

use crate::binding::{translate, Bindings};
use crate::bulk::{chunks, BulkTemplate, Cell};
use crate::dialect::Dialect;
use crate::error::{Error, Result};
use crate::row::{Row, RowSet};
use crate::value::{bind_param, SqlValue};

/// Options used when opening a pooled session.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound on pooled connections. In-memory SQLite databases are
    /// per-connection, so they need `1`.
    pub max_connections: u32,
    /// Log every statement and its values at debug level.
    pub log_statements: bool,
    /// How long the pool waits for a connection before giving up.
    pub acquire_timeout: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_connections: 5,
            log_statements: false,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

impl SessionOptions {
    /// Sets the pool size.
    #[must_use]
    pub const fn max_connections(mut self, max_connections: u32) -> Self {
        self.max_connections = max_connections;
        self
    }

    /// Enables or disables statement logging.
    #[must_use]
    pub const fn log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Sets the pool acquire timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }
}

enum Connection {
    Pool(AnyPool),
    Transaction(Transaction<'static, Any>),
}

/// A database session.
pub struct Session {
    conn: Connection,
    dialect: Dialect,
    log_statements: bool,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("dialect", &self.dialect)
            .field("transactional", &self.is_transactional())
            .field("log_statements", &self.log_statements)
            .finish()
    }
}

impl Session {
    /// Opens a pooled session for a connection URL.
    pub async fn connect(url: &str, options: &SessionOptions) -> Result<Self> {
        sqlx::any::install_default_drivers();
        let dialect = Dialect::from_url(url)?;
        let pool = AnyPoolOptions::new()
            .max_connections(options.max_connections)
            .acquire_timeout(options.acquire_timeout)
            .connect(url)
            .await?;
        Ok(Self::from_pool(pool, dialect).log_statements(options.log_statements))
    }

    /// Wraps an existing pool.
    #[must_use]
    pub const fn from_pool(pool: AnyPool, dialect: Dialect) -> Self {
        Self {
            conn: Connection::Pool(pool),
            dialect,
            log_statements: false,
        }
    }

    /// Enables or disables statement logging.
    #[must_use]
    pub const fn log_statements(mut self, enabled: bool) -> Self {
        self.log_statements = enabled;
        self
    }

    /// Returns the session dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Returns true for a session bound to one transactional connection.
    #[must_use]
    pub const fn is_transactional(&self) -> bool {
        matches!(self.conn, Connection::Transaction(_))
    }

    /// Executes a template with named markers.
    pub async fn execute(&mut self, template: &str, bindings: &Bindings) -> Result<RowSet> {
        let (statement, values) = translate(template, bindings, self.dialect).map_err(|e| {
            error!(statement = %template, bindings = ?bindings, error = %e, "Failed to bind statement");
            e
        })?;
        self.run(&statement, values).await
    }

    /// Executes a statement that already uses positional placeholders.
    ///
    /// Without values the statement goes through the simple query path, so a
    /// script holding several statements runs in one call.
    pub async fn execute_raw(&mut self, statement: &str, values: &[SqlValue]) -> Result<RowSet> {
        self.run(statement, values.to_vec()).await
    }

    /// Executes a bulk template over `rows`, `chunk_size` rows per statement.
    ///
    /// A `chunk_size` of 0 sends every row in one statement. Returned rows are
    /// concatenated in input order, the column description comes from the
    /// first chunk, and `rows_affected` is the total over all chunks.
    pub async fn execute_bulk(
        &mut self,
        template: &str,
        rows: &[Vec<Cell>],
        chunk_size: usize,
    ) -> Result<RowSet> {
        let bulk = BulkTemplate::parse(template).map_err(|e| {
            error!(statement = %template, rows = rows.len(), error = %e, "Failed to parse bulk statement");
            e
        })?;

        let mut result = RowSet::default();
        for chunk in chunks(rows, chunk_size) {
            let (statement, values) = bulk.compile(chunk, self.dialect).map_err(|e| {
                error!(statement = %template, rows = ?chunk, error = %e, "Failed to compile bulk statement");
                e
            })?;
            result.extend(self.run(&statement, values).await?);
        }
        Ok(result)
    }

    /// Starts a transaction on a dedicated connection from the pool.
    pub async fn begin(&mut self) -> Result<Self> {
        let pool = match &self.conn {
            Connection::Pool(pool) => pool,
            Connection::Transaction(_) => return Err(Error::NestedTransaction),
        };
        let tx = pool.begin().await?;
        Ok(Self {
            conn: Connection::Transaction(tx),
            dialect: self.dialect,
            log_statements: self.log_statements,
        })
    }

    /// Commits the transaction and releases its connection.
    pub async fn commit(self) -> Result<()> {
        self.into_transaction()?.commit().await?;
        Ok(())
    }

    /// Rolls back the transaction and releases its connection.
    pub async fn rollback(self) -> Result<()> {
        self.into_transaction()?.rollback().await?;
        Ok(())
    }

    /// Runs `body` inside a transaction.
    ///
    /// Commits when `body` succeeds. When it fails the transaction is rolled
    /// back and the failure is returned wrapped in [`Error::Transaction`]. The
    /// connection is released exactly once on every path.
    ///
    /// ```rust,no_run
    /// # async fn example(session: &mut migdb_sql::Session) -> migdb_sql::Result<()> {
    /// use migdb_sql::Bindings;
    ///
    /// session
    ///     .transact(|tx| {
    ///         Box::pin(async move {
    ///             tx.execute("INSERT INTO t (a) VALUES (:a)", &Bindings::new().bind("a", 1))
    ///                 .await?;
    ///             Ok::<_, migdb_sql::Error>(())
    ///         })
    ///     })
    ///     .await
    /// # }
    /// ```
    pub async fn transact<T, F>(&mut self, body: F) -> Result<T>
    where
        F: for<'t> FnOnce(&'t mut Session) -> BoxFuture<'t, Result<T>>,
    {
        let mut tx = self.begin().await?;
        match body(&mut tx).await {
            Ok(value) => {
                tx.commit().await.map_err(|e| Error::Transaction {
                    source: Box::new(e),
                    rollback_error: None,
                })?;
                Ok(value)
            }
            Err(e) => {
                let rollback_error = match tx.into_transaction() {
                    Ok(tx) => tx.rollback().await.err(),
                    Err(_) => None,
                };
                if let Some(rollback) = &rollback_error {
                    error!(error = %rollback, "Rollback failed");
                } else {
                    warn!(error = %e, "Transaction rolled back");
                }
                Err(Error::Transaction {
                    source: Box::new(e),
                    rollback_error,
                })
            }
        }
    }

    /// Closes the pool, or rolls back an open transaction.
    pub async fn close(self) -> Result<()> {
        match self.conn {
            Connection::Pool(pool) => {
                pool.close().await;
                Ok(())
            }
            Connection::Transaction(tx) => {
                tx.rollback().await?;
                Ok(())
            }
        }
    }

    fn into_transaction(self) -> Result<Transaction<'static, Any>> {
        match self.conn {
            Connection::Transaction(tx) => Ok(tx),
            Connection::Pool(_) => Err(Error::NotInTransaction),
        }
    }

    async fn run(&mut self, statement: &str, values: Vec<SqlValue>) -> Result<RowSet> {
        if self.log_statements {
            debug!(statement = %statement, values = ?values, "Executing statement");
        }

        let outcome = match &mut self.conn {
            Connection::Pool(pool) => fetch(&*pool, statement, &values).await,
            Connection::Transaction(tx) => fetch(&mut **tx, statement, &values).await,
        };

        outcome.map_err(|source| {
            error!(statement = %statement, values = ?values, error = %source, "Statement failed");
            Error::from_statement(statement.to_string(), values, source)
        })
    }
}

async fn fetch<'e, E>(
    executor: E,
    statement: &'e str,
    values: &'e [SqlValue],
) -> std::result::Result<RowSet, sqlx::Error>
where
    E: Executor<'e, Database = Any>,
{
    let mut stream = if values.is_empty() {
        executor.fetch_many(statement)
    } else {
        let query = values
            .iter()
            .cloned()
            .fold(sqlx::query(statement), bind_param);
        executor.fetch_many(query)
    };

    let mut result = RowSet {
        statements: 1,
        ..RowSet::default()
    };
    while let Some(step) = stream.try_next().await? {
        match step {
            Either::Left(done) => result.rows_affected += done.rows_affected(),
            Either::Right(row) => {
                let row = Row::from_any(&row)?;
                if result.columns.is_none() {
                    result.columns = Some(row.shared_columns());
                }
                result.rows.push(row);
            }
        }
    }
    Ok(result)
}
