//! # migdb-sql
//!
//! Statement plumbing for the migdb migration runner.
//!
//! This crate provides:
//! - Named parameter translation (`:name` markers to numbered placeholders)
//! - Bulk statements that expand a single `:VALUES` marker from a row set,
//!   with sub-queries inlined per cell
//! - Sessions over a pool or a dedicated transactional connection
//! - Connection acquisition with bounded retry
//!
//! ## Named parameters
//!
//! ```rust
//! use migdb_sql::{Bindings, Dialect, translate};
//!
//! let (sql, values) = translate(
//!     "UPDATE users SET name = :name WHERE id = :id",
//!     &Bindings::new().bind("id", 1).bind("name", "bob"),
//!     Dialect::Sqlite,
//! )
//! .unwrap();
//!
//! assert_eq!(sql, "UPDATE users SET name = ?1 WHERE id = ?2");
//! assert_eq!(values.len(), 2);
//! ```
//!
//! ## Bulk statements
//!
//! ```rust
//! use migdb_sql::{compile_bulk, row, Dialect, SubStatement};
//!
//! let rows = vec![
//!     row![SubStatement::new("SELECT id FROM job WHERE name = $1").bind("Chef"), "Gordon"],
//!     row![None::<i64>, "Jobless"],
//! ];
//! let (sql, values) = compile_bulk(
//!     "INSERT INTO person (job_id, name) :VALUES",
//!     &rows,
//!     Dialect::Postgres,
//! )
//! .unwrap();
//!
//! assert_eq!(
//!     sql,
//!     "INSERT INTO person (job_id, name) VALUES ((SELECT id FROM job WHERE name = $1), $2), ($3, $4)"
//! );
//! assert_eq!(values.len(), 4);
//! ```

pub mod acquire;
pub mod binding;
pub mod bulk;
pub mod dialect;
pub mod error;
pub mod row;
pub mod session;
pub mod substatement;
pub mod template;
pub mod value;

pub use acquire::{acquire, AcquireOptions};
pub use binding::{translate, Bindings};
pub use bulk::{compile_bulk, BulkTemplate, Cell};
pub use dialect::Dialect;
pub use error::{Error, Result};
pub use row::{Row, RowSet};
pub use session::{Session, SessionOptions};
pub use substatement::SubStatement;
pub use value::{SqlValue, ToSqlValue};
