//! Example: Bulk inserts with correlated sub-queries
//!
//! Creates a `job` and a `person` table, fills `job` with one bulk statement,
//! then inserts people whose `job_id` is looked up by job name inside the same
//! statement.
//!
//! Run with: cargo run --example bulk_insert -p migdb
//!
//! Set `DATABASE_URL` to a `postgres://` URL to run against PostgreSQL; the
//! default is an in-memory SQLite database.

use migdb_sql::{row, Cell, Dialect, Session, SessionOptions, SubStatement};

const POSTGRES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS job (
    id BIGSERIAL PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS person (
    id BIGSERIAL PRIMARY KEY,
    job_id BIGINT REFERENCES job (id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    UNIQUE (first_name, last_name)
);";

const SQLITE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS job (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS person (
    id INTEGER PRIMARY KEY,
    job_id INTEGER REFERENCES job (id),
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    UNIQUE (first_name, last_name)
);";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).without_time().init();

    let url = std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite::memory:".to_string());
    let options = SessionOptions::default().max_connections(1).log_statements(true);
    let mut session = Session::connect(&url, &options).await?;

    let schema = match session.dialect() {
        Dialect::Postgres => POSTGRES_SCHEMA,
        Dialect::Sqlite => SQLITE_SCHEMA,
    };
    session.execute_raw(schema, &[]).await?;

    let jobs = session
        .execute_bulk(
            "INSERT INTO job (name, type)\n:VALUES\nON CONFLICT (name) DO NOTHING",
            &[
                row!["Police", "Govt"],
                row!["Fire fighter", "Govt"],
                row!["Chef", "Food"],
                row!["Programmer", "Tech"],
                row!["Data architect", "Tech"],
            ],
            2,
        )
        .await?;
    println!(
        "job: {} row(s) in {} statement(s)",
        jobs.rows_affected, jobs.statements
    );

    let job_lookup = format!(
        "SELECT id FROM job WHERE name = {}",
        session.dialect().placeholder(1)
    );
    let job_id = |name: &str| SubStatement::new(job_lookup.as_str()).bind(name);
    let people: Vec<Vec<Cell>> = vec![
        row![job_id("Chef"), "Gordon", "Ramsey"],
        row![job_id("Programmer"), "Cow", "Man"],
        row![None::<i64>, "Jobless", "Person"],
    ];
    let inserted = session
        .execute_bulk(
            "INSERT INTO person (job_id, first_name, last_name)\n:VALUES\nON CONFLICT (first_name, last_name) DO NOTHING",
            &people,
            0,
        )
        .await?;
    println!("person: {} row(s)", inserted.rows_affected);

    let rows = session
        .execute_raw(
            "SELECT p.first_name AS first_name, p.last_name AS last_name, j.name AS job
             FROM person p LEFT JOIN job j ON j.id = p.job_id
             ORDER BY p.id",
            &[],
        )
        .await?;
    for r in &rows.rows {
        println!(
            "  {} {}: {}",
            r.get_str("first_name").unwrap_or_default(),
            r.get_str("last_name").unwrap_or_default(),
            r.get_str("job").unwrap_or("(none)")
        );
    }

    session.close().await?;
    Ok(())
}
