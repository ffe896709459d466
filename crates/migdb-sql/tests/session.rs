use migdb_sql::{
    row, Bindings, Cell, Dialect, Error, Session, SessionOptions, SqlValue, SubStatement,
};

async fn memory_session() -> Session {
    Session::connect("sqlite::memory:", &SessionOptions::default().max_connections(1))
        .await
        .unwrap()
}

async fn people_session() -> Session {
    let mut session = memory_session().await;
    session
        .execute_raw(
            "CREATE TABLE job (id INTEGER PRIMARY KEY, name TEXT NOT NULL UNIQUE, type TEXT);
             CREATE TABLE person (
                 id INTEGER PRIMARY KEY,
                 job_id INTEGER REFERENCES job (id),
                 first_name TEXT NOT NULL,
                 last_name TEXT NOT NULL
             );",
            &[],
        )
        .await
        .unwrap();
    session
}

async fn count(session: &mut Session, table: &str) -> i64 {
    let rows = session
        .execute_raw(&format!("SELECT COUNT(*) AS n FROM {table}"), &[])
        .await
        .unwrap();
    rows.first().and_then(|r| r.get_i64("n")).unwrap()
}

#[tokio::test]
async fn test_connect_picks_dialect() {
    let session = memory_session().await;
    assert_eq!(session.dialect(), Dialect::Sqlite);
    assert!(!session.is_transactional());
}

#[tokio::test]
async fn test_execute_with_named_bindings() {
    let mut session = people_session().await;

    let inserted = session
        .execute(
            "INSERT INTO job (name, type) VALUES (:name, :type)",
            &Bindings::new().bind("name", "Chef").bind("type", "Food"),
        )
        .await
        .unwrap();
    assert_eq!(inserted.rows_affected, 1);
    assert_eq!(inserted.statements, 1);

    let rows = session
        .execute(
            "SELECT name, type FROM job WHERE name = :name OR type = :name",
            &Bindings::new().bind("name", "Chef"),
        )
        .await
        .unwrap();
    assert_eq!(rows.len(), 1);
    let job = rows.first().unwrap();
    assert_eq!(job.get_str("name"), Some("Chef"));
    assert_eq!(job.get_str("type"), Some("Food"));
}

#[tokio::test]
async fn test_unknown_binding_never_reaches_the_database() {
    let mut session = people_session().await;
    let err = session
        .execute(
            "INSERT INTO job (name, type) VALUES (:name, :type)",
            &Bindings::new().bind("name", "Chef"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnknownBinding { ref name, .. } if name == "type"));
    assert_eq!(count(&mut session, "job").await, 0);
}

#[tokio::test]
async fn test_null_and_blob_values() {
    let mut session = memory_session().await;
    session
        .execute_raw("CREATE TABLE t (a INTEGER, b BLOB, c REAL)", &[])
        .await
        .unwrap();
    session
        .execute(
            "INSERT INTO t (a, b, c) VALUES (:a, :b, :c)",
            &Bindings::new()
                .bind("a", None::<i64>)
                .bind("b", vec![1u8, 2, 3])
                .bind("c", 1.5),
        )
        .await
        .unwrap();

    let rows = session.execute_raw("SELECT a, b, c FROM t", &[]).await.unwrap();
    let r = rows.first().unwrap();
    assert_eq!(r.get("a"), Some(&SqlValue::Null));
    assert_eq!(r.get("b"), Some(&SqlValue::Blob(vec![1, 2, 3])));
    assert_eq!(r.get("c"), Some(&SqlValue::Float(1.5)));
}

#[tokio::test]
async fn test_bulk_chunking_preserves_row_order() {
    let mut session = people_session().await;
    let rows: Vec<Vec<Cell>> = ["Police", "Chef", "Programmer", "Pilot", "Nurse"]
        .iter()
        .map(|name| row![*name, "Any"])
        .collect();

    let result = session
        .execute_bulk(
            "INSERT INTO job (name, type) :VALUES RETURNING name",
            &rows,
            2,
        )
        .await
        .unwrap();

    assert_eq!(result.statements, 3);
    assert_eq!(result.rows_affected, 5);
    let names: Vec<&str> = result.rows.iter().filter_map(|r| r.get_str("name")).collect();
    assert_eq!(names, vec!["Police", "Chef", "Programmer", "Pilot", "Nurse"]);
    assert_eq!(result.columns.as_deref(), Some(&["name".to_string()][..]));
}

#[tokio::test]
async fn test_bulk_chunk_size_one() {
    let mut session = people_session().await;
    let result = session
        .execute_bulk(
            "INSERT INTO job (name, type) :VALUES RETURNING id",
            &[row!["Police", "Govt"], row!["Chef", "Food"]],
            1,
        )
        .await
        .unwrap();
    assert_eq!(result.statements, 2);
    let ids: Vec<i64> = result.rows.iter().filter_map(|r| r.get_i64("id")).collect();
    assert_eq!(ids, vec![1, 2]);
}

#[tokio::test]
async fn test_bulk_with_sub_statements() {
    let mut session = people_session().await;
    session
        .execute_bulk(
            "INSERT INTO job (name, type) :VALUES",
            &[
                row!["Police", "Govt"],
                row!["Chef", "Food"],
                row!["Programmer", "Tech"],
            ],
            0,
        )
        .await
        .unwrap();

    let job_id = |name: &str| SubStatement::new("SELECT id FROM job WHERE name = ?1").bind(name);
    let result = session
        .execute_bulk(
            "INSERT INTO person (job_id, first_name, last_name) :VALUES",
            &[
                row![job_id("Chef"), "Gordon", "Ramsey"],
                row![job_id("Programmer"), "Cow", "Man"],
                row![None::<i64>, "Jobless", "Person"],
            ],
            0,
        )
        .await
        .unwrap();
    assert_eq!(result.statements, 1);
    assert_eq!(result.rows_affected, 3);

    let rows = session
        .execute_raw(
            "SELECT p.first_name AS first_name, j.name AS job
             FROM person p LEFT JOIN job j ON j.id = p.job_id
             ORDER BY p.id",
            &[],
        )
        .await
        .unwrap();
    let pairs: Vec<(&str, Option<&str>)> = rows
        .rows
        .iter()
        .map(|r| (r.get_str("first_name").unwrap(), r.get_str("job")))
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("Gordon", Some("Chef")),
            ("Cow", Some("Programmer")),
            ("Jobless", None)
        ]
    );
}

#[tokio::test]
async fn test_chunked_bulk_with_sub_statements() {
    let mut session = people_session().await;
    session
        .execute_bulk(
            "INSERT INTO job (name, type) :VALUES",
            &[row!["Police", "Govt"], row!["Chef", "Food"], row!["Pilot", "Air"]],
            0,
        )
        .await
        .unwrap();

    let job_id = |name: &str| SubStatement::new("SELECT id FROM job WHERE name = ?1").bind(name);
    let result = session
        .execute_bulk(
            "INSERT INTO person (job_id, first_name, last_name) :VALUES RETURNING first_name",
            &[
                row![job_id("Pilot"), "Amelia", "Earhart"],
                row![job_id("Police"), "Frank", "Serpico"],
                row![job_id("Chef"), "Julia", "Child"],
            ],
            2,
        )
        .await
        .unwrap();
    assert_eq!(result.statements, 2);
    assert_eq!(result.rows_affected, 3);
    let names: Vec<&str> = result.rows.iter().filter_map(|r| r.get_str("first_name")).collect();
    assert_eq!(names, vec!["Amelia", "Frank", "Julia"]);

    let rows = session
        .execute_raw(
            "SELECT p.first_name AS first_name, j.name AS job
             FROM person p JOIN job j ON j.id = p.job_id
             ORDER BY p.id",
            &[],
        )
        .await
        .unwrap();
    let pairs: Vec<(&str, &str)> = rows
        .rows
        .iter()
        .map(|r| (r.get_str("first_name").unwrap(), r.get_str("job").unwrap()))
        .collect();
    assert_eq!(
        pairs,
        vec![("Amelia", "Pilot"), ("Frank", "Police"), ("Julia", "Chef")]
    );
}

#[tokio::test]
async fn test_unsupported_column_type_names_the_column() {
    let mut session = memory_session().await;
    session
        .execute_raw(
            "CREATE TABLE event (at DATETIME); INSERT INTO event VALUES ('2023-01-01 00:00:00');",
            &[],
        )
        .await
        .unwrap();

    let err = session.execute_raw("SELECT at FROM event", &[]).await.unwrap_err();
    match &err {
        Error::UnsupportedColumnType { column, .. } => assert_eq!(column, "at"),
        other => panic!("Expected unsupported column type, got {other:?}"),
    }
    assert_eq!(err.statement(), Some("SELECT at FROM event"));

    let rows = session
        .execute_raw("SELECT CAST(at AS TEXT) AS at FROM event", &[])
        .await
        .unwrap();
    assert_eq!(rows.first().and_then(|r| r.get_str("at")), Some("2023-01-01 00:00:00"));
}

#[tokio::test]
async fn test_empty_bulk_executes_nothing() {
    let mut session = people_session().await;
    let result = session
        .execute_bulk("INSERT INTO job (name, type) :VALUES", &[], 10)
        .await
        .unwrap();
    assert_eq!(result.statements, 0);
    assert!(result.is_empty());
}

#[tokio::test]
async fn test_statement_error_carries_statement_and_values() {
    let mut session = people_session().await;
    let err = session
        .execute(
            "INSERT INTO missing_table (a) VALUES (:a)",
            &Bindings::new().bind("a", 7),
        )
        .await
        .unwrap_err();
    match err {
        Error::Statement {
            statement, values, ..
        } => {
            assert_eq!(statement, "INSERT INTO missing_table (a) VALUES (?1)");
            assert_eq!(values, vec![SqlValue::Int(7)]);
        }
        other => panic!("Expected statement error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_transact_commits() {
    let mut session = people_session().await;
    let name = String::from("Chef");
    let id = session
        .transact(move |tx| {
            Box::pin(async move {
                let rows = tx
                    .execute(
                        "INSERT INTO job (name) VALUES (:name) RETURNING id",
                        &Bindings::new().bind("name", name),
                    )
                    .await?;
                Ok::<_, Error>(rows.first().and_then(|r| r.get_i64("id")))
            })
        })
        .await
        .unwrap();
    assert_eq!(id, Some(1));
    assert_eq!(count(&mut session, "job").await, 1);
}

#[tokio::test]
async fn test_transact_rolls_back_on_failure() {
    let mut session = people_session().await;
    let err = session
        .transact(|tx| {
            Box::pin(async move {
                tx.execute(
                    "INSERT INTO job (name) VALUES (:name)",
                    &Bindings::new().bind("name", "Chef"),
                )
                .await?;
                tx.execute(
                    "INSERT INTO job (name) VALUES (:name)",
                    &Bindings::new().bind("name", "Chef"),
                )
                .await?;
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();

    match &err {
        Error::Transaction {
            source,
            rollback_error,
        } => {
            assert!(rollback_error.is_none());
            assert!(matches!(**source, Error::Statement { .. }));
        }
        other => panic!("Expected transaction error, got {other:?}"),
    }
    assert!(err.statement().is_some());
    assert_eq!(count(&mut session, "job").await, 0);
}

#[tokio::test]
async fn test_transact_rolls_back_on_abort() {
    let mut session = people_session().await;
    let err = session
        .transact(|tx| {
            Box::pin(async move {
                tx.execute_raw("INSERT INTO job (name) VALUES ('Chef')", &[])
                    .await?;
                Err::<(), _>(Error::Aborted("changed my mind".into()))
            })
        })
        .await
        .unwrap_err();
    assert!(err.to_string().contains("changed my mind"));
    assert_eq!(count(&mut session, "job").await, 0);
}

#[tokio::test]
async fn test_explicit_begin_commit_and_rollback() {
    let mut session = people_session().await;

    let mut tx = session.begin().await.unwrap();
    assert!(tx.is_transactional());
    tx.execute_raw("INSERT INTO job (name) VALUES ('Police')", &[])
        .await
        .unwrap();
    tx.commit().await.unwrap();

    let mut tx = session.begin().await.unwrap();
    tx.execute_raw("INSERT INTO job (name) VALUES ('Chef')", &[])
        .await
        .unwrap();
    tx.rollback().await.unwrap();

    assert_eq!(count(&mut session, "job").await, 1);
}

#[tokio::test]
async fn test_nested_transaction_is_rejected() {
    let mut session = people_session().await;
    let mut tx = session.begin().await.unwrap();
    assert!(matches!(tx.begin().await, Err(Error::NestedTransaction)));
    tx.rollback().await.unwrap();
}

#[tokio::test]
async fn test_commit_outside_transaction_is_rejected() {
    let session = memory_session().await;
    assert!(matches!(session.commit().await, Err(Error::NotInTransaction)));
}

#[tokio::test]
async fn test_file_database_shares_pool_with_transaction() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
    let mut session = Session::connect(&url, &SessionOptions::default())
        .await
        .unwrap();
    session
        .execute_raw("CREATE TABLE t (a INTEGER)", &[])
        .await
        .unwrap();

    let mut tx = session.begin().await.unwrap();
    tx.execute("INSERT INTO t (a) VALUES (:a)", &Bindings::new().bind("a", 1))
        .await
        .unwrap();
    tx.commit().await.unwrap();

    assert_eq!(count(&mut session, "t").await, 1);
    session.close().await.unwrap();
}

#[tokio::test]
async fn test_failed_commit_releases_connection() {
    let dir = tempfile::tempdir().unwrap();
    let url = format!("sqlite://{}?mode=rwc", dir.path().join("fk.db").display());
    let mut session = Session::connect(&url, &SessionOptions::default().max_connections(1))
        .await
        .unwrap();
    session
        .execute_raw(
            "CREATE TABLE job (id INTEGER PRIMARY KEY);
             CREATE TABLE person (
                 id INTEGER PRIMARY KEY,
                 job_id INTEGER REFERENCES job (id) DEFERRABLE INITIALLY DEFERRED
             );",
            &[],
        )
        .await
        .unwrap();

    // The dangling reference is only checked at COMMIT.
    let err = session
        .transact(|tx| {
            Box::pin(async move {
                tx.execute_raw("INSERT INTO person (job_id) VALUES (999)", &[])
                    .await?;
                Ok::<_, Error>(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transaction { .. }));

    // With a single pooled connection this only succeeds if it was released.
    assert_eq!(count(&mut session, "person").await, 0);
}
