#![cfg(feature = "sqlite")]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use dbsql::prelude::*;
use dbsql::{DbConnection, DbConnector, MigrationDriver, quote_literal};
use tempfile::{TempDir, tempdir};
use tokio_util::sync::CancellationToken;

/// Records every lock it takes in `lock_log`, so the escaped name can be read back.
fn logged_lock(name: &str) -> String {
    format!("INSERT INTO lock_log (name) VALUES ({})", quote_literal(name))
}

struct LoggingLockSqlite {
    inner: SqliteProvider,
    features: Features,
}

impl Provider for LoggingLockSqlite {
    fn name(&self) -> &str {
        "sqlite-logging-lock"
    }

    fn migrations_dir(&self) -> &str {
        "sqlite"
    }

    fn features(&self) -> &Features {
        &self.features
    }

    fn open(&self, url: &str) -> Result<DbConnector, DbError> {
        self.inner.open(url)
    }

    fn migration_driver(&self, conn: DbConnection) -> Result<Box<dyn MigrationDriver>, DbError> {
        self.inner.migration_driver(conn)
    }
}

fn schema(root: &Path) {
    let dir = root.join("sqlite");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("0001_init.up.sql"),
        "CREATE TABLE ledger (seq INTEGER PRIMARY KEY AUTOINCREMENT, account TEXT NOT NULL, amount INTEGER NOT NULL);
         CREATE TABLE lock_log (seq INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);",
    )
    .unwrap();
}

async fn ready_db(provider: Arc<dyn Provider>) -> Result<(Database, TempDir), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    schema(dir.path());
    let config = DbConfig::builder(format!("sqlite://{}", dir.path().join("groups.db").display()))
        .max_connections(4)
        .migrations(dir.path())
        .finish();
    let db = Database::new();
    db.init(&Context::background(), provider, Some(&config)).await?;
    Ok((db, dir))
}

fn entry(account: &str, amount: i64) -> InsertBuilder {
    InsertBuilder::into("ledger")
        .columns(["account", "amount"])
        .values([SqlValue::from(account), SqlValue::from(amount)])
}

#[tokio::test]
async fn group_commits_every_statement() -> Result<(), Box<dyn std::error::Error>> {
    let (db, _dir) = ready_db(Arc::new(SqliteProvider::new())).await?;
    let ctx = Context::background();

    let last = db
        .run_as_group(&ctx, |tx| {
            Box::pin(async move {
                tx.insert(entry("alice", -10), false).await?;
                let credit = tx.insert(entry("bob", 10), false).await?;
                assert_eq!(tx.count(&SelectBuilder::from("ledger")).await?, 2);
                Ok(credit.sequence)
            })
        })
        .await?;
    assert_eq!(last, Some(2));
    assert_eq!(db.count(&ctx, &SelectBuilder::from("ledger")).await?, 2);
    Ok(())
}

#[tokio::test]
async fn group_error_rolls_everything_back() -> Result<(), Box<dyn std::error::Error>> {
    let (db, _dir) = ready_db(Arc::new(SqliteProvider::new())).await?;
    let ctx = Context::background();

    let err = db
        .run_as_group(&ctx, |tx| {
            Box::pin(async move {
                tx.insert(entry("alice", -10), false).await?;
                Err::<(), _>(DbError::QueryError("insufficient funds".into()))
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::QueryError(ref m) if m == "insufficient funds"));
    assert_eq!(db.count(&ctx, &SelectBuilder::from("ledger")).await?, 0);

    // The connection went back to the pool without an open transaction.
    db.insert(&ctx, entry("carol", 5), false).await?;
    assert_eq!(db.count(&ctx, &SelectBuilder::from("ledger")).await?, 1);
    Ok(())
}

#[tokio::test]
async fn locking_without_a_lock_statement_is_refused() -> Result<(), Box<dyn std::error::Error>> {
    let (db, _dir) = ready_db(Arc::new(SqliteProvider::new())).await?;

    let err = db
        .with_lock(&Context::background(), "tenant-42", |_tx| {
            Box::pin(async move { Ok(()) })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::LockingUnsupported { ref provider } if provider == "sqlite"));
    Ok(())
}

#[tokio::test]
async fn lock_names_are_embedded_as_literals() -> Result<(), Box<dyn std::error::Error>> {
    let provider = LoggingLockSqlite {
        inner: SqliteProvider::new(),
        features: Features {
            acquire_lock: Some(logged_lock),
            ..*SqliteProvider::new().features()
        },
    };
    let (db, _dir) = ready_db(Arc::new(provider)).await?;
    let ctx = Context::background();
    let hostile = "tenant-42'); DROP TABLE ledger; --";

    let seen = db
        .with_lock(&ctx, hostile, |tx| {
            Box::pin(async move {
                tx.insert(entry("alice", 1), false).await?;
                tx.select_one(&SelectBuilder::from("lock_log").columns(["name"]))
                    .await
            })
        })
        .await?
        .expect("lock row");
    assert_eq!(seen.get("name").and_then(SqlValue::as_text), Some(hostile));
    assert_eq!(db.count(&ctx, &SelectBuilder::from("ledger")).await?, 1);

    // Released with the transaction: a second scope takes the lock again.
    db.with_lock(&ctx, "tenant-42", |_tx| Box::pin(async move { Ok(()) }))
        .await?;
    assert_eq!(db.count(&ctx, &SelectBuilder::from("lock_log")).await?, 2);
    Ok(())
}

#[tokio::test]
async fn cancelled_context_stops_work_but_not_the_database() -> Result<(), Box<dyn std::error::Error>> {
    let (db, _dir) = ready_db(Arc::new(SqliteProvider::new())).await?;

    let token = CancellationToken::new();
    token.cancel();
    let cancelled = Context::background().with_cancellation(token);
    let err = db
        .insert(&cancelled, entry("alice", 1), false)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Cancelled(_)));

    let token = CancellationToken::new();
    let ctx = Context::background().with_cancellation(token.clone());
    let err = db
        .run_as_group(&ctx, move |tx| {
            Box::pin(async move {
                tx.insert(entry("bob", 1), false).await?;
                token.cancel();
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Cancelled(_)));

    // The abandoned transaction was rolled back and the database still serves queries.
    let ctx = Context::background();
    assert_eq!(db.count(&ctx, &SelectBuilder::from("ledger")).await?, 0);
    assert_eq!(db.state(), DbState::Ready);
    Ok(())
}
