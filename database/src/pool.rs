//! Connection setup and migrations: WAL journal mode for file-backed
//! databases, a memory journal for `:memory:`, `busy_timeout(5s)`, and
//! `foreign_keys(true)` on every connection.

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{migrate::MigrateDatabase, Sqlite, SqlitePool};

use orchestrator_core::{OrchestratorError, Result};

/// Opens (creating if necessary) a SQLite database and applies every
/// pending migration under `migrations/sqlite`.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let db_url = if database_url.starts_with(":memory:") {
        database_url.to_string()
    } else if database_url.starts_with("sqlite://") {
        database_url.to_string()
    } else {
        format!("sqlite://{database_url}")
    };

    if !db_url.contains(":memory:") && !Sqlite::database_exists(&db_url).await.unwrap_or(false) {
        Sqlite::create_database(&db_url)
            .await
            .map_err(|e| OrchestratorError::database(format!("failed to create database: {e}")))?;
    }

    let is_memory = db_url.contains(":memory:");
    let connect_options = if is_memory {
        SqliteConnectOptions::new()
            .filename(&db_url)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Memory)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
    } else {
        SqliteConnectOptions::new()
            .filename(db_url.replace("sqlite://", ""))
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .foreign_keys(true)
    };

    // A bare `:memory:` filename opens a fresh, unrelated database per
    // connection; capping the pool at one connection keeps every caller
    // talking to the same database instead of sharding state across the
    // pool. File-backed databases don't have this problem and keep a
    // real multi-connection pool under WAL.
    let pool_options = if is_memory { SqlitePoolOptions::new().max_connections(1) } else { SqlitePoolOptions::new() };

    let pool = pool_options
        .connect_with(connect_options)
        .await
        .map_err(OrchestratorError::database)?;

    sqlx::migrate!("./migrations/sqlite")
        .run(&pool)
        .await
        .map_err(|e| OrchestratorError::database(format!("migration failed: {e}")))?;

    Ok(pool)
}
