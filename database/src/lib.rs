//! `orchestrator-db`: the SQLite implementation of every repository trait
//! in `orchestrator-core`.
//!
//! A single [`SqliteStore`] implements all ten traits over one connection
//! pool — one struct, cheaply `Clone`d (the pool is an `Arc` internally),
//! constructed once and shared behind `Arc` by the services in
//! `orchestrator-runtime`.
//!
//! Anything that needs a single atomic transaction — claim contention,
//! worker-registration admission control — is implemented here rather than
//! in a runtime service, since only this layer can see the transaction
//! boundary.

mod attempts;
mod candidates;
mod claims;
mod dependencies;
mod hierarchy;
mod labels;
mod learnings;
mod pool;
mod rows;
mod state;
mod tasks;
mod workers;

use sqlx::SqlitePool;

use orchestrator_core::Result;

/// SQLite-backed implementation of every repository trait, ready to be
/// wrapped in `Arc` and handed to `orchestrator-runtime` services.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects (creating the database file if needed) and runs every
    /// pending migration under `migrations/sqlite`.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = pool::connect(database_url).await?;
        Ok(Self { pool })
    }

    /// Access to the underlying pool, for integration tests that need raw
    /// SQL beyond the repository traits.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
