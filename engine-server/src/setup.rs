use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use engine_protocol::AppState;
use orchestrator_db::SqliteStore;

use crate::config::Config;

/// Connect to the store and run every pending migration.
pub async fn create_store(config: &Config) -> Result<Arc<SqliteStore>> {
    let database_url = config.database_url();
    info!(database_url = %database_url, "Connecting to store");

    let store = SqliteStore::connect(&database_url)
        .await
        .context("Failed to connect to the store")?;

    info!("Store connected and migrated");
    Ok(Arc::new(store))
}

/// Build the full service layer (`AppState`) over a connected store.
pub fn create_app_state(store: Arc<SqliteStore>) -> Arc<AppState<SqliteStore>> {
    Arc::new(AppState::new(store))
}

/// Connect the store and assemble the application state in one call.
pub async fn initialize_app(config: &Config) -> Result<Arc<AppState<SqliteStore>>> {
    info!("Initializing application");

    let store = create_store(config).await.context("Failed to create store")?;
    let state = create_app_state(store);

    info!("Application initialized successfully");
    Ok(state)
}

/// Ensure the database's parent directory exists using config
pub fn ensure_database_directory_from_config(config: &Config) -> Result<()> {
    let database_url = config.database_url();
    ensure_database_directory(&database_url)
}

/// Ensure the database's parent directory exists
pub fn ensure_database_directory(database_url: &str) -> Result<()> {
    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = std::path::Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                info!("Creating database directory: {}", parent.display());
                std::fs::create_dir_all(parent)
                    .context("Failed to create database directory")?;
            }
        }
    }
    Ok(())
}
