use engine_server::config::{Config, DatabaseConfig, LogFormat, LoggingConfig, OrchestratorConfig, ServerConfig};
use engine_server::setup::{create_store, ensure_database_directory, initialize_app};
use std::env;
use tempfile::TempDir;

fn config_with(url: Option<String>, port: u16, workers: usize) -> Config {
    config_with_addr(url, "127.0.0.1", port, workers)
}

fn config_with_addr(url: Option<String>, listen_addr: &str, port: u16, workers: usize) -> Config {
    Config {
        database: DatabaseConfig { url, max_connections: 5, connection_timeout: 30 },
        server: ServerConfig { listen_addr: listen_addr.to_string(), port, workers },
        logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Pretty },
        orchestrator: OrchestratorConfig {
            worker_pool_size: 4,
            reconcile_interval_seconds: 30,
            heartbeat_interval_seconds: 15,
            lease_duration_minutes: 30,
        },
    }
}

#[tokio::test]
async fn test_server_startup_with_sqlite() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with(Some(database_url), 3000, 4);
    let store = create_store(&config).await;
    assert!(store.is_ok(), "Failed to create store: {:?}", store.err());
}

#[test]
fn test_configuration_loading() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.server.listen_addr, "127.0.0.1");
    assert_eq!(config.server.port, 3000);
}

#[test]
fn test_environment_overrides() {
    env::set_var("DATABASE_URL", "sqlite://test_env.db");
    env::set_var("LISTEN_ADDR", "0.0.0.0");
    env::set_var("LOG_LEVEL", "debug");

    let config = Config::default().merge_with_env().unwrap();

    assert_eq!(config.database.url, Some("sqlite://test_env.db".to_string()));
    assert_eq!(config.server.listen_addr, "0.0.0.0");
    assert_eq!(config.logging.level, "debug");

    env::remove_var("DATABASE_URL");
    env::remove_var("LISTEN_ADDR");
    env::remove_var("LOG_LEVEL");
}

#[test]
fn test_default_database_path_creation() {
    let config = Config::default();
    let url = config.database_url();
    assert!(url.starts_with("sqlite://"));
    assert!(url.contains(".tx/orchestrator.sqlite"));
}

#[test]
fn test_database_directory_creation() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("subdir").join("test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let result = ensure_database_directory(&database_url);
    assert!(result.is_ok());
    assert!(db_path.parent().unwrap().exists());
}

#[test]
fn test_config_validation_errors() {
    let mut config = Config::default();

    config.logging.level = "invalid".to_string();
    assert!(config.validate().is_err());

    config.logging.level = "info".to_string();
    config.database.url = Some("postgres://invalid".to_string());
    assert!(config.validate().is_err());

    config.database.url = None;
    config.server.port = 0;
    assert!(config.validate().is_err());

    config.server.port = 3000;
    config.server.workers = 0;
    assert!(config.validate().is_err());

    config.server.workers = 4;
    config.database.max_connections = 0;
    assert!(config.validate().is_err());

    config.database.max_connections = 5;
    config.orchestrator.worker_pool_size = 0;
    assert!(config.validate().is_err());
}

#[test]
fn test_server_address_formatting() {
    let config = config_with_addr(None, "0.0.0.0", 8080, 2);
    assert_eq!(config.server_address(), "0.0.0.0:8080");
}

#[tokio::test]
async fn test_store_creation_with_migrations() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("migration_test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with(Some(database_url), 3000, 4);
    let store = create_store(&config).await;
    assert!(store.is_ok());
    assert!(db_path.exists());
}

#[tokio::test]
async fn test_multiple_store_instances() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("multi_test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with(Some(database_url), 3000, 4);
    let store1 = create_store(&config).await;
    let store2 = create_store(&config).await;

    assert!(store1.is_ok());
    assert!(store2.is_ok());
}

#[tokio::test]
async fn test_initialize_app_serves_ready_tasks() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("app_test.db");
    let database_url = format!("sqlite://{}", db_path.display());

    let config = config_with(Some(database_url), 3000, 4);
    let state = initialize_app(&config).await.unwrap();

    let created = state
        .tasks
        .create(orchestrator_core::NewTask { title: "explore the ready set".into(), ..Default::default() })
        .await
        .unwrap();
    let ready = state.ready.ready(-1).await.unwrap();
    assert!(ready.iter().any(|t| t.id == created.id));
}
