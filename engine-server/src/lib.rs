//! Orchestration Engine Server Library
//!
//! This library provides the binary-level glue for the task orchestration
//! engine: layered configuration, telemetry init, and application setup
//! (connecting the store, assembling `engine-protocol`'s `AppState`, and
//! handing both to `main.rs` to serve).

pub mod config;
pub mod setup;
pub mod telemetry;

pub use config::Config;
pub use setup::{create_app_state, create_store, ensure_database_directory, initialize_app};
pub use telemetry::init_telemetry;
