//! HTTP read/write surface (§6).
//!
//! `engine-protocol` is the axum layer between `engine-server`'s binary and
//! `orchestrator-runtime`'s services: request/response DTOs
//! ([`serialization`]), pagination cursors ([`cursor`]), error-to-status
//! mapping ([`error`]), route handlers ([`handler`]), and router/state
//! assembly ([`server`]) — a plain REST surface, since the dashboard/CLI/
//! worker clients this engine serves speak HTTP+JSON, not JSON-RPC.

pub mod cursor;
pub mod error;
pub mod handler;
pub mod serialization;
pub mod server;

pub use error::{ApiError, ApiResult};
pub use server::{build_router, AppState, Store};
