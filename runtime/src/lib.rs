//! Orchestrator runtime: constructor-injected service structs that sit
//! between the HTTP/CLI surface and the `orchestrator-core` repository
//! traits.
//!
//! Each service is generic over the repository trait(s) it needs rather
//! than boxed behind `dyn` — the concrete repository is `orchestrator-db`'s
//! `Sqlite*Repository` in production and an in-memory double from
//! `orchestrator-mocks` in tests. Services hold their dependencies behind
//! `Arc` so cloning a service (e.g. to move into a `tokio::spawn`ed
//! reconcile loop) is cheap.
//!
//! What lives here versus in the repository implementation is a deliberate
//! split: anything that needs a single atomic SQL transaction (claim
//! contention, worker-registration admission control) is implemented by
//! the repository itself, since only it can see the transaction boundary.
//! Anything that is pure orchestration across multiple repository calls
//! (parent auto-completion, cycle detection, reconciliation, the retry
//! decision) lives in a service here.

pub mod attempts;
pub mod candidates;
pub mod claims;
pub mod dependencies;
pub mod orchestrator;
pub mod ready;
pub mod score;
pub mod tasks;
pub mod workers;

pub use attempts::AttemptLedger;
pub use candidates::CandidatePromotionService;
pub use claims::ClaimCoordinator;
pub use dependencies::DependencyService;
pub use orchestrator::{OrchestratorService, ReconcileReport};
pub use ready::ReadySetService;
pub use score::ScoreService;
pub use tasks::TaskService;
pub use workers::WorkerService;
