//! Orchestrator core: domain models, repository traits, and the pure
//! (store-free) logic that sits directly on top of them.
//!
//! All other crates in the workspace depend on the types and trait
//! interfaces defined here. Nothing in this crate talks to a database or
//! the network — that is `orchestrator-db`'s and `engine-protocol`'s job
//! respectively. This crate only knows how to validate input, compute
//! derived values (scores, ready-set ordering, relevance), and describe the
//! seams (`repository`, `sync_hook`) that the rest of the workspace fills in.
//!
//! # Modules
//!
//! - [`models`] — domain types (`Task`, `Worker`, `Claim`, `Learning`, …)
//! - [`error`] — the single `OrchestratorError` enum used everywhere
//! - [`repository`] — repository traits, the seam to the store
//! - [`validation`] — input validation helpers
//! - [`scoring`] — the derived-score breakdown (`§4.4`)
//! - [`retrieval`] — RRF fusion and relevance boosts (`§4.9`)
//! - [`retry`] — the attempt-ledger retry circuit (`§4.8`)
//! - [`ids`] — `tx-`/`worker-` id generation
//! - [`paths`] — transcript-path sanitization
//! - [`sync_hook`] — the auto-sync extension point (unimplemented by design)

pub mod error;
pub mod ids;
pub mod models;
pub mod paths;
pub mod repository;
pub mod retrieval;
pub mod retry;
pub mod scoring;
pub mod sync_hook;
pub mod validation;

pub use error::{OrchestratorError, Result};
pub use models::{
    Attempt, AttemptOutcome, Candidate, CandidateFilter, CandidateStatus, Claim, ClaimStatus,
    Confidence, Dependency, HeartbeatInput, LabelAssignment, Learning, LearningSearchResult,
    NewCandidate, NewLearning, NewTask, NewWorker, OrchestratorState, OrchestratorStatus,
    RepositoryStats, ScoreBreakdown, StartConfig, Task, TaskFilter, TaskLabel, TaskStatus,
    TaskTree, TaskWithDeps, UpdateTask, Worker, WorkerStatus,
};
pub use repository::{
    AttemptRepository, CandidateRepository, CandidateTransition, ClaimRepository,
    DependencyRepository, HierarchyRepository, LabelRepository, LearningRepository,
    OrchestratorStateRepository, TaskRepository, WorkerRepository,
};
pub use validation::{AttemptValidator, LabelValidator, TaskValidator, WorkerValidator};

/// Current version of the core crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current crate name.
pub const CRATE_NAME: &str = env!("CARGO_PKG_NAME");
