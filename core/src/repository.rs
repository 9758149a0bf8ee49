//! Repository traits: the seam between pure domain logic and the SQLite
//! store. Every trait is `async_trait` + `Send + Sync` so both the SQLite
//! implementation and the in-memory mocks can be held behind the same
//! generic (or trait object, where the HTTP layer needs type erasure).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{
    Attempt, AttemptOutcome, Candidate, CandidateFilter, Claim, HeartbeatInput, Learning,
    LearningSearchResult, NewCandidate, NewLearning, NewTask, NewWorker, OrchestratorState,
    RepositoryStats, StartConfig, Task, TaskFilter, TaskLabel, TaskTree, TaskWithDeps, UpdateTask,
    Worker, WorkerStatus,
};

/// Task storage and the ready-set query.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: NewTask) -> Result<Task>;
    async fn get(&self, id: &str) -> Result<Option<Task>>;
    async fn get_with_deps(&self, id: &str) -> Result<Option<TaskWithDeps>>;
    async fn update(&self, id: &str, patch: UpdateTask) -> Result<Task>;
    /// Bypasses the transition graph and skips parent auto-completion.
    async fn force_status(&self, id: &str, status: crate::models::TaskStatus) -> Result<Task>;
    /// Cascades: children's `parent_id` is cleared, its dependency edges and
    /// any claim on it are removed.
    async fn delete(&self, id: &str) -> Result<()>;
    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>>;
    async fn count(&self, filter: TaskFilter) -> Result<u64>;
    async fn list_with_deps(&self, filter: TaskFilter) -> Result<Vec<TaskWithDeps>>;
    async fn get_with_deps_batch(&self, ids: &[String]) -> Result<Vec<TaskWithDeps>>;
    /// `status IN {backlog, ready, planning}`, no unsatisfied blocker,
    /// ordered by `score DESC, id ASC`. `limit <= 0` is the caller's
    /// business (see `orchestrator_core::ready::effective_limit`); this
    /// trait takes the already-normalized limit.
    async fn ready(&self, limit: i64) -> Result<Vec<Task>>;
    async fn get_stats(&self) -> Result<RepositoryStats>;
    async fn health_check(&self) -> Result<()>;
}

/// Directed `blocker -> blocked` edges over the task graph.
#[async_trait]
pub trait DependencyRepository: Send + Sync {
    async fn add_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()>;
    /// Idempotent: removing a non-existent edge succeeds silently.
    async fn remove_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()>;
    async fn list_blockers(&self, id: &str) -> Result<Vec<String>>;
    async fn list_blocking(&self, id: &str) -> Result<Vec<String>>;
    /// The full edge set, for in-memory reachability/cycle checks.
    async fn all_edges(&self) -> Result<Vec<crate::models::Dependency>>;
}

/// Traversal over the `parent_id` hierarchy.
#[async_trait]
pub trait HierarchyRepository: Send + Sync {
    async fn get_children(&self, id: &str) -> Result<Vec<String>>;
    /// Ordered leaf -> root.
    async fn get_ancestors(&self, id: &str) -> Result<Vec<String>>;
    async fn get_depth(&self, id: &str) -> Result<u32>;
    async fn get_roots(&self) -> Result<Vec<String>>;
    async fn get_tree(&self, id: &str, max_depth: Option<u32>) -> Result<Option<TaskTree>>;
}

/// Claim/lease coordination. `claim` must be atomic under concurrent callers.
#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn claim(&self, task_id: &str, worker_id: &str) -> Result<Claim>;
    async fn renew(&self, task_id: &str, worker_id: &str) -> Result<Claim>;
    async fn release(&self, task_id: &str, worker_id: &str) -> Result<()>;
    async fn release_by_worker(&self, worker_id: &str) -> Result<u64>;
    async fn expire(&self, claim_id: i64) -> Result<()>;
    async fn get_active_claim(&self, task_id: &str) -> Result<Option<Claim>>;
    async fn get_expired(&self) -> Result<Vec<Claim>>;
}

/// Worker registration, heartbeats, and dead-worker detection.
#[async_trait]
pub trait WorkerRepository: Send + Sync {
    async fn register(&self, worker: NewWorker) -> Result<Worker>;
    async fn deregister(&self, worker_id: &str) -> Result<()>;
    async fn heartbeat(&self, input: HeartbeatInput) -> Result<Worker>;
    async fn update_status(&self, worker_id: &str, status: WorkerStatus) -> Result<Worker>;
    async fn get(&self, worker_id: &str) -> Result<Option<Worker>>;
    async fn list(&self) -> Result<Vec<Worker>>;
    async fn find_dead(&self, missed_heartbeats: i64) -> Result<Vec<Worker>>;
    async fn mark_dead(&self, worker_id: &str) -> Result<()>;
    /// Count of workers in `{starting, idle, busy}`, for admission control.
    async fn count_active(&self) -> Result<i64>;
}

/// The singleton orchestrator row.
#[async_trait]
pub trait OrchestratorStateRepository: Send + Sync {
    async fn get(&self) -> Result<OrchestratorState>;
    /// Transitions to `running`, recording `pid` and applying any tunable
    /// overrides in `config` (a `None` field keeps the current value).
    async fn start(&self, pid: i64, config: StartConfig) -> Result<OrchestratorState>;
    async fn stop(&self) -> Result<OrchestratorState>;
    async fn set_last_reconcile(&self, at: DateTime<Utc>) -> Result<()>;
}

/// Append-only record of attempts, feeding the retry circuit.
#[async_trait]
pub trait AttemptRepository: Send + Sync {
    async fn create(&self, task_id: &str, approach: &str, outcome: AttemptOutcome, reason: Option<String>) -> Result<Attempt>;
    async fn get(&self, id: i64) -> Result<Option<Attempt>>;
    async fn list_for_task(&self, task_id: &str) -> Result<Vec<Attempt>>;
    async fn remove(&self, id: i64) -> Result<()>;
    async fn get_failed_count(&self, task_id: &str) -> Result<i64>;
    /// Sparse: tasks with zero failed attempts are omitted from the map.
    async fn get_failed_counts_for_tasks(&self, ids: &[String]) -> Result<HashMap<String, i64>>;
}

/// The learning corpus and its hybrid-retrieval search.
#[async_trait]
pub trait LearningRepository: Send + Sync {
    async fn create(&self, learning: NewLearning) -> Result<Learning>;
    async fn get(&self, id: i64) -> Result<Option<Learning>>;
    async fn list(&self) -> Result<Vec<Learning>>;
    async fn delete(&self, id: i64) -> Result<()>;
    async fn update_outcome(&self, id: i64, score: f64) -> Result<Learning>;
    async fn record_usage(&self, id: i64) -> Result<Learning>;
    async fn search(&self, query: &str, limit: i64, min_score: f64) -> Result<Vec<LearningSearchResult>>;
}

/// What a monotonic `pending -> *` candidate transition carries.
#[derive(Debug, Clone)]
pub enum CandidateTransition {
    Promoted { learning_id: i64 },
    Rejected { reason: String },
    Merged { absorbing_learning_id: Option<i64> },
}

/// Pending-promotion learnings awaiting review.
#[async_trait]
pub trait CandidateRepository: Send + Sync {
    async fn insert(&self, candidate: NewCandidate) -> Result<Candidate>;
    async fn find_by_id(&self, id: i64) -> Result<Option<Candidate>>;
    async fn find_by_filter(&self, filter: CandidateFilter) -> Result<Vec<Candidate>>;
    async fn update(&self, id: i64, content: Option<String>, category: Option<String>) -> Result<Candidate>;
    async fn update_status(&self, id: i64, transition: CandidateTransition, reviewed_by: Option<String>) -> Result<Candidate>;
}

/// Descriptive, case-insensitively unique task labels.
#[async_trait]
pub trait LabelRepository: Send + Sync {
    async fn upsert(&self, name: &str, color: &str) -> Result<TaskLabel>;
    async fn list(&self) -> Result<Vec<TaskLabel>>;
    async fn attach(&self, task_id: &str, label_id: i64) -> Result<()>;
    async fn detach(&self, task_id: &str, label_id: i64) -> Result<()>;
    async fn labels_for_task(&self, task_id: &str) -> Result<Vec<TaskLabel>>;
}
