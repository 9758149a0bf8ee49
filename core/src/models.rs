//! Core domain types shared by every repository trait and service.
//!
//! Mirrors the shape of a hand-rolled domain model: plain structs, a
//! `#[non_exhaustive]`-free status enum with an explicit transition graph,
//! and small `New*`/`*Filter` structs for the operations that need partial
//! input. Serialization derives are present throughout because the HTTP
//! layer re-uses these types directly rather than maintaining parallel DTOs.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Workable and terminal states a [`Task`] can occupy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Backlog,
    Ready,
    Planning,
    Active,
    Blocked,
    Review,
    Done,
}

impl TaskStatus {
    /// The statuses the ready-set query and `isReady` projection consider workable.
    pub const WORKABLE: [TaskStatus; 3] = [TaskStatus::Backlog, TaskStatus::Ready, TaskStatus::Planning];

    pub fn is_workable(self) -> bool {
        Self::WORKABLE.contains(&self)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Backlog => "backlog",
            TaskStatus::Ready => "ready",
            TaskStatus::Planning => "planning",
            TaskStatus::Active => "active",
            TaskStatus::Blocked => "blocked",
            TaskStatus::Review => "review",
            TaskStatus::Done => "done",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "backlog" => Ok(TaskStatus::Backlog),
            "ready" => Ok(TaskStatus::Ready),
            "planning" => Ok(TaskStatus::Planning),
            "active" => Ok(TaskStatus::Active),
            "blocked" => Ok(TaskStatus::Blocked),
            "review" => Ok(TaskStatus::Review),
            "done" => Ok(TaskStatus::Done),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown task status '{other}'"
            ))),
        }
    }
}

/// A unit of work tracked by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub parent_id: Option<String>,
    pub score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub metadata: serde_json::Value,
}

impl Task {
    /// The allowed-transition graph for `update`. Same-state transitions are
    /// always allowed (covers the double-completion idempotence law);
    /// `forceStatus` bypasses this entirely.
    pub fn can_transition_to(&self, new: TaskStatus) -> bool {
        if self.status == new {
            return true;
        }
        use TaskStatus::*;
        matches!(
            (self.status, new),
            (Backlog, Ready)
                | (Backlog, Planning)
                | (Backlog, Blocked)
                | (Ready, Planning)
                | (Ready, Active)
                | (Ready, Blocked)
                | (Ready, Backlog)
                | (Planning, Active)
                | (Planning, Backlog)
                | (Planning, Blocked)
                | (Active, Review)
                | (Active, Blocked)
                | (Active, Done)
                | (Active, Backlog)
                | (Blocked, Backlog)
                | (Blocked, Ready)
                | (Blocked, Planning)
                | (Review, Done)
                | (Review, Active)
                | (Review, Blocked)
        )
    }
}

/// Input to [`crate::repository::TaskRepository::create`].
#[derive(Debug, Clone, Default)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub parent_id: Option<String>,
    pub score: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Partial patch for [`crate::repository::TaskRepository::update`]. A `None`
/// field is left untouched; this is distinct from `force_status`, which
/// bypasses the transition graph and auto-completion entirely.
#[derive(Debug, Clone, Default)]
pub struct UpdateTask {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub parent_id: Option<Option<String>>,
    pub score: Option<i64>,
    pub metadata: Option<serde_json::Value>,
}

/// Filter accepted by `list`/`count`. Every field is AND-ed together.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<Vec<TaskStatus>>,
    pub parent_id: Option<Option<String>>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Transient projection returned by `getWithDeps`/`listWithDeps`. Not stored
/// independently — recomputed on every read from the edges and task rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskWithDeps {
    #[serde(flatten)]
    pub task: Task,
    pub blocked_by: Vec<String>,
    pub blocks: Vec<String>,
    pub children: Vec<String>,
    pub is_ready: bool,
}

/// A directed `blocker -> blocked` dependency edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dependency {
    pub blocker_id: String,
    pub blocked_id: String,
}

/// A value tree produced by `getTree`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTree {
    pub task: Task,
    pub children: Vec<TaskTree>,
}

/// Breakdown of the derived score, for UI explanation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub base_score: i64,
    pub blocking_bonus: i64,
    pub depth_penalty: i64,
    pub blocked_penalty: i64,
    pub final_score: i64,
}

/// Lifecycle state of a registered [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Starting,
    Idle,
    Busy,
    Stopping,
    Dead,
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            WorkerStatus::Starting => "starting",
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
            WorkerStatus::Stopping => "stopping",
            WorkerStatus::Dead => "dead",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WorkerStatus {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(WorkerStatus::Starting),
            "idle" => Ok(WorkerStatus::Idle),
            "busy" => Ok(WorkerStatus::Busy),
            "stopping" => Ok(WorkerStatus::Stopping),
            "dead" => Ok(WorkerStatus::Dead),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown worker status '{other}'"
            ))),
        }
    }
}

/// A process that leases tasks and drives coding agents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Worker {
    pub id: String,
    pub name: String,
    pub hostname: Option<String>,
    pub pid: Option<i64>,
    pub status: WorkerStatus,
    pub registered_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub current_task_id: Option<String>,
    pub capabilities: Vec<String>,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct NewWorker {
    pub name: String,
    pub capabilities: Vec<String>,
    pub hostname: Option<String>,
    pub pid: Option<i64>,
    pub worker_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct HeartbeatInput {
    pub worker_id: String,
    pub timestamp: DateTime<Utc>,
    pub status: WorkerStatus,
    pub current_task_id: Option<String>,
    pub metrics: Option<serde_json::Value>,
}

/// Status of a [`Claim`]. At most one `active` claim may exist per task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Active,
    Released,
    Expired,
}

impl std::fmt::Display for ClaimStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ClaimStatus::Active => "active",
            ClaimStatus::Released => "released",
            ClaimStatus::Expired => "expired",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ClaimStatus::Active),
            "released" => Ok(ClaimStatus::Released),
            "expired" => Ok(ClaimStatus::Expired),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown claim status '{other}'"
            ))),
        }
    }
}

/// A lease asserting that `worker_id` is working on `task_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub id: i64,
    pub task_id: String,
    pub worker_id: String,
    pub claimed_at: DateTime<Utc>,
    pub lease_expires_at: DateTime<Utc>,
    pub renewed_count: i64,
    pub status: ClaimStatus,
}

/// Singleton controller row. There is exactly one of these in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestratorStatus {
    Stopped,
    Running,
}

impl std::fmt::Display for OrchestratorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            OrchestratorStatus::Stopped => "stopped",
            OrchestratorStatus::Running => "running",
        })
    }
}

impl std::str::FromStr for OrchestratorStatus {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stopped" => Ok(OrchestratorStatus::Stopped),
            "running" => Ok(OrchestratorStatus::Running),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown orchestrator status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorState {
    pub status: OrchestratorStatus,
    pub pid: Option<i64>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_reconcile_at: Option<DateTime<Utc>>,
    pub worker_pool_size: i64,
    pub reconcile_interval_seconds: i64,
    pub heartbeat_interval_seconds: i64,
    pub lease_duration_minutes: i64,
    /// Weight applied to `recencyScore` in the learning-search relevance
    /// formula (§4.9). Range `[0, 1]`.
    pub recency_weight: f64,
}

impl Default for OrchestratorState {
    fn default() -> Self {
        Self {
            status: OrchestratorStatus::Stopped,
            pid: None,
            started_at: None,
            last_reconcile_at: None,
            worker_pool_size: 4,
            reconcile_interval_seconds: 30,
            heartbeat_interval_seconds: 15,
            lease_duration_minutes: 30,
            recency_weight: 0.1,
        }
    }
}

/// Outcome of one attempt at working a task, feeding the retry circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Failed,
    Succeeded,
}

impl std::fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Succeeded => "succeeded",
        })
    }
}

impl std::str::FromStr for AttemptOutcome {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "failed" => Ok(AttemptOutcome::Failed),
            "succeeded" => Ok(AttemptOutcome::Succeeded),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown attempt outcome '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attempt {
    pub id: i64,
    pub task_id: String,
    pub approach: String,
    pub outcome: AttemptOutcome,
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An append-only piece of extracted knowledge surfaced by the retrieval engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Learning {
    pub id: i64,
    pub content: String,
    pub source_type: String,
    pub source_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub keywords: Option<Vec<String>>,
    pub category: Option<String>,
    pub usage_count: i64,
    pub outcome_score: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct NewLearning {
    pub content: String,
    pub source_type: String,
    pub source_ref: Option<String>,
    pub keywords: Option<Vec<String>>,
    pub category: Option<String>,
}

/// One row returned by `search`, carrying the components that made up its
/// final relevance so callers can decompose the ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearningSearchResult {
    pub learning: Learning,
    pub relevance: f64,
    pub bm25_score: f64,
    pub recency_score: f64,
}

/// Confidence a candidate-extraction pass attaches to a learning it proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Default for Confidence {
    fn default() -> Self {
        Confidence::Medium
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Confidence::Low => "low",
            Confidence::Medium => "medium",
            Confidence::High => "high",
        })
    }
}

impl std::str::FromStr for Confidence {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown confidence level '{other}'"
            ))),
        }
    }
}

/// Monotonic promotion state of a [`Candidate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    Pending,
    Promoted,
    Rejected,
    Merged,
}

impl std::fmt::Display for CandidateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Promoted => "promoted",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Merged => "merged",
        })
    }
}

impl std::str::FromStr for CandidateStatus {
    type Err = crate::error::OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(CandidateStatus::Pending),
            "promoted" => Ok(CandidateStatus::Promoted),
            "rejected" => Ok(CandidateStatus::Rejected),
            "merged" => Ok(CandidateStatus::Merged),
            other => Err(crate::error::OrchestratorError::validation(format!(
                "unknown candidate status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub content: String,
    pub confidence: Confidence,
    pub source_file: String,
    pub source_run_id: Option<String>,
    pub source_task_id: Option<String>,
    pub status: CandidateStatus,
    pub category: Option<String>,
    pub extracted_at: DateTime<Utc>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<String>,
    pub promoted_learning_id: Option<i64>,
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct NewCandidate {
    pub content: String,
    pub confidence: Confidence,
    pub source_file: String,
    pub source_run_id: Option<String>,
    pub source_task_id: Option<String>,
    pub category: Option<String>,
}

/// Filter accepted by `findByFilter`. Each field is an inclusive AND; a
/// populated `Vec` behaves as a set (any match), matching the "list and set
/// semantics" contract.
#[derive(Debug, Clone, Default)]
pub struct CandidateFilter {
    pub status: Option<Vec<CandidateStatus>>,
    pub confidence: Option<Vec<Confidence>>,
    pub category: Option<Vec<String>>,
    pub source_file: Option<Vec<String>>,
    pub source_run_id: Option<Vec<String>>,
    pub source_task_id: Option<Vec<String>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// A descriptive, case-insensitively unique tag attachable to tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLabel {
    pub id: i64,
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelAssignment {
    pub task_id: String,
    pub label_id: i64,
}

/// Tunable overrides an operator may supply to `OrchestratorService::start`.
/// A `None` field leaves the existing `OrchestratorState` value untouched.
#[derive(Debug, Clone, Default)]
pub struct StartConfig {
    pub worker_pool_size: Option<i64>,
    pub reconcile_interval_seconds: Option<i64>,
    pub heartbeat_interval_seconds: Option<i64>,
    pub lease_duration_minutes: Option<i64>,
}

/// Aggregate counters used by the `/api/stats` surface and health checks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RepositoryStats {
    pub total_tasks: u64,
    pub tasks_by_status: HashMap<String, u64>,
    pub latest_created: Option<DateTime<Utc>>,
    pub latest_completed: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task_with_status(status: TaskStatus) -> Task {
        Task {
            id: "tx-00000001".into(),
            title: "t".into(),
            description: None,
            status,
            parent_id: None,
            score: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            completed_at: None,
            metadata: serde_json::json!({}),
        }
    }

    #[test]
    fn same_state_transition_always_allowed() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::Planning,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::Review,
            TaskStatus::Done,
        ] {
            assert!(task_with_status(status).can_transition_to(status));
        }
    }

    #[test]
    fn backlog_can_reach_workable_and_blocked_states() {
        let t = task_with_status(TaskStatus::Backlog);
        assert!(t.can_transition_to(TaskStatus::Ready));
        assert!(t.can_transition_to(TaskStatus::Planning));
        assert!(t.can_transition_to(TaskStatus::Blocked));
        assert!(!t.can_transition_to(TaskStatus::Done));
        assert!(!t.can_transition_to(TaskStatus::Review));
    }

    #[test]
    fn active_can_reach_done_review_blocked_backlog_only() {
        let t = task_with_status(TaskStatus::Active);
        assert!(t.can_transition_to(TaskStatus::Done));
        assert!(t.can_transition_to(TaskStatus::Review));
        assert!(t.can_transition_to(TaskStatus::Blocked));
        assert!(t.can_transition_to(TaskStatus::Backlog));
        assert!(!t.can_transition_to(TaskStatus::Planning));
    }

    #[test]
    fn done_only_transitions_to_itself_via_update() {
        let t = task_with_status(TaskStatus::Done);
        assert!(t.can_transition_to(TaskStatus::Done));
        assert!(!t.can_transition_to(TaskStatus::Backlog));
        assert!(!t.can_transition_to(TaskStatus::Active));
    }

    #[test]
    fn status_round_trips_through_display_and_from_str() {
        for status in [
            TaskStatus::Backlog,
            TaskStatus::Ready,
            TaskStatus::Planning,
            TaskStatus::Active,
            TaskStatus::Blocked,
            TaskStatus::Review,
            TaskStatus::Done,
        ] {
            let s = status.to_string();
            assert_eq!(s.parse::<TaskStatus>().unwrap(), status);
        }
    }

    #[test]
    fn workable_set_matches_ready_query_contract() {
        assert!(TaskStatus::Backlog.is_workable());
        assert!(TaskStatus::Ready.is_workable());
        assert!(TaskStatus::Planning.is_workable());
        assert!(!TaskStatus::Active.is_workable());
        assert!(!TaskStatus::Done.is_workable());
    }
}
