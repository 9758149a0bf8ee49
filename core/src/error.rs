use thiserror::Error;

/// Result type alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Every failure mode a repository, service, or store can surface.
///
/// Validation and not-found errors propagate unchanged to callers; claim
/// contention (`AlreadyClaimed`) is likewise surfaced so a worker can pick a
/// different task rather than being treated as a bug. Store failures roll
/// back their transaction and arrive here as `Database`.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("validation error: {reason}")]
    Validation { reason: String },

    #[error("task not found: {id}")]
    TaskNotFound { id: String },

    #[error("attempt not found: {id}")]
    AttemptNotFound { id: i64 },

    #[error("claim not found for task {task_id}")]
    ClaimNotFound { task_id: String },

    #[error("worker not found: {id}")]
    WorkerNotFound { id: String },

    #[error("learning not found: {id}")]
    LearningNotFound { id: i64 },

    #[error("candidate not found: {id}")]
    CandidateNotFound { id: i64 },

    #[error("label not found: {id}")]
    LabelNotFound { id: i64 },

    #[error("dependency edge would close a cycle")]
    CircularDependency,

    #[error("task {task_id} already claimed by worker {claimed_by_worker_id}")]
    AlreadyClaimed {
        task_id: String,
        claimed_by_worker_id: String,
    },

    #[error("claim for task {task_id} has reached the maximum of {max} renewals")]
    MaxRenewalsExceeded { task_id: String, max: i64 },

    #[error("registration rejected: {reason}")]
    Registration { reason: String },

    #[error("orchestrator already running")]
    AlreadyRunning,

    #[error("orchestrator not running")]
    NotRunning,

    #[error("database error: {cause}")]
    Database { cause: String },
}

impl OrchestratorError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation { reason: reason.into() }
    }

    pub fn task_not_found(id: impl Into<String>) -> Self {
        Self::TaskNotFound { id: id.into() }
    }

    pub fn worker_not_found(id: impl Into<String>) -> Self {
        Self::WorkerNotFound { id: id.into() }
    }

    pub fn claim_not_found(task_id: impl Into<String>) -> Self {
        Self::ClaimNotFound { task_id: task_id.into() }
    }

    pub fn already_claimed(task_id: impl Into<String>, claimed_by_worker_id: impl Into<String>) -> Self {
        Self::AlreadyClaimed {
            task_id: task_id.into(),
            claimed_by_worker_id: claimed_by_worker_id.into(),
        }
    }

    pub fn database(cause: impl std::fmt::Display) -> Self {
        Self::Database { cause: cause.to_string() }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::TaskNotFound { .. }
                | Self::AttemptNotFound { .. }
                | Self::ClaimNotFound { .. }
                | Self::WorkerNotFound { .. }
                | Self::LearningNotFound { .. }
                | Self::CandidateNotFound { .. }
                | Self::LabelNotFound { .. }
        )
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::CircularDependency)
    }

    /// HTTP status the protocol layer maps this error to.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::CircularDependency => 400,
            Self::TaskNotFound { .. }
            | Self::AttemptNotFound { .. }
            | Self::ClaimNotFound { .. }
            | Self::WorkerNotFound { .. }
            | Self::LearningNotFound { .. }
            | Self::CandidateNotFound { .. }
            | Self::LabelNotFound { .. } => 404,
            Self::AlreadyClaimed { .. } => 409,
            Self::MaxRenewalsExceeded { .. } => 409,
            Self::Registration { .. } => 409,
            Self::AlreadyRunning | Self::NotRunning => 409,
            Self::Database { .. } => 500,
        }
    }
}
