//! Claim coordinator (§4.5): validates task/worker eligibility before
//! delegating to `ClaimRepository`, whose `claim` implementation owns the
//! actual atomicity (a single SQL transaction in `orchestrator-db`). This
//! layer only rejects requests the repository shouldn't have to know about
//! the meaning of — task workability, worker liveness.

use std::sync::Arc;

use orchestrator_core::{
    Claim, ClaimRepository, OrchestratorError, Result, TaskRepository, WorkerRepository,
    WorkerStatus,
};

pub struct ClaimCoordinator<C, T, W> {
    claims: Arc<C>,
    tasks: Arc<T>,
    workers: Arc<W>,
}

impl<C, T, W> ClaimCoordinator<C, T, W>
where
    C: ClaimRepository,
    T: TaskRepository,
    W: WorkerRepository,
{
    pub fn new(claims: Arc<C>, tasks: Arc<T>, workers: Arc<W>) -> Self {
        Self { claims, tasks, workers }
    }

    pub async fn claim(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        let task = self
            .tasks
            .get(task_id)
            .await?
            .ok_or_else(|| OrchestratorError::task_not_found(task_id))?;
        if !task.status.is_workable() {
            return Err(OrchestratorError::validation(format!(
                "task {task_id} is not in a workable status"
            )));
        }
        let worker = self
            .workers
            .get(worker_id)
            .await?
            .ok_or_else(|| OrchestratorError::worker_not_found(worker_id))?;
        if !matches!(worker.status, WorkerStatus::Starting | WorkerStatus::Idle | WorkerStatus::Busy) {
            return Err(OrchestratorError::validation(format!(
                "worker {worker_id} is not eligible to claim tasks (status {})",
                worker.status
            )));
        }
        self.claims.claim(task_id, worker_id).await
    }

    pub async fn renew(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        self.claims.renew(task_id, worker_id).await
    }

    pub async fn release(&self, task_id: &str, worker_id: &str) -> Result<()> {
        self.claims.release(task_id, worker_id).await
    }

    pub async fn release_by_worker(&self, worker_id: &str) -> Result<u64> {
        self.claims.release_by_worker(worker_id).await
    }

    pub async fn get_active_claim(&self, task_id: &str) -> Result<Option<Claim>> {
        self.claims.get_active_claim(task_id).await
    }

    pub async fn get_expired(&self) -> Result<Vec<Claim>> {
        self.claims.get_expired().await
    }
}
