//! Worker service (§4.6): registration admission control and heartbeat
//! handling. The actual admission count-and-insert happens atomically inside
//! `WorkerRepository::register`'s own transaction (it alone can see the
//! transaction boundary against `OrchestratorState.worker_pool_size`); this
//! layer adds the input validation the repository shouldn't have to own.

use std::sync::Arc;

use orchestrator_core::{
    HeartbeatInput, NewWorker, Result, Worker, WorkerRepository, WorkerStatus, WorkerValidator,
};

pub struct WorkerService<W> {
    workers: Arc<W>,
}

impl<W: WorkerRepository> WorkerService<W> {
    pub fn new(workers: Arc<W>) -> Self {
        Self { workers }
    }

    pub async fn register(&self, input: NewWorker) -> Result<Worker> {
        WorkerValidator::validate_name(&input.name)?;
        self.workers.register(input).await
    }

    pub async fn deregister(&self, worker_id: &str) -> Result<()> {
        self.workers.deregister(worker_id).await
    }

    pub async fn heartbeat(&self, input: HeartbeatInput) -> Result<Worker> {
        self.workers.heartbeat(input).await
    }

    pub async fn update_status(&self, worker_id: &str, status: WorkerStatus) -> Result<Worker> {
        self.workers.update_status(worker_id, status).await
    }

    pub async fn get(&self, worker_id: &str) -> Result<Worker> {
        self.workers
            .get(worker_id)
            .await?
            .ok_or_else(|| orchestrator_core::OrchestratorError::worker_not_found(worker_id))
    }

    pub async fn list(&self) -> Result<Vec<Worker>> {
        self.workers.list().await
    }
}
