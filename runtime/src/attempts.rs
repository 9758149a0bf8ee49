//! Attempt ledger (§4.8): records attempts and exposes the retry decision
//! a caller should act on after a failed attempt.

use std::sync::Arc;

use orchestrator_core::{
    retry, Attempt, AttemptOutcome, AttemptRepository, AttemptValidator, OrchestratorError,
    Result, TaskRepository,
};

pub struct AttemptLedger<A, T> {
    attempts: Arc<A>,
    tasks: Arc<T>,
}

impl<A: AttemptRepository, T: TaskRepository> AttemptLedger<A, T> {
    pub fn new(attempts: Arc<A>, tasks: Arc<T>) -> Self {
        Self { attempts, tasks }
    }

    pub async fn record(
        &self,
        task_id: &str,
        approach: &str,
        outcome: AttemptOutcome,
        reason: Option<String>,
    ) -> Result<Attempt> {
        AttemptValidator::validate_approach(approach)?;
        if self.tasks.get(task_id).await?.is_none() {
            return Err(OrchestratorError::task_not_found(task_id));
        }
        self.attempts.create(task_id, approach, outcome, reason).await
    }

    pub async fn list_for_task(&self, task_id: &str) -> Result<Vec<Attempt>> {
        self.attempts.list_for_task(task_id).await
    }

    /// Records a failed attempt, then reports whether the task should be
    /// retried or given up on per the fixed `MAX_RETRIES` circuit.
    pub async fn record_failure_and_decide(
        &self,
        task_id: &str,
        approach: &str,
        reason: Option<String>,
    ) -> Result<retry::RetryDecision> {
        self.record(task_id, approach, AttemptOutcome::Failed, reason).await?;
        let failed_count = self.attempts.get_failed_count(task_id).await?;
        Ok(retry::decide(failed_count))
    }
}
