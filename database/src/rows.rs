//! Row-to-model conversions shared by every per-entity module, plus the
//! sqlx-error-to-`OrchestratorError` mapping used everywhere a query can
//! fail.

use std::str::FromStr;

use sqlx::{sqlite::SqliteRow, Row};

use orchestrator_core::{
    Attempt, AttemptOutcome, Candidate, CandidateStatus, Claim, ClaimStatus, Confidence,
    Dependency, Learning, OrchestratorError, OrchestratorState, OrchestratorStatus, Result, Task,
    TaskLabel, TaskStatus, Worker, WorkerStatus,
};

pub fn map_sqlx_error(err: sqlx::Error) -> OrchestratorError {
    match &err {
        sqlx::Error::Database(db_err) => {
            OrchestratorError::database(format!("constraint violation: {}", db_err.message()))
        }
        other => OrchestratorError::database(other),
    }
}

pub fn row_to_task(row: &SqliteRow) -> Result<Task> {
    let status_str: String = row.get("status");
    let metadata_str: String = row.get("metadata");
    Ok(Task {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        status: TaskStatus::from_str(&status_str)?,
        parent_id: row.get("parent_id"),
        score: row.get("score"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        completed_at: row.get("completed_at"),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_else(|_| serde_json::json!({})),
    })
}

pub fn row_to_claim(row: &SqliteRow) -> Result<Claim> {
    let status_str: String = row.get("status");
    Ok(Claim {
        id: row.get("id"),
        task_id: row.get("task_id"),
        worker_id: row.get("worker_id"),
        claimed_at: row.get("claimed_at"),
        lease_expires_at: row.get("lease_expires_at"),
        renewed_count: row.get("renewed_count"),
        status: ClaimStatus::from_str(&status_str)?,
    })
}

pub fn row_to_worker(row: &SqliteRow) -> Result<Worker> {
    let status_str: String = row.get("status");
    let capabilities_str: String = row.get("capabilities");
    let metadata_str: String = row.get("metadata");
    Ok(Worker {
        id: row.get("id"),
        name: row.get("name"),
        hostname: row.get("hostname"),
        pid: row.get("pid"),
        status: WorkerStatus::from_str(&status_str)?,
        registered_at: row.get("registered_at"),
        last_heartbeat_at: row.get("last_heartbeat_at"),
        current_task_id: row.get("current_task_id"),
        capabilities: serde_json::from_str(&capabilities_str).unwrap_or_default(),
        metadata: serde_json::from_str(&metadata_str).unwrap_or_else(|_| serde_json::json!({})),
    })
}

pub fn row_to_orchestrator_state(row: &SqliteRow) -> Result<OrchestratorState> {
    let status_str: String = row.get("status");
    Ok(OrchestratorState {
        status: OrchestratorStatus::from_str(&status_str)?,
        pid: row.get("pid"),
        started_at: row.get("started_at"),
        last_reconcile_at: row.get("last_reconcile_at"),
        worker_pool_size: row.get("worker_pool_size"),
        reconcile_interval_seconds: row.get("reconcile_interval_seconds"),
        heartbeat_interval_seconds: row.get("heartbeat_interval_seconds"),
        lease_duration_minutes: row.get("lease_duration_minutes"),
        recency_weight: row.get("recency_weight"),
    })
}

pub fn row_to_attempt(row: &SqliteRow) -> Result<Attempt> {
    let outcome_str: String = row.get("outcome");
    Ok(Attempt {
        id: row.get("id"),
        task_id: row.get("task_id"),
        approach: row.get("approach"),
        outcome: AttemptOutcome::from_str(&outcome_str)?,
        reason: row.get("reason"),
        created_at: row.get("created_at"),
    })
}

pub fn row_to_learning(row: &SqliteRow) -> Result<Learning> {
    let keywords_str: Option<String> = row.get("keywords");
    Ok(Learning {
        id: row.get("id"),
        content: row.get("content"),
        source_type: row.get("source_type"),
        source_ref: row.get("source_ref"),
        created_at: row.get("created_at"),
        keywords: keywords_str.and_then(|s| serde_json::from_str(&s).ok()),
        category: row.get("category"),
        usage_count: row.get("usage_count"),
        outcome_score: row.get("outcome_score"),
    })
}

pub fn row_to_candidate(row: &SqliteRow) -> Result<Candidate> {
    let confidence_str: String = row.get("confidence");
    let status_str: String = row.get("status");
    Ok(Candidate {
        id: row.get("id"),
        content: row.get("content"),
        confidence: Confidence::from_str(&confidence_str)?,
        source_file: row.get("source_file"),
        source_run_id: row.get("source_run_id"),
        source_task_id: row.get("source_task_id"),
        status: CandidateStatus::from_str(&status_str)?,
        category: row.get("category"),
        extracted_at: row.get("extracted_at"),
        reviewed_at: row.get("reviewed_at"),
        reviewed_by: row.get("reviewed_by"),
        promoted_learning_id: row.get("promoted_learning_id"),
        rejection_reason: row.get("rejection_reason"),
    })
}

pub fn row_to_label(row: &SqliteRow) -> Result<TaskLabel> {
    Ok(TaskLabel { id: row.get("id"), name: row.get("name"), color: row.get("color") })
}
