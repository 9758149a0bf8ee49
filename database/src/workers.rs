//! Worker registry (§4.6). `register`'s admission control (orchestrator
//! running + pool not at capacity) runs inside the same transaction as the
//! insert, so a burst of concurrent registrations can never overshoot
//! `worker_pool_size`.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use orchestrator_core::{
    HeartbeatInput, NewWorker, OrchestratorError, Result, Worker, WorkerRepository, WorkerStatus,
};

use crate::rows::{map_sqlx_error, row_to_worker};
use crate::SqliteStore;

#[async_trait]
impl WorkerRepository for SqliteStore {
    async fn register(&self, worker: NewWorker) -> Result<Worker> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let state_row = sqlx::query("SELECT status, worker_pool_size FROM orchestrator_state WHERE id = 1")
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let status: String = state_row.get("status");
        let pool_size: i64 = state_row.get("worker_pool_size");
        if status != "running" {
            return Err(OrchestratorError::Registration {
                reason: "orchestrator is not running".into(),
            });
        }

        let active: i64 = sqlx::query(
            "SELECT COUNT(*) as c FROM workers WHERE status IN ('starting', 'idle', 'busy')",
        )
        .fetch_one(&mut *tx)
        .await
        .map_err(map_sqlx_error)?
        .get("c");
        if active >= pool_size {
            return Err(OrchestratorError::Registration {
                reason: format!("worker pool is full ({active}/{pool_size})"),
            });
        }

        let id = worker.worker_id.unwrap_or_else(|| format!("worker-{}", hex8()));
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO workers (id, name, hostname, pid, status, registered_at, last_heartbeat_at, current_task_id, capabilities, metadata)
             VALUES (?, ?, ?, ?, 'starting', ?, ?, NULL, ?, '{}')",
        )
        .bind(&id)
        .bind(&worker.name)
        .bind(&worker.hostname)
        .bind(worker.pid)
        .bind(now)
        .bind(now)
        .bind(serde_json::to_string(&worker.capabilities).unwrap_or_else(|_| "[]".into()))
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(&id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let created = row_to_worker(&row)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(created)
    }

    async fn deregister(&self, worker_id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM workers WHERE id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::worker_not_found(worker_id));
        }
        Ok(())
    }

    async fn heartbeat(&self, input: HeartbeatInput) -> Result<Worker> {
        let existing = sqlx::query("SELECT status FROM workers WHERE id = ?")
            .bind(&input.worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| OrchestratorError::worker_not_found(input.worker_id.clone()))?;
        let current_status: String = existing.get("status");
        // A heartbeat cannot resurrect a dead worker.
        let new_status = if current_status == "dead" { WorkerStatus::Dead } else { input.status };

        let metadata_json = input.metrics.map(|m| m.to_string());
        sqlx::query(
            "UPDATE workers SET last_heartbeat_at = ?, status = ?, current_task_id = ?, metadata = COALESCE(?, metadata) WHERE id = ?",
        )
        .bind(input.timestamp)
        .bind(new_status.to_string())
        .bind(&input.current_task_id)
        .bind(metadata_json)
        .bind(&input.worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(&input.worker_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row_to_worker(&row)
    }

    async fn update_status(&self, worker_id: &str, status: WorkerStatus) -> Result<Worker> {
        let result = sqlx::query("UPDATE workers SET status = ? WHERE id = ?")
            .bind(status.to_string())
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::worker_not_found(worker_id));
        }
        let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(worker_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row_to_worker(&row)
    }

    async fn get(&self, worker_id: &str) -> Result<Option<Worker>> {
        let row = sqlx::query("SELECT * FROM workers WHERE id = ?")
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_worker).transpose()
    }

    async fn list(&self) -> Result<Vec<Worker>> {
        let rows = sqlx::query("SELECT * FROM workers ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_worker).collect()
    }

    async fn find_dead(&self, missed_heartbeats: i64) -> Result<Vec<Worker>> {
        let heartbeat_interval: i64 =
            sqlx::query("SELECT heartbeat_interval_seconds FROM orchestrator_state WHERE id = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .get("heartbeat_interval_seconds");
        let threshold_seconds = heartbeat_interval * missed_heartbeats;
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold_seconds);
        let rows = sqlx::query(
            "SELECT * FROM workers WHERE status NOT IN ('dead', 'stopping') AND last_heartbeat_at < ?",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_worker).collect()
    }

    async fn mark_dead(&self, worker_id: &str) -> Result<()> {
        let result = sqlx::query("UPDATE workers SET status = 'dead' WHERE id = ?")
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::worker_not_found(worker_id));
        }
        Ok(())
    }

    async fn count_active(&self) -> Result<i64> {
        Ok(sqlx::query(
            "SELECT COUNT(*) as c FROM workers WHERE status IN ('starting', 'idle', 'busy')",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .get("c"))
    }
}

fn hex8() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{OrchestratorStateRepository, StartConfig};

    #[tokio::test]
    async fn registration_rejected_when_orchestrator_not_running() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let err = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Registration { .. }));
    }

    #[tokio::test]
    async fn registration_rejected_once_pool_is_full() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        store.start(1, StartConfig { worker_pool_size: Some(1), ..Default::default() }).await.unwrap();
        store.register(NewWorker { name: "w1".into(), ..Default::default() }).await.unwrap();
        let err = store.register(NewWorker { name: "w2".into(), ..Default::default() }).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Registration { .. }));
    }

    #[tokio::test]
    async fn heartbeat_cannot_resurrect_a_dead_worker() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        store.start(1, StartConfig::default()).await.unwrap();
        let worker = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap();
        store.mark_dead(&worker.id).await.unwrap();
        let updated = store
            .heartbeat(HeartbeatInput {
                worker_id: worker.id.clone(),
                timestamp: Utc::now(),
                status: WorkerStatus::Idle,
                current_task_id: None,
                metrics: None,
            })
            .await
            .unwrap();
        assert_eq!(updated.status, WorkerStatus::Dead);
    }

    #[tokio::test]
    async fn find_dead_excludes_already_dead_and_stopping_workers() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        store
            .start(1, StartConfig { heartbeat_interval_seconds: Some(1), ..Default::default() })
            .await
            .unwrap();
        let worker = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap();
        sqlx::query("UPDATE workers SET last_heartbeat_at = ? WHERE id = ?")
            .bind(Utc::now() - chrono::Duration::seconds(60))
            .bind(&worker.id)
            .execute(&store.pool)
            .await
            .unwrap();
        let dead = store.find_dead(2).await.unwrap();
        assert_eq!(dead.len(), 1);
        store.mark_dead(&worker.id).await.unwrap();
        assert!(store.find_dead(2).await.unwrap().is_empty());
    }
}
