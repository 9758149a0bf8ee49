//! The singleton `orchestrator_state` row (§4.1, §4.7). Every method reads
//! or writes `id = 1` — the table's own `CHECK (id = 1)` makes a second row
//! impossible, so there is no "which row" ambiguity to resolve here.

use async_trait::async_trait;

use orchestrator_core::{OrchestratorState, OrchestratorStateRepository, Result, StartConfig};

use crate::rows::{map_sqlx_error, row_to_orchestrator_state};
use crate::SqliteStore;

#[async_trait]
impl OrchestratorStateRepository for SqliteStore {
    async fn get(&self) -> Result<OrchestratorState> {
        let row = sqlx::query("SELECT * FROM orchestrator_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row_to_orchestrator_state(&row)
    }

    async fn start(&self, pid: i64, config: StartConfig) -> Result<OrchestratorState> {
        let current = self.get().await?;
        let now = chrono::Utc::now();
        sqlx::query(
            "UPDATE orchestrator_state
             SET status = 'running', pid = ?, started_at = ?,
                 worker_pool_size = ?, reconcile_interval_seconds = ?,
                 heartbeat_interval_seconds = ?, lease_duration_minutes = ?
             WHERE id = 1",
        )
        .bind(pid)
        .bind(now)
        .bind(config.worker_pool_size.unwrap_or(current.worker_pool_size))
        .bind(config.reconcile_interval_seconds.unwrap_or(current.reconcile_interval_seconds))
        .bind(config.heartbeat_interval_seconds.unwrap_or(current.heartbeat_interval_seconds))
        .bind(config.lease_duration_minutes.unwrap_or(current.lease_duration_minutes))
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        self.get().await
    }

    async fn stop(&self) -> Result<OrchestratorState> {
        sqlx::query("UPDATE orchestrator_state SET status = 'stopped', pid = NULL WHERE id = 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        self.get().await
    }

    async fn set_last_reconcile(&self, at: chrono::DateTime<chrono::Utc>) -> Result<()> {
        sqlx::query("UPDATE orchestrator_state SET last_reconcile_at = ? WHERE id = 1")
            .bind(at)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn start_applies_overrides_and_leaves_others_at_default() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let state = store
            .start(123, StartConfig { worker_pool_size: Some(8), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(state.pid, Some(123));
        assert_eq!(state.worker_pool_size, 8);
        assert_eq!(state.heartbeat_interval_seconds, 15);
        assert_eq!(state.recency_weight, 0.1);
    }

    #[tokio::test]
    async fn stop_clears_pid_and_status() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        store.start(123, StartConfig::default()).await.unwrap();
        let state = store.stop().await.unwrap();
        assert_eq!(state.pid, None);
        assert_eq!(state.status, orchestrator_core::OrchestratorStatus::Stopped);
    }
}
