//! Claim coordinator (§4.5). `claim` is the one operation in this crate
//! that must see the transaction boundary directly: the partial unique
//! index `idx_claims_one_active_per_task` (active claims only) turns a
//! concurrent double-claim into a constraint violation on whichever
//! `INSERT` loses the race, which this module translates into
//! `AlreadyClaimedError` by re-reading who holds the active claim.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use orchestrator_core::{Claim, ClaimRepository, OrchestratorError, Result};

use crate::rows::{map_sqlx_error, row_to_claim};
use crate::SqliteStore;

const MAX_RENEWALS: i64 = 10;

#[async_trait]
impl ClaimRepository for SqliteStore {
    async fn claim(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        let mut tx = self.pool.begin().await.map_err(map_sqlx_error)?;

        let lease_minutes: i64 =
            sqlx::query("SELECT lease_duration_minutes FROM orchestrator_state WHERE id = 1")
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .get("lease_duration_minutes");

        let now = Utc::now();
        let lease_expires_at = now + chrono::Duration::minutes(lease_minutes);

        let insert = sqlx::query(
            "INSERT INTO claims (task_id, worker_id, claimed_at, lease_expires_at, renewed_count, status)
             VALUES (?, ?, ?, ?, 0, 'active')",
        )
        .bind(task_id)
        .bind(worker_id)
        .bind(now)
        .bind(lease_expires_at)
        .execute(&mut *tx)
        .await;

        let claim_id = match insert {
            Ok(result) => result.last_insert_rowid(),
            Err(sqlx::Error::Database(ref db_err)) if is_unique_violation(db_err.as_ref()) => {
                let existing: Option<String> = sqlx::query(
                    "SELECT worker_id FROM claims WHERE task_id = ? AND status = 'active'",
                )
                .bind(task_id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(map_sqlx_error)?
                .map(|r| r.get("worker_id"));
                return Err(OrchestratorError::already_claimed(
                    task_id,
                    existing.unwrap_or_else(|| "unknown".to_string()),
                ));
            }
            Err(err) => return Err(map_sqlx_error(err)),
        };

        sqlx::query("UPDATE tasks SET status = 'active', updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(task_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT * FROM claims WHERE id = ?")
            .bind(claim_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        let claim = row_to_claim(&row)?;

        tx.commit().await.map_err(map_sqlx_error)?;
        Ok(claim)
    }

    async fn renew(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        let row = sqlx::query("SELECT * FROM claims WHERE task_id = ? AND status = 'active'")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or_else(|| OrchestratorError::claim_not_found(task_id))?;
        let claim = row_to_claim(&row)?;
        if claim.worker_id != worker_id {
            return Err(OrchestratorError::claim_not_found(task_id));
        }
        if claim.renewed_count >= MAX_RENEWALS {
            return Err(OrchestratorError::MaxRenewalsExceeded {
                task_id: task_id.to_string(),
                max: MAX_RENEWALS,
            });
        }

        let lease_minutes: i64 =
            sqlx::query("SELECT lease_duration_minutes FROM orchestrator_state WHERE id = 1")
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .get("lease_duration_minutes");
        let lease_expires_at = Utc::now() + chrono::Duration::minutes(lease_minutes);

        sqlx::query(
            "UPDATE claims SET lease_expires_at = ?, renewed_count = renewed_count + 1 WHERE id = ?",
        )
        .bind(lease_expires_at)
        .bind(claim.id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT * FROM claims WHERE id = ?")
            .bind(claim.id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row_to_claim(&row)
    }

    async fn release(&self, task_id: &str, worker_id: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE claims SET status = 'released' WHERE task_id = ? AND worker_id = ? AND status = 'active'",
        )
        .bind(task_id)
        .bind(worker_id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::claim_not_found(task_id));
        }
        Ok(())
    }

    async fn release_by_worker(&self, worker_id: &str) -> Result<u64> {
        let result = sqlx::query("UPDATE claims SET status = 'released' WHERE worker_id = ? AND status = 'active'")
            .bind(worker_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected())
    }

    async fn expire(&self, claim_id: i64) -> Result<()> {
        let result = sqlx::query("UPDATE claims SET status = 'expired' WHERE id = ? AND status = 'active'")
            .bind(claim_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::claim_not_found(claim_id.to_string()));
        }
        Ok(())
    }

    async fn get_active_claim(&self, task_id: &str) -> Result<Option<Claim>> {
        let row = sqlx::query("SELECT * FROM claims WHERE task_id = ? AND status = 'active'")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_claim).transpose()
    }

    async fn get_expired(&self) -> Result<Vec<Claim>> {
        let rows = sqlx::query("SELECT * FROM claims WHERE status = 'active' AND lease_expires_at < ?")
            .bind(Utc::now())
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_claim).collect()
    }
}

fn is_unique_violation(db_err: &dyn sqlx::error::DatabaseError) -> bool {
    db_err.is_unique_violation() || db_err.message().contains("UNIQUE constraint failed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{NewTask, NewWorker, StartConfig, TaskRepository, WorkerRepository};

    async fn store_with_task_and_workers() -> (SqliteStore, String, String, String) {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        orchestrator_core::OrchestratorStateRepository::start(&store, 1, StartConfig::default())
            .await
            .unwrap();
        let task = store.create(NewTask { title: "t".into(), ..Default::default() }).await.unwrap();
        let w1 = store.register(NewWorker { name: "w1".into(), ..Default::default() }).await.unwrap();
        let w2 = store.register(NewWorker { name: "w2".into(), ..Default::default() }).await.unwrap();
        (store, task.id, w1.id, w2.id)
    }

    #[tokio::test]
    async fn second_claim_fails_and_names_the_winner() {
        let (store, task_id, w1, w2) = store_with_task_and_workers().await;
        let won = store.claim(&task_id, &w1).await.unwrap();
        assert_eq!(won.renewed_count, 0);
        let err = store.claim(&task_id, &w2).await.unwrap_err();
        match err {
            OrchestratorError::AlreadyClaimed { claimed_by_worker_id, .. } => {
                assert_eq!(claimed_by_worker_id, w1);
            }
            other => panic!("expected AlreadyClaimed, got {other:?}"),
        }
        let active = store.get_active_claim(&task_id).await.unwrap().unwrap();
        assert_eq!(active.worker_id, w1);
    }

    #[tokio::test]
    async fn claim_transitions_task_to_active() {
        let (store, task_id, w1, _) = store_with_task_and_workers().await;
        store.claim(&task_id, &w1).await.unwrap();
        let task = store.get(&task_id).await.unwrap().unwrap();
        assert_eq!(task.status, orchestrator_core::TaskStatus::Active);
    }

    #[tokio::test]
    async fn renewal_cap_is_enforced_at_ten() {
        let (store, task_id, w1, _) = store_with_task_and_workers().await;
        store.claim(&task_id, &w1).await.unwrap();
        for _ in 0..MAX_RENEWALS {
            store.renew(&task_id, &w1).await.unwrap();
        }
        let err = store.renew(&task_id, &w1).await.unwrap_err();
        assert!(matches!(err, OrchestratorError::MaxRenewalsExceeded { .. }));
    }

    #[tokio::test]
    async fn release_by_worker_is_zero_the_second_time() {
        let (store, task_id, w1, _) = store_with_task_and_workers().await;
        store.claim(&task_id, &w1).await.unwrap();
        assert_eq!(store.release_by_worker(&w1).await.unwrap(), 1);
        assert_eq!(store.release_by_worker(&w1).await.unwrap(), 0);
    }
}
