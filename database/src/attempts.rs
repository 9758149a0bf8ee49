use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::Row;

use orchestrator_core::{Attempt, AttemptOutcome, AttemptRepository, OrchestratorError, Result};

use crate::rows::{map_sqlx_error, row_to_attempt};
use crate::SqliteStore;

#[async_trait]
impl AttemptRepository for SqliteStore {
    async fn create(
        &self,
        task_id: &str,
        approach: &str,
        outcome: AttemptOutcome,
        reason: Option<String>,
    ) -> Result<Attempt> {
        let now = chrono::Utc::now();
        let result = sqlx::query(
            "INSERT INTO attempts (task_id, approach, outcome, reason, created_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(task_id)
        .bind(approach.trim())
        .bind(outcome.to_string())
        .bind(&reason)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        let row = sqlx::query("SELECT * FROM attempts WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row_to_attempt(&row)
    }

    async fn get(&self, id: i64) -> Result<Option<Attempt>> {
        let row = sqlx::query("SELECT * FROM attempts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_attempt).transpose()
    }

    async fn list_for_task(&self, task_id: &str) -> Result<Vec<Attempt>> {
        let rows = sqlx::query("SELECT * FROM attempts WHERE task_id = ? ORDER BY id ASC")
            .bind(task_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_attempt).collect()
    }

    async fn remove(&self, id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM attempts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::AttemptNotFound { id });
        }
        Ok(())
    }

    async fn get_failed_count(&self, task_id: &str) -> Result<i64> {
        Ok(
            sqlx::query("SELECT COUNT(*) as c FROM attempts WHERE task_id = ? AND outcome = 'failed'")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?
                .get("c"),
        )
    }

    async fn get_failed_counts_for_tasks(&self, ids: &[String]) -> Result<HashMap<String, i64>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT task_id, COUNT(*) as c FROM attempts WHERE outcome = 'failed' AND task_id IN (",
        );
        let mut sep = qb.separated(", ");
        for id in ids {
            sep.push_bind(id.clone());
        }
        qb.push(") GROUP BY task_id");
        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        let mut out = HashMap::new();
        for row in rows {
            let task_id: String = row.get("task_id");
            let count: i64 = row.get("c");
            if count > 0 {
                out.insert(task_id, count);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{NewTask, TaskRepository};

    #[tokio::test]
    async fn failed_counts_for_tasks_are_sparse() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let a = store.create(NewTask { title: "a".into(), ..Default::default() }).await.unwrap();
        let b = store.create(NewTask { title: "b".into(), ..Default::default() }).await.unwrap();
        store.create(&a.id, "x", AttemptOutcome::Failed, None).await.unwrap();
        store.create(&a.id, "y", AttemptOutcome::Succeeded, None).await.unwrap();

        let counts = store.get_failed_counts_for_tasks(&[a.id.clone(), b.id.clone()]).await.unwrap();
        assert_eq!(counts.get(&a.id), Some(&1));
        assert!(!counts.contains_key(&b.id));
    }

    #[tokio::test]
    async fn remove_of_unknown_id_errors() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let err = store.remove(999).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
