use async_trait::async_trait;
use sqlx::Row;

use orchestrator_core::{Dependency, DependencyRepository, Result};

use crate::rows::map_sqlx_error;
use crate::SqliteStore;

#[async_trait]
impl DependencyRepository for SqliteStore {
    async fn add_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO dependencies (blocker_id, blocked_id) VALUES (?, ?)")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn remove_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        sqlx::query("DELETE FROM dependencies WHERE blocker_id = ? AND blocked_id = ?")
            .bind(blocker_id)
            .bind(blocked_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn list_blockers(&self, id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT blocker_id FROM dependencies WHERE blocked_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get("blocker_id")).collect())
    }

    async fn list_blocking(&self, id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT blocked_id FROM dependencies WHERE blocker_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get("blocked_id")).collect())
    }

    async fn all_edges(&self) -> Result<Vec<Dependency>> {
        let rows = sqlx::query("SELECT blocker_id, blocked_id FROM dependencies")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows
            .iter()
            .map(|r| Dependency { blocker_id: r.get("blocker_id"), blocked_id: r.get("blocked_id") })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{NewTask, TaskRepository};

    async fn store_with_two_tasks() -> (SqliteStore, String, String) {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let a = store.create(NewTask { title: "a".into(), ..Default::default() }).await.unwrap();
        let b = store.create(NewTask { title: "b".into(), ..Default::default() }).await.unwrap();
        (store, a.id, b.id)
    }

    #[tokio::test]
    async fn remove_blocker_is_idempotent() {
        let (store, a, b) = store_with_two_tasks().await;
        store.add_blocker(&b, &a).await.unwrap();
        store.remove_blocker(&b, &a).await.unwrap();
        store.remove_blocker(&b, &a).await.unwrap();
        assert!(store.list_blockers(&b).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn duplicate_edge_insert_is_a_no_op() {
        let (store, a, b) = store_with_two_tasks().await;
        store.add_blocker(&b, &a).await.unwrap();
        store.add_blocker(&b, &a).await.unwrap();
        assert_eq!(store.list_blockers(&b).await.unwrap().len(), 1);
    }
}
