//! Task labels (§4.11). Case-insensitive uniqueness is enforced by the
//! `idx_task_labels_name_ci` expression index on `lower(name)`; `upsert`
//! just tries the insert and falls back to an update on conflict rather
//! than a SELECT-then-branch, so it stays correct under concurrent upserts
//! of the same name.

use async_trait::async_trait;
use sqlx::Row;

use orchestrator_core::{LabelRepository, Result, TaskLabel};

use crate::rows::{map_sqlx_error, row_to_label};
use crate::SqliteStore;

#[async_trait]
impl LabelRepository for SqliteStore {
    async fn upsert(&self, name: &str, color: &str) -> Result<TaskLabel> {
        let existing = sqlx::query("SELECT * FROM task_labels WHERE lower(name) = lower(?)")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if let Some(row) = existing {
            let id: i64 = row.get("id");
            sqlx::query("UPDATE task_labels SET color = ? WHERE id = ?")
                .bind(color)
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            let row = sqlx::query("SELECT * FROM task_labels WHERE id = ?")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            return row_to_label(&row);
        }

        let result = sqlx::query("INSERT INTO task_labels (name, color) VALUES (?, ?)")
            .bind(name)
            .bind(color)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let row = sqlx::query("SELECT * FROM task_labels WHERE id = ?")
            .bind(result.last_insert_rowid())
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row_to_label(&row)
    }

    async fn list(&self) -> Result<Vec<TaskLabel>> {
        let rows = sqlx::query("SELECT * FROM task_labels ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_label).collect()
    }

    async fn attach(&self, task_id: &str, label_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO label_assignments (task_id, label_id) VALUES (?, ?)")
            .bind(task_id)
            .bind(label_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn detach(&self, task_id: &str, label_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM label_assignments WHERE task_id = ? AND label_id = ?")
            .bind(task_id)
            .bind(label_id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn labels_for_task(&self, task_id: &str) -> Result<Vec<TaskLabel>> {
        let rows = sqlx::query(
            "SELECT tl.* FROM task_labels tl
             JOIN label_assignments la ON la.label_id = tl.id
             WHERE la.task_id = ?
             ORDER BY tl.id ASC",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        rows.iter().map(row_to_label).collect()
    }
}

/// Rewrites legacy label names to their canonical replacement, applied once
/// at store open against a config-supplied `Vec<(from, to)>` (empty by
/// default — most stores never carry legacy names). If `to` already exists
/// (case-insensitively), `from`'s assignments are merged into it and `from`
/// is dropped; otherwise `from` is simply renamed in place.
pub async fn apply_legacy_rewrites(store: &SqliteStore, rewrites: &[(String, String)]) -> Result<()> {
    for (from, to) in rewrites {
        let from_row = sqlx::query("SELECT * FROM task_labels WHERE lower(name) = lower(?)")
            .bind(from)
            .fetch_optional(&store.pool)
            .await
            .map_err(map_sqlx_error)?;
        let Some(from_row) = from_row else { continue };
        let from_id: i64 = from_row.get("id");

        let to_row = sqlx::query("SELECT * FROM task_labels WHERE lower(name) = lower(?)")
            .bind(to)
            .fetch_optional(&store.pool)
            .await
            .map_err(map_sqlx_error)?;

        match to_row {
            Some(to_row) => {
                let to_id: i64 = to_row.get("id");
                sqlx::query(
                    "INSERT OR IGNORE INTO label_assignments (task_id, label_id)
                     SELECT task_id, ? FROM label_assignments WHERE label_id = ?",
                )
                .bind(to_id)
                .bind(from_id)
                .execute(&store.pool)
                .await
                .map_err(map_sqlx_error)?;
                sqlx::query("DELETE FROM task_labels WHERE id = ?")
                    .bind(from_id)
                    .execute(&store.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            }
            None => {
                sqlx::query("UPDATE task_labels SET name = ? WHERE id = ?")
                    .bind(to)
                    .bind(from_id)
                    .execute(&store.pool)
                    .await
                    .map_err(map_sqlx_error)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{NewTask, TaskRepository};

    #[tokio::test]
    async fn upsert_is_case_insensitive_and_updates_color() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let a = store.upsert("Bug", "#ff0000").await.unwrap();
        let b = store.upsert("bug", "#00ff00").await.unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.color, "#00ff00");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn attach_is_idempotent_and_detach_removes_it() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let task = store.create(NewTask { title: "t".into(), ..Default::default() }).await.unwrap();
        let label = store.upsert("bug", "#ff0000").await.unwrap();

        store.attach(&task.id, label.id).await.unwrap();
        store.attach(&task.id, label.id).await.unwrap();
        assert_eq!(store.labels_for_task(&task.id).await.unwrap().len(), 1);

        store.detach(&task.id, label.id).await.unwrap();
        assert!(store.labels_for_task(&task.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn legacy_rewrite_merges_into_existing_canonical_label() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let task = store.create(NewTask { title: "t".into(), ..Default::default() }).await.unwrap();
        let legacy = store.upsert("defect", "#ff0000").await.unwrap();
        let canonical = store.upsert("bug", "#00ff00").await.unwrap();
        store.attach(&task.id, legacy.id).await.unwrap();

        apply_legacy_rewrites(&store, &[("defect".to_string(), "bug".to_string())]).await.unwrap();

        assert_eq!(store.list().await.unwrap().len(), 1);
        let labels = store.labels_for_task(&task.id).await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].id, canonical.id);
    }

    #[tokio::test]
    async fn legacy_rewrite_renames_in_place_when_no_canonical_exists() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let legacy = store.upsert("defect", "#ff0000").await.unwrap();

        apply_legacy_rewrites(&store, &[("defect".to_string(), "bug".to_string())]).await.unwrap();

        let labels = store.list().await.unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels[0].id, legacy.id);
        assert_eq!(labels[0].name, "bug");
    }

    #[tokio::test]
    async fn legacy_rewrite_is_a_noop_when_legacy_name_is_absent() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        apply_legacy_rewrites(&store, &[("defect".to_string(), "bug".to_string())]).await.unwrap();
        assert!(store.list().await.unwrap().is_empty());
    }
}
