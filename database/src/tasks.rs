use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;

use orchestrator_core::{
    NewTask, OrchestratorError, RepositoryStats, Result, Task, TaskFilter, TaskRepository,
    TaskStatus, TaskValidator, TaskWithDeps,
};

use crate::rows::{map_sqlx_error, row_to_task};
use crate::SqliteStore;

#[async_trait]
impl TaskRepository for SqliteStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        TaskValidator::validate_new_task(&task)?;
        let id = format!("tx-{}", hex8());
        let now = Utc::now();
        let metadata = task.metadata.unwrap_or_else(|| serde_json::json!({}));
        sqlx::query(
            "INSERT INTO tasks (id, title, description, status, parent_id, score, created_at, updated_at, metadata)
             VALUES (?, ?, ?, 'backlog', ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(task.title.trim())
        .bind(&task.description)
        .bind(&task.parent_id)
        .bind(task.score.unwrap_or(0))
        .bind(now)
        .bind(now)
        .bind(metadata.to_string())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.get(&id).await?.ok_or_else(|| OrchestratorError::task_not_found(&id))
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn get_with_deps(&self, id: &str) -> Result<Option<TaskWithDeps>> {
        let task = match self.get(id).await? {
            Some(t) => t,
            None => return Ok(None),
        };
        Ok(Some(self.assemble_with_deps(task).await?))
    }

    async fn update(&self, id: &str, patch: orchestrator_core::UpdateTask) -> Result<Task> {
        let task = self.get(id).await?.ok_or_else(|| OrchestratorError::task_not_found(id))?;
        if let Some(title) = &patch.title {
            TaskValidator::validate_title(title)?;
        }
        if let Some(status) = patch.status {
            TaskValidator::validate_state_transition(&task, status)?;
        }

        let new_title = patch.title.map(|t| t.trim().to_string()).unwrap_or(task.title);
        let new_description = patch.description.or(task.description);
        let new_status = patch.status.unwrap_or(task.status);
        let new_parent_id = patch.parent_id.unwrap_or(task.parent_id);
        let new_score = patch.score.unwrap_or(task.score);
        let new_metadata = patch.metadata.unwrap_or(task.metadata);
        let now = Utc::now();
        let completed_at = if new_status == TaskStatus::Done {
            Some(task.completed_at.unwrap_or(now))
        } else {
            None
        };

        sqlx::query(
            "UPDATE tasks SET title = ?, description = ?, status = ?, parent_id = ?, score = ?, metadata = ?, updated_at = ?, completed_at = ?
             WHERE id = ?",
        )
        .bind(&new_title)
        .bind(&new_description)
        .bind(new_status.to_string())
        .bind(&new_parent_id)
        .bind(new_score)
        .bind(new_metadata.to_string())
        .bind(now)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        self.get(id).await?.ok_or_else(|| OrchestratorError::task_not_found(id))
    }

    async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        let now = Utc::now();
        // completed_at must be non-null iff status = done (§8.4): bind it
        // explicitly either way rather than coalescing, so forcing a task
        // off `done` actually clears the old timestamp instead of leaving
        // it stranded.
        let completed_at: Option<chrono::DateTime<Utc>> = if status == TaskStatus::Done { Some(now) } else { None };
        let result = sqlx::query(
            "UPDATE tasks SET status = ?, updated_at = ?, completed_at = ? WHERE id = ?",
        )
        .bind(status.to_string())
        .bind(now)
        .bind(completed_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::task_not_found(id));
        }
        self.get(id).await?.ok_or_else(|| OrchestratorError::task_not_found(id))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        if result.rows_affected() == 0 {
            return Err(OrchestratorError::task_not_found(id));
        }
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let mut qb = build_filtered_query(&filter);
        qb.push(" ORDER BY id ASC");
        if let Some(limit) = filter.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }
        if let Some(offset) = filter.offset {
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }
        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn count(&self, filter: TaskFilter) -> Result<u64> {
        let mut qb = sqlx::QueryBuilder::new("SELECT COUNT(*) as c FROM tasks");
        push_where(&mut qb, &filter);
        let row = qb.build().fetch_one(&self.pool).await.map_err(map_sqlx_error)?;
        let count: i64 = row.get("c");
        Ok(count as u64)
    }

    async fn list_with_deps(&self, filter: TaskFilter) -> Result<Vec<TaskWithDeps>> {
        let tasks = self.list(filter).await?;
        let mut out = Vec::with_capacity(tasks.len());
        for task in tasks {
            out.push(self.assemble_with_deps(task).await?);
        }
        Ok(out)
    }

    async fn get_with_deps_batch(&self, ids: &[String]) -> Result<Vec<TaskWithDeps>> {
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(task) = self.get(id).await? {
                out.push(self.assemble_with_deps(task).await?);
            }
        }
        Ok(out)
    }

    async fn ready(&self, limit: i64) -> Result<Vec<Task>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut qb = sqlx::QueryBuilder::new(
            "SELECT t.* FROM tasks t
             WHERE t.status IN ('backlog', 'ready', 'planning')
               AND NOT EXISTS (
                 SELECT 1 FROM dependencies d
                 JOIN tasks blocker ON blocker.id = d.blocker_id
                 WHERE d.blocked_id = t.id AND blocker.status != 'done'
               )
             ORDER BY t.score DESC, t.id ASC",
        );
        if limit > 0 {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
        }
        let rows = qb.build().fetch_all(&self.pool).await.map_err(map_sqlx_error)?;
        rows.iter().map(row_to_task).collect()
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        let total: i64 = sqlx::query("SELECT COUNT(*) as c FROM tasks")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .get("c");
        let by_status_rows = sqlx::query("SELECT status, COUNT(*) as c FROM tasks GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let mut tasks_by_status = std::collections::HashMap::new();
        for row in by_status_rows {
            let status: String = row.get("status");
            let count: i64 = row.get("c");
            tasks_by_status.insert(status, count as u64);
        }
        let latest_created: Option<chrono::DateTime<Utc>> =
            sqlx::query("SELECT MAX(created_at) as m FROM tasks").fetch_one(&self.pool).await.map_err(map_sqlx_error)?.get("m");
        let latest_completed: Option<chrono::DateTime<Utc>> =
            sqlx::query("SELECT MAX(completed_at) as m FROM tasks").fetch_one(&self.pool).await.map_err(map_sqlx_error)?.get("m");
        Ok(RepositoryStats { total_tasks: total as u64, tasks_by_status, latest_created, latest_completed })
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(map_sqlx_error)?;
        Ok(())
    }
}

impl SqliteStore {
    async fn assemble_with_deps(&self, task: Task) -> Result<TaskWithDeps> {
        use orchestrator_core::DependencyRepository;
        use orchestrator_core::HierarchyRepository;

        let blocked_by = self.list_blockers(&task.id).await?;
        let blocks = self.list_blocking(&task.id).await?;
        let children = self.get_children(&task.id).await?;

        let mut is_ready = task.status.is_workable();
        if is_ready {
            for blocker_id in &blocked_by {
                if let Some(blocker) = self.get(blocker_id).await? {
                    if blocker.status != TaskStatus::Done {
                        is_ready = false;
                        break;
                    }
                } else {
                    is_ready = false;
                    break;
                }
            }
        }

        Ok(TaskWithDeps { task, blocked_by, blocks, children, is_ready })
    }
}

fn build_filtered_query(filter: &TaskFilter) -> sqlx::QueryBuilder<'_, sqlx::Sqlite> {
    let mut qb = sqlx::QueryBuilder::new("SELECT * FROM tasks");
    push_where(&mut qb, filter);
    qb
}

fn push_where(qb: &mut sqlx::QueryBuilder<'_, sqlx::Sqlite>, filter: &TaskFilter) {
    let mut has_conditions = false;
    if let Some(statuses) = &filter.status {
        if !statuses.is_empty() {
            qb.push(" WHERE status IN (");
            let mut sep = qb.separated(", ");
            for status in statuses {
                sep.push_bind(status.to_string());
            }
            qb.push(")");
            has_conditions = true;
        }
    }
    if let Some(parent_id) = &filter.parent_id {
        qb.push(if has_conditions { " AND " } else { " WHERE " });
        match parent_id {
            Some(p) => {
                qb.push("parent_id = ");
                qb.push_bind(p.clone());
            }
            None => {
                qb.push("parent_id IS NULL");
            }
        }
        has_conditions = true;
    }
    if let Some(search) = &filter.search {
        let pattern = format!("%{}%", orchestrator_core::validation::escape_like(search));
        qb.push(if has_conditions { " AND " } else { " WHERE " });
        qb.push("(title LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR description LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\')");
    }
}

fn hex8() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 4];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
