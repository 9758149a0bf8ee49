//! Task service (§4.1): thin validation wrapper around `TaskRepository`,
//! plus the one piece of cross-task orchestration the repository contract
//! explicitly carves out — parent auto-completion after a task reaches
//! `done` through the checked `update` path.
//!
//! `force_status` bypasses both the transition graph *and* auto-completion
//! (per the repository contract), so the recursive walk up the hierarchy
//! here calls `force_status` on each ancestor it completes: that climb is
//! an internal implementation detail of "a task reached done via `update`",
//! not a second public entry point a caller could trigger by hand.

use std::sync::Arc;

use orchestrator_core::{
    HierarchyRepository, NewTask, OrchestratorError, Result, Task, TaskFilter, TaskRepository,
    TaskStatus, TaskValidator, TaskWithDeps, UpdateTask,
};

pub struct TaskService<T, H> {
    tasks: Arc<T>,
    hierarchy: Arc<H>,
}

impl<T: TaskRepository, H: HierarchyRepository> TaskService<T, H> {
    pub fn new(tasks: Arc<T>, hierarchy: Arc<H>) -> Self {
        Self { tasks, hierarchy }
    }

    pub async fn create(&self, input: NewTask) -> Result<Task> {
        TaskValidator::validate_title(&input.title)?;
        if let Some(parent_id) = &input.parent_id {
            self.require_task(parent_id).await?;
        }
        self.tasks.create(input).await
    }

    pub async fn get(&self, id: &str) -> Result<Task> {
        self.require_task(id).await
    }

    pub async fn get_with_deps(&self, id: &str) -> Result<TaskWithDeps> {
        self.tasks
            .get_with_deps(id)
            .await?
            .ok_or_else(|| OrchestratorError::task_not_found(id))
    }

    pub async fn get_with_deps_batch(&self, ids: &[String]) -> Result<Vec<TaskWithDeps>> {
        self.tasks.get_with_deps_batch(ids).await
    }

    pub async fn update(&self, id: &str, patch: UpdateTask) -> Result<Task> {
        if let Some(title) = &patch.title {
            TaskValidator::validate_title(title)?;
        }
        if let Some(Some(parent_id)) = &patch.parent_id {
            if parent_id == id {
                return Err(OrchestratorError::validation("a task cannot be its own parent"));
            }
            self.require_task(parent_id).await?;
        }
        let wants_done = patch.status == Some(TaskStatus::Done);
        let updated = self.tasks.update(id, patch).await?;
        if wants_done {
            self.autocomplete_ancestors(&updated).await?;
        }
        Ok(updated)
    }

    pub async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        self.tasks.force_status(id, status).await
    }

    pub async fn delete(&self, id: &str) -> Result<()> {
        self.tasks.delete(id).await
    }

    pub async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        self.tasks.list(filter).await
    }

    pub async fn count(&self, filter: TaskFilter) -> Result<u64> {
        self.tasks.count(filter).await
    }

    pub async fn list_with_deps(&self, filter: TaskFilter) -> Result<Vec<TaskWithDeps>> {
        self.tasks.list_with_deps(filter).await
    }

    async fn require_task(&self, id: &str) -> Result<Task> {
        self.tasks
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::task_not_found(id))
    }

    /// Walks from `completed`'s parent upward, completing each ancestor
    /// whose full sibling set is now `done`, stopping at the first ancestor
    /// that isn't (or that has no parent).
    async fn autocomplete_ancestors(&self, completed: &Task) -> Result<()> {
        let mut parent_id = match &completed.parent_id {
            Some(id) => id.clone(),
            None => return Ok(()),
        };
        loop {
            let siblings = self.hierarchy.get_children(&parent_id).await?;
            if siblings.is_empty() {
                return Ok(());
            }
            let mut all_done = true;
            for sibling_id in &siblings {
                let sibling = self.require_task(sibling_id).await?;
                if sibling.status != TaskStatus::Done {
                    all_done = false;
                    break;
                }
            }
            if !all_done {
                return Ok(());
            }
            let parent = self.require_task(&parent_id).await?;
            if parent.status == TaskStatus::Done {
                return Ok(());
            }
            let forced = self.tasks.force_status(&parent_id, TaskStatus::Done).await?;
            match forced.parent_id {
                Some(next) => parent_id = next,
                None => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_mocks::InMemoryStore;

    fn service(store: &Arc<InMemoryStore>) -> TaskService<InMemoryStore, InMemoryStore> {
        TaskService::new(store.clone(), store.clone())
    }

    #[tokio::test]
    async fn create_rejects_whitespace_only_title() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let err = svc
            .create(NewTask {
                title: "   ".into(),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn create_rejects_missing_parent() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        let err = svc
            .create(NewTask {
                title: "child".into(),
                parent_id: Some("tx-deadbeef".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn completing_all_children_auto_completes_parent() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);

        let parent = svc
            .create(NewTask { title: "parent".into(), ..Default::default() })
            .await
            .unwrap();
        svc.force_status(&parent.id, TaskStatus::Active).await.unwrap();

        let mut children = Vec::new();
        for name in ["c1", "c2", "c3"] {
            let child = svc
                .create(NewTask {
                    title: name.into(),
                    parent_id: Some(parent.id.clone()),
                    ..Default::default()
                })
                .await
                .unwrap();
            svc.force_status(&child.id, TaskStatus::Active).await.unwrap();
            children.push(child);
        }

        for (i, child) in children.iter().enumerate() {
            let patch = UpdateTask { status: Some(TaskStatus::Done), ..Default::default() };
            let updated = svc.update(&child.id, patch).await.unwrap();
            assert_eq!(updated.status, TaskStatus::Done);
            let parent_now = svc.get(&parent.id).await.unwrap();
            if i < children.len() - 1 {
                assert_ne!(parent_now.status, TaskStatus::Done, "parent completes only after the last child");
            } else {
                assert_eq!(parent_now.status, TaskStatus::Done);
            }
        }

        // forceStatus back to backlog must not un-complete the parent.
        svc.force_status(&children[2].id, TaskStatus::Backlog).await.unwrap();
        let parent_after = svc.get(&parent.id).await.unwrap();
        assert_eq!(parent_after.status, TaskStatus::Done);
    }
}
