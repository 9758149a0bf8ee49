//! Hierarchy traversal (§4.3). Ancestors/depth/roots/tree walk `parent_id`
//! with a handful of round-trips rather than a recursive CTE: hierarchies
//! are expected in the tens, not millions, of rows, and keeping the walk in
//! application code avoids depending on any one store's recursive-CTE
//! support (see `orchestrator-runtime::dependencies` for the same choice).

use async_trait::async_trait;
use sqlx::Row;

use orchestrator_core::{HierarchyRepository, Result, Task, TaskTree};

use crate::rows::{map_sqlx_error, row_to_task};
use crate::SqliteStore;

#[async_trait]
impl HierarchyRepository for SqliteStore {
    async fn get_children(&self, id: &str) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM tasks WHERE parent_id = ?")
            .bind(id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn get_ancestors(&self, id: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut current = self.parent_of(id).await?;
        while let Some(parent_id) = current {
            current = self.parent_of(&parent_id).await?;
            out.push(parent_id);
        }
        Ok(out)
    }

    async fn get_depth(&self, id: &str) -> Result<u32> {
        Ok(self.get_ancestors(id).await?.len() as u32)
    }

    async fn get_roots(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("SELECT id FROM tasks WHERE parent_id IS NULL")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(rows.iter().map(|r| r.get("id")).collect())
    }

    async fn get_tree(&self, id: &str, max_depth: Option<u32>) -> Result<Option<TaskTree>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let task = match row.as_ref().map(row_to_task).transpose()? {
            Some(t) => t,
            None => return Ok(None),
        };
        Ok(Some(self.build_tree(task, max_depth).await?))
    }
}

impl SqliteStore {
    async fn parent_of(&self, id: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT parent_id FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(row.and_then(|r| r.get::<Option<String>, _>("parent_id")))
    }

    /// Recursive depth-first assembly. `remaining` counts levels still
    /// allowed below the current node; `Some(0)` stops expansion (children
    /// are omitted but the node itself is still included), `None` is
    /// unbounded.
    fn build_tree<'a>(
        &'a self,
        task: Task,
        remaining: Option<u32>,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<TaskTree>> + Send + 'a>> {
        Box::pin(async move {
            if remaining == Some(0) {
                return Ok(TaskTree { task, children: Vec::new() });
            }
            let child_ids = self.get_children(&task.id).await?;
            let next_remaining = remaining.map(|r| r - 1);
            let mut children = Vec::with_capacity(child_ids.len());
            for child_id in child_ids {
                let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
                    .bind(&child_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(map_sqlx_error)?;
                if let Some(child_task) = row.as_ref().map(row_to_task).transpose()? {
                    children.push(self.build_tree(child_task, next_remaining).await?);
                }
            }
            Ok(TaskTree { task, children })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::{NewTask, TaskRepository};

    #[tokio::test]
    async fn fifty_deep_hierarchy_resolves_depth_and_ancestors() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let mut parent: Option<String> = None;
        let mut chain = Vec::new();
        for _ in 0..50 {
            let task = store
                .create(NewTask { title: "t".into(), parent_id: parent.clone(), ..Default::default() })
                .await
                .unwrap();
            parent = Some(task.id.clone());
            chain.push(task.id);
        }
        let leaf = chain.last().unwrap();
        assert_eq!(store.get_depth(leaf).await.unwrap(), 49);
        let ancestors = store.get_ancestors(leaf).await.unwrap();
        assert_eq!(ancestors.len(), 49);
        assert_eq!(ancestors[0], chain[chain.len() - 2]);
        assert_eq!(*ancestors.last().unwrap(), chain[0]);
    }

    #[tokio::test]
    async fn tree_respects_max_depth() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let root = store.create(NewTask { title: "root".into(), ..Default::default() }).await.unwrap();
        let child = store
            .create(NewTask { title: "child".into(), parent_id: Some(root.id.clone()), ..Default::default() })
            .await
            .unwrap();
        store
            .create(NewTask { title: "grandchild".into(), parent_id: Some(child.id.clone()), ..Default::default() })
            .await
            .unwrap();

        let tree = store.get_tree(&root.id, Some(1)).await.unwrap().unwrap();
        assert_eq!(tree.children.len(), 1);
        assert!(tree.children[0].children.is_empty());

        let full = store.get_tree(&root.id, None).await.unwrap().unwrap();
        assert_eq!(full.children[0].children.len(), 1);
    }

    #[tokio::test]
    async fn roots_are_tasks_without_a_parent() {
        let store = SqliteStore::connect(":memory:").await.unwrap();
        let root = store.create(NewTask { title: "root".into(), ..Default::default() }).await.unwrap();
        store
            .create(NewTask { title: "child".into(), parent_id: Some(root.id.clone()), ..Default::default() })
            .await
            .unwrap();
        let roots = store.get_roots().await.unwrap();
        assert!(roots.contains(&root.id));
        assert_eq!(roots.len(), 1);
    }
}
