//! Score service (§4.4): assembles a [`ScoreBreakdown`] from the three
//! component values, each sourced from a different repository.

use std::sync::Arc;

use orchestrator_core::{
    scoring, DependencyRepository, HierarchyRepository, OrchestratorError, Result,
    ScoreBreakdown, TaskRepository,
};

pub struct ScoreService<T, D, H> {
    tasks: Arc<T>,
    dependencies: Arc<D>,
    hierarchy: Arc<H>,
}

impl<T, D, H> ScoreService<T, D, H>
where
    T: TaskRepository,
    D: DependencyRepository,
    H: HierarchyRepository,
{
    pub fn new(tasks: Arc<T>, dependencies: Arc<D>, hierarchy: Arc<H>) -> Self {
        Self { tasks, dependencies, hierarchy }
    }

    pub async fn get_breakdown_by_id(&self, id: &str) -> Result<ScoreBreakdown> {
        let task = self
            .tasks
            .get(id)
            .await?
            .ok_or_else(|| OrchestratorError::task_not_found(id))?;
        let depth = self.hierarchy.get_depth(id).await?;
        let blockers = self.dependencies.list_blockers(id).await?;
        let mut unsatisfied = 0u32;
        for blocker_id in &blockers {
            if let Some(blocker) = self.tasks.get(blocker_id).await? {
                if blocker.status != orchestrator_core::TaskStatus::Done {
                    unsatisfied += 1;
                }
            }
        }
        let transitively_blocks = self.count_transitively_blocked(id).await?;
        Ok(scoring::breakdown(task.score, transitively_blocks, depth, unsatisfied))
    }

    /// Number of distinct tasks reachable by following `blocks` edges
    /// forward from `id` (i.e. everything `id` directly or transitively
    /// blocks).
    async fn count_transitively_blocked(&self, id: &str) -> Result<u32> {
        use std::collections::{HashSet, VecDeque};

        let mut seen: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::new();
        queue.push_back(id.to_string());

        while let Some(current) = queue.pop_front() {
            for next in self.dependencies.list_blocking(&current).await? {
                if seen.insert(next.clone()) {
                    queue.push_back(next);
                }
            }
        }
        Ok(seen.len() as u32)
    }
}
