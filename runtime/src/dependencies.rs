//! Dependency service (§4.2): self-block and cycle rejection in front of
//! `DependencyRepository::add_blocker`. The cycle check is a plain BFS over
//! the edge set fetched as a whole from the store — an iterative Rust
//! traversal rather than a recursive SQL query, keeping cycle detection
//! independent of any one store's recursion limits.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use orchestrator_core::{Dependency, DependencyRepository, OrchestratorError, Result};

pub struct DependencyService<D> {
    dependencies: Arc<D>,
}

impl<D: DependencyRepository> DependencyService<D> {
    pub fn new(dependencies: Arc<D>) -> Self {
        Self { dependencies }
    }

    /// Adds a `blocker_id -> blocked_id` edge. Rejects self-blocking
    /// directly; rejects a would-be cycle by checking whether `blocker_id`
    /// is already reachable from `blocked_id` through the existing edges
    /// (if it is, adding this edge would close a loop).
    pub async fn add_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        if blocked_id == blocker_id {
            return Err(OrchestratorError::validation("a task cannot block itself"));
        }
        let edges = self.dependencies.all_edges().await?;
        if reachable(&edges, blocked_id, blocker_id) {
            return Err(OrchestratorError::CircularDependency);
        }
        self.dependencies.add_blocker(blocked_id, blocker_id).await
    }

    /// Idempotent: removing a non-existent edge succeeds silently.
    pub async fn remove_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        self.dependencies.remove_blocker(blocked_id, blocker_id).await
    }

    pub async fn list_blockers(&self, id: &str) -> Result<Vec<String>> {
        self.dependencies.list_blockers(id).await
    }

    pub async fn list_blocking(&self, id: &str) -> Result<Vec<String>> {
        self.dependencies.list_blocking(id).await
    }
}

/// BFS from `from`, following `blocker -> blocked` edges forward, returning
/// whether `to` is reachable.
fn reachable(edges: &[Dependency], from: &str, to: &str) -> bool {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        adjacency
            .entry(edge.blocker_id.as_str())
            .or_default()
            .push(edge.blocked_id.as_str());
    }

    let mut seen = HashSet::new();
    let mut queue = VecDeque::new();
    seen.insert(from);
    queue.push_back(from);

    while let Some(node) = queue.pop_front() {
        if node == to {
            return true;
        }
        if let Some(neighbors) = adjacency.get(node) {
            for &next in neighbors {
                if seen.insert(next) {
                    queue.push_back(next);
                }
            }
        }
    }
    false
}
