//! In-memory test doubles for every `orchestrator-core` repository trait.
//!
//! [`InMemoryStore`] implements all ten traits behind `parking_lot::Mutex`-
//! guarded tables: an `Arc`-free, directly constructible store with no I/O,
//! generalized across the full repository surface instead of just tasks.
//! It is the store used by `orchestrator-runtime`'s own unit tests and by
//! `integration-tests` scenarios that don't need real SQLite semantics.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use orchestrator_core::{
    Attempt, AttemptOutcome, AttemptRepository, Candidate, CandidateFilter, CandidateRepository,
    CandidateStatus, CandidateTransition, Claim, ClaimRepository, ClaimStatus, Dependency,
    DependencyRepository, HeartbeatInput, HierarchyRepository, LabelAssignment, LabelRepository,
    Learning, LearningRepository, LearningSearchResult, NewCandidate, NewLearning, NewTask,
    NewWorker, OrchestratorError, OrchestratorState, OrchestratorStateRepository,
    OrchestratorStatus, RepositoryStats, Result, StartConfig, Task, TaskFilter, TaskLabel,
    TaskRepository, TaskStatus, TaskTree, TaskWithDeps, UpdateTask, Worker, WorkerRepository,
    WorkerStatus,
};

/// A single in-process store implementing every repository trait.
/// Construct one `Arc<InMemoryStore>` per test and hand the same `Arc` to
/// every service under test that needs a particular trait.
pub struct InMemoryStore {
    tasks: Mutex<HashMap<String, Task>>,
    dependencies: Mutex<Vec<Dependency>>,
    claims: Mutex<HashMap<i64, Claim>>,
    next_claim_id: AtomicI64,
    workers: Mutex<HashMap<String, Worker>>,
    orchestrator_state: Mutex<OrchestratorState>,
    attempts: Mutex<HashMap<i64, Attempt>>,
    next_attempt_id: AtomicI64,
    learnings: Mutex<HashMap<i64, Learning>>,
    next_learning_id: AtomicI64,
    candidates: Mutex<HashMap<i64, Candidate>>,
    next_candidate_id: AtomicI64,
    labels: Mutex<HashMap<i64, TaskLabel>>,
    next_label_id: AtomicI64,
    label_assignments: Mutex<Vec<LabelAssignment>>,
    ids: Mutex<orchestrator_core::ids::IdGenerator>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            dependencies: Mutex::new(Vec::new()),
            claims: Mutex::new(HashMap::new()),
            next_claim_id: AtomicI64::new(1),
            workers: Mutex::new(HashMap::new()),
            orchestrator_state: Mutex::new(OrchestratorState::default()),
            attempts: Mutex::new(HashMap::new()),
            next_attempt_id: AtomicI64::new(1),
            learnings: Mutex::new(HashMap::new()),
            next_learning_id: AtomicI64::new(1),
            candidates: Mutex::new(HashMap::new()),
            next_candidate_id: AtomicI64::new(1),
            labels: Mutex::new(HashMap::new()),
            next_label_id: AtomicI64::new(1),
            label_assignments: Mutex::new(Vec::new()),
            ids: Mutex::new(orchestrator_core::ids::IdGenerator::random()),
        }
    }

    /// A store seeded with a deterministic id generator, for tests that
    /// assert on exact ids.
    pub fn seeded(seed: u64) -> Self {
        let store = Self::new();
        *store.ids.lock() = orchestrator_core::ids::IdGenerator::seeded(seed);
        store
    }

    fn with_deps(&self, task: Task) -> TaskWithDeps {
        let deps = self.dependencies.lock();
        let blocked_by: Vec<String> = deps
            .iter()
            .filter(|d| d.blocked_id == task.id)
            .map(|d| d.blocker_id.clone())
            .collect();
        let blocks: Vec<String> = deps
            .iter()
            .filter(|d| d.blocker_id == task.id)
            .map(|d| d.blocked_id.clone())
            .collect();
        drop(deps);
        let tasks = self.tasks.lock();
        let children: Vec<String> = tasks
            .values()
            .filter(|t| t.parent_id.as_deref() == Some(task.id.as_str()))
            .map(|t| t.id.clone())
            .collect();
        let is_ready = task.status.is_workable()
            && blocked_by
                .iter()
                .all(|b| tasks.get(b).map(|t| t.status == TaskStatus::Done).unwrap_or(false));
        TaskWithDeps { task, blocked_by, blocks, children, is_ready }
    }
}

#[async_trait]
impl TaskRepository for InMemoryStore {
    async fn create(&self, task: NewTask) -> Result<Task> {
        let id = self.ids.lock().task_id();
        let now = Utc::now();
        let created = Task {
            id: id.clone(),
            title: task.title.trim().to_string(),
            description: task.description,
            status: TaskStatus::Backlog,
            parent_id: task.parent_id,
            score: task.score.unwrap_or(0),
            created_at: now,
            updated_at: now,
            completed_at: None,
            metadata: task.metadata.unwrap_or_else(|| serde_json::json!({})),
        };
        self.tasks.lock().insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: &str) -> Result<Option<Task>> {
        Ok(self.tasks.lock().get(id).cloned())
    }

    async fn get_with_deps(&self, id: &str) -> Result<Option<TaskWithDeps>> {
        let task = self.tasks.lock().get(id).cloned();
        Ok(task.map(|t| self.with_deps(t)))
    }

    async fn update(&self, id: &str, patch: UpdateTask) -> Result<Task> {
        let mut tasks = self.tasks.lock();
        let task = tasks.get(id).cloned().ok_or_else(|| OrchestratorError::task_not_found(id))?;
        if let Some(status) = patch.status {
            if !task.can_transition_to(status) {
                return Err(OrchestratorError::validation(format!(
                    "cannot transition task from {} to {status}",
                    task.status
                )));
            }
        }
        let mut updated = task;
        if let Some(title) = patch.title {
            updated.title = title.trim().to_string();
        }
        if let Some(description) = patch.description {
            updated.description = Some(description);
        }
        if let Some(status) = patch.status {
            updated.status = status;
            // completed_at must be non-null iff status = done (§8.4).
            if status == TaskStatus::Done {
                updated.completed_at = Some(updated.completed_at.unwrap_or_else(Utc::now));
            } else {
                updated.completed_at = None;
            }
        }
        if let Some(parent_id) = patch.parent_id {
            updated.parent_id = parent_id;
        }
        if let Some(score) = patch.score {
            updated.score = score;
        }
        if let Some(metadata) = patch.metadata {
            updated.metadata = metadata;
        }
        updated.updated_at = Utc::now();
        tasks.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn force_status(&self, id: &str, status: TaskStatus) -> Result<Task> {
        let mut tasks = self.tasks.lock();
        let mut task = tasks.get(id).cloned().ok_or_else(|| OrchestratorError::task_not_found(id))?;
        task.status = status;
        task.updated_at = Utc::now();
        // completed_at must be non-null iff status = done (§8.4): clear it
        // explicitly rather than leaving a stale timestamp when forcing a
        // task off `done`.
        if status == TaskStatus::Done {
            task.completed_at = Some(task.completed_at.unwrap_or_else(Utc::now));
        } else {
            task.completed_at = None;
        }
        tasks.insert(id.to_string(), task.clone());
        Ok(task)
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let mut tasks = self.tasks.lock();
        if tasks.remove(id).is_none() {
            return Err(OrchestratorError::task_not_found(id));
        }
        for t in tasks.values_mut() {
            if t.parent_id.as_deref() == Some(id) {
                t.parent_id = None;
            }
        }
        drop(tasks);
        self.dependencies.lock().retain(|d| d.blocker_id != id && d.blocked_id != id);
        self.claims.lock().retain(|_, c| c.task_id != id);
        Ok(())
    }

    async fn list(&self, filter: TaskFilter) -> Result<Vec<Task>> {
        let tasks = self.tasks.lock();
        let mut out: Vec<Task> = tasks
            .values()
            .filter(|t| filter_matches(t, &filter))
            .cloned()
            .collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(offset) = filter.offset {
            out = out.into_iter().skip(offset.max(0) as usize).collect();
        }
        if let Some(limit) = filter.limit {
            if limit >= 0 {
                out.truncate(limit as usize);
            }
        }
        Ok(out)
    }

    async fn count(&self, filter: TaskFilter) -> Result<u64> {
        let tasks = self.tasks.lock();
        Ok(tasks.values().filter(|t| filter_matches(t, &filter)).count() as u64)
    }

    async fn list_with_deps(&self, filter: TaskFilter) -> Result<Vec<TaskWithDeps>> {
        let matching = self.list(filter).await?;
        Ok(matching.into_iter().map(|t| self.with_deps(t)).collect())
    }

    async fn get_with_deps_batch(&self, ids: &[String]) -> Result<Vec<TaskWithDeps>> {
        let found: Vec<Task> = {
            let tasks = self.tasks.lock();
            ids.iter().filter_map(|id| tasks.get(id).cloned()).collect()
        };
        Ok(found.into_iter().map(|t| self.with_deps(t)).collect())
    }

    async fn ready(&self, limit: i64) -> Result<Vec<Task>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let tasks = self.tasks.lock();
        let deps = self.dependencies.lock();
        let mut candidates: Vec<Task> = tasks
            .values()
            .filter(|t| {
                t.status.is_workable()
                    && deps
                        .iter()
                        .filter(|d| d.blocked_id == t.id)
                        .all(|d| tasks.get(&d.blocker_id).map(|b| b.status == TaskStatus::Done).unwrap_or(true))
            })
            .cloned()
            .collect();
        candidates.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        if limit > 0 {
            candidates.truncate(limit as usize);
        }
        Ok(candidates)
    }

    async fn get_stats(&self) -> Result<RepositoryStats> {
        let tasks = self.tasks.lock();
        let mut by_status: HashMap<String, u64> = HashMap::new();
        let mut latest_created: Option<DateTime<Utc>> = None;
        let mut latest_completed: Option<DateTime<Utc>> = None;
        for t in tasks.values() {
            *by_status.entry(t.status.to_string()).or_insert(0) += 1;
            latest_created = Some(latest_created.map_or(t.created_at, |c| c.max(t.created_at)));
            if let Some(completed) = t.completed_at {
                latest_completed = Some(latest_completed.map_or(completed, |c| c.max(completed)));
            }
        }
        Ok(RepositoryStats {
            total_tasks: tasks.len() as u64,
            tasks_by_status: by_status,
            latest_created,
            latest_completed,
        })
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

fn filter_matches(task: &Task, filter: &TaskFilter) -> bool {
    if let Some(statuses) = &filter.status {
        if !statuses.contains(&task.status) {
            return false;
        }
    }
    if let Some(parent_id) = &filter.parent_id {
        if &task.parent_id != parent_id {
            return false;
        }
    }
    if let Some(search) = &filter.search {
        let needle = search.to_lowercase();
        let haystack = format!("{} {}", task.title, task.description.clone().unwrap_or_default()).to_lowercase();
        if !haystack.contains(&needle) {
            return false;
        }
    }
    true
}

#[async_trait]
impl DependencyRepository for InMemoryStore {
    async fn add_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        let mut deps = self.dependencies.lock();
        if !deps.iter().any(|d| d.blocker_id == blocker_id && d.blocked_id == blocked_id) {
            deps.push(Dependency { blocker_id: blocker_id.into(), blocked_id: blocked_id.into() });
        }
        Ok(())
    }

    async fn remove_blocker(&self, blocked_id: &str, blocker_id: &str) -> Result<()> {
        self.dependencies.lock().retain(|d| !(d.blocker_id == blocker_id && d.blocked_id == blocked_id));
        Ok(())
    }

    async fn list_blockers(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.dependencies.lock().iter().filter(|d| d.blocked_id == id).map(|d| d.blocker_id.clone()).collect())
    }

    async fn list_blocking(&self, id: &str) -> Result<Vec<String>> {
        Ok(self.dependencies.lock().iter().filter(|d| d.blocker_id == id).map(|d| d.blocked_id.clone()).collect())
    }

    async fn all_edges(&self) -> Result<Vec<Dependency>> {
        Ok(self.dependencies.lock().clone())
    }
}

#[async_trait]
impl HierarchyRepository for InMemoryStore {
    async fn get_children(&self, id: &str) -> Result<Vec<String>> {
        let tasks = self.tasks.lock();
        Ok(tasks.values().filter(|t| t.parent_id.as_deref() == Some(id)).map(|t| t.id.clone()).collect())
    }

    async fn get_ancestors(&self, id: &str) -> Result<Vec<String>> {
        let tasks = self.tasks.lock();
        let mut out = Vec::new();
        let mut current = tasks.get(id).and_then(|t| t.parent_id.clone());
        while let Some(parent_id) = current {
            out.push(parent_id.clone());
            current = tasks.get(&parent_id).and_then(|t| t.parent_id.clone());
        }
        Ok(out)
    }

    async fn get_depth(&self, id: &str) -> Result<u32> {
        Ok(self.get_ancestors(id).await?.len() as u32)
    }

    async fn get_roots(&self) -> Result<Vec<String>> {
        let tasks = self.tasks.lock();
        Ok(tasks.values().filter(|t| t.parent_id.is_none()).map(|t| t.id.clone()).collect())
    }

    async fn get_tree(&self, id: &str, max_depth: Option<u32>) -> Result<Option<TaskTree>> {
        fn build(id: &str, remaining: Option<u32>, tasks: &HashMap<String, Task>) -> Option<TaskTree> {
            let task = tasks.get(id)?.clone();
            let children = if remaining == Some(0) {
                Vec::new()
            } else {
                let next_remaining = remaining.map(|r| r - 1);
                tasks
                    .values()
                    .filter(|t| t.parent_id.as_deref() == Some(id))
                    .filter_map(|t| build(&t.id, next_remaining, tasks))
                    .collect()
            };
            Some(TaskTree { task, children })
        }
        let tasks = self.tasks.lock();
        Ok(build(id, max_depth, &tasks))
    }
}

#[async_trait]
impl ClaimRepository for InMemoryStore {
    async fn claim(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        let mut claims = self.claims.lock();
        if let Some(existing) = claims.values().find(|c| c.task_id == task_id && c.status == ClaimStatus::Active) {
            return Err(OrchestratorError::already_claimed(task_id, existing.worker_id.clone()));
        }
        let lease_minutes = self.orchestrator_state.lock().lease_duration_minutes;
        let now = Utc::now();
        let id = self.next_claim_id.fetch_add(1, Ordering::SeqCst);
        let claim = Claim {
            id,
            task_id: task_id.into(),
            worker_id: worker_id.into(),
            claimed_at: now,
            lease_expires_at: now + Duration::minutes(lease_minutes),
            renewed_count: 0,
            status: ClaimStatus::Active,
        };
        claims.insert(id, claim.clone());
        Ok(claim)
    }

    async fn renew(&self, task_id: &str, worker_id: &str) -> Result<Claim> {
        let lease_minutes = self.orchestrator_state.lock().lease_duration_minutes;
        let mut claims = self.claims.lock();
        let claim = claims
            .values_mut()
            .find(|c| c.task_id == task_id && c.worker_id == worker_id && c.status == ClaimStatus::Active)
            .ok_or_else(|| OrchestratorError::claim_not_found(task_id))?;
        claim.renewed_count += 1;
        claim.lease_expires_at = Utc::now() + Duration::minutes(lease_minutes);
        Ok(claim.clone())
    }

    async fn release(&self, task_id: &str, worker_id: &str) -> Result<()> {
        let mut claims = self.claims.lock();
        let claim = claims
            .values_mut()
            .find(|c| c.task_id == task_id && c.worker_id == worker_id && c.status == ClaimStatus::Active)
            .ok_or_else(|| OrchestratorError::claim_not_found(task_id))?;
        claim.status = ClaimStatus::Released;
        Ok(())
    }

    async fn release_by_worker(&self, worker_id: &str) -> Result<u64> {
        let mut claims = self.claims.lock();
        let mut count = 0u64;
        for claim in claims.values_mut() {
            if claim.worker_id == worker_id && claim.status == ClaimStatus::Active {
                claim.status = ClaimStatus::Released;
                count += 1;
            }
        }
        Ok(count)
    }

    async fn expire(&self, claim_id: i64) -> Result<()> {
        let mut claims = self.claims.lock();
        let claim = claims.get_mut(&claim_id).ok_or_else(|| OrchestratorError::claim_not_found(claim_id.to_string()))?;
        claim.status = ClaimStatus::Expired;
        Ok(())
    }

    async fn get_active_claim(&self, task_id: &str) -> Result<Option<Claim>> {
        Ok(self.claims.lock().values().find(|c| c.task_id == task_id && c.status == ClaimStatus::Active).cloned())
    }

    async fn get_expired(&self) -> Result<Vec<Claim>> {
        let now = Utc::now();
        Ok(self
            .claims
            .lock()
            .values()
            .filter(|c| c.status == ClaimStatus::Active && c.lease_expires_at < now)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WorkerRepository for InMemoryStore {
    async fn register(&self, worker: NewWorker) -> Result<Worker> {
        let pool_size = self.orchestrator_state.lock().worker_pool_size;
        let active = self.count_active().await?;
        if active >= pool_size {
            return Err(OrchestratorError::Registration {
                reason: format!("worker pool is full ({active}/{pool_size})"),
            });
        }
        let id = worker.worker_id.unwrap_or_else(|| self.ids.lock().worker_id());
        let now = Utc::now();
        let created = Worker {
            id: id.clone(),
            name: worker.name,
            hostname: worker.hostname,
            pid: worker.pid,
            status: WorkerStatus::Starting,
            registered_at: now,
            last_heartbeat_at: now,
            current_task_id: None,
            capabilities: worker.capabilities,
            metadata: serde_json::json!({}),
        };
        self.workers.lock().insert(id, created.clone());
        Ok(created)
    }

    async fn deregister(&self, worker_id: &str) -> Result<()> {
        self.workers.lock().remove(worker_id).ok_or_else(|| OrchestratorError::worker_not_found(worker_id))?;
        Ok(())
    }

    async fn heartbeat(&self, input: HeartbeatInput) -> Result<Worker> {
        let mut workers = self.workers.lock();
        let worker = workers
            .get_mut(&input.worker_id)
            .ok_or_else(|| OrchestratorError::worker_not_found(input.worker_id.clone()))?;
        worker.last_heartbeat_at = input.timestamp;
        worker.status = input.status;
        worker.current_task_id = input.current_task_id;
        if let Some(metrics) = input.metrics {
            worker.metadata = metrics;
        }
        Ok(worker.clone())
    }

    async fn update_status(&self, worker_id: &str, status: WorkerStatus) -> Result<Worker> {
        let mut workers = self.workers.lock();
        let worker = workers.get_mut(worker_id).ok_or_else(|| OrchestratorError::worker_not_found(worker_id))?;
        worker.status = status;
        Ok(worker.clone())
    }

    async fn get(&self, worker_id: &str) -> Result<Option<Worker>> {
        Ok(self.workers.lock().get(worker_id).cloned())
    }

    async fn list(&self) -> Result<Vec<Worker>> {
        Ok(self.workers.lock().values().cloned().collect())
    }

    async fn find_dead(&self, missed_heartbeats: i64) -> Result<Vec<Worker>> {
        let heartbeat_interval = self.orchestrator_state.lock().heartbeat_interval_seconds;
        let threshold = Duration::seconds(heartbeat_interval * missed_heartbeats);
        let now = Utc::now();
        Ok(self
            .workers
            .lock()
            .values()
            .filter(|w| w.status != WorkerStatus::Dead && now - w.last_heartbeat_at > threshold)
            .cloned()
            .collect())
    }

    async fn mark_dead(&self, worker_id: &str) -> Result<()> {
        let mut workers = self.workers.lock();
        let worker = workers.get_mut(worker_id).ok_or_else(|| OrchestratorError::worker_not_found(worker_id))?;
        worker.status = WorkerStatus::Dead;
        Ok(())
    }

    async fn count_active(&self) -> Result<i64> {
        Ok(self
            .workers
            .lock()
            .values()
            .filter(|w| matches!(w.status, WorkerStatus::Starting | WorkerStatus::Idle | WorkerStatus::Busy))
            .count() as i64)
    }
}

#[async_trait]
impl OrchestratorStateRepository for InMemoryStore {
    async fn get(&self) -> Result<OrchestratorState> {
        Ok(self.orchestrator_state.lock().clone())
    }

    async fn start(&self, pid: i64, config: StartConfig) -> Result<OrchestratorState> {
        let mut state = self.orchestrator_state.lock();
        state.status = OrchestratorStatus::Running;
        state.pid = Some(pid);
        state.started_at = Some(Utc::now());
        if let Some(v) = config.worker_pool_size {
            state.worker_pool_size = v;
        }
        if let Some(v) = config.reconcile_interval_seconds {
            state.reconcile_interval_seconds = v;
        }
        if let Some(v) = config.heartbeat_interval_seconds {
            state.heartbeat_interval_seconds = v;
        }
        if let Some(v) = config.lease_duration_minutes {
            state.lease_duration_minutes = v;
        }
        Ok(state.clone())
    }

    async fn stop(&self) -> Result<OrchestratorState> {
        let mut state = self.orchestrator_state.lock();
        state.status = OrchestratorStatus::Stopped;
        state.pid = None;
        Ok(state.clone())
    }

    async fn set_last_reconcile(&self, at: DateTime<Utc>) -> Result<()> {
        self.orchestrator_state.lock().last_reconcile_at = Some(at);
        Ok(())
    }
}

#[async_trait]
impl AttemptRepository for InMemoryStore {
    async fn create(&self, task_id: &str, approach: &str, outcome: AttemptOutcome, reason: Option<String>) -> Result<Attempt> {
        let id = self.next_attempt_id.fetch_add(1, Ordering::SeqCst);
        let attempt = Attempt {
            id,
            task_id: task_id.into(),
            approach: approach.into(),
            outcome,
            reason,
            created_at: Utc::now(),
        };
        self.attempts.lock().insert(id, attempt.clone());
        Ok(attempt)
    }

    async fn get(&self, id: i64) -> Result<Option<Attempt>> {
        Ok(self.attempts.lock().get(&id).cloned())
    }

    async fn list_for_task(&self, task_id: &str) -> Result<Vec<Attempt>> {
        let mut out: Vec<Attempt> = self.attempts.lock().values().filter(|a| a.task_id == task_id).cloned().collect();
        out.sort_by_key(|a| a.id);
        Ok(out)
    }

    async fn remove(&self, id: i64) -> Result<()> {
        self.attempts.lock().remove(&id).ok_or_else(|| OrchestratorError::AttemptNotFound { id })?;
        Ok(())
    }

    async fn get_failed_count(&self, task_id: &str) -> Result<i64> {
        Ok(self
            .attempts
            .lock()
            .values()
            .filter(|a| a.task_id == task_id && a.outcome == AttemptOutcome::Failed)
            .count() as i64)
    }

    async fn get_failed_counts_for_tasks(&self, ids: &[String]) -> Result<HashMap<String, i64>> {
        let attempts = self.attempts.lock();
        let mut out = HashMap::new();
        for id in ids {
            let count = attempts.values().filter(|a| &a.task_id == id && a.outcome == AttemptOutcome::Failed).count() as i64;
            if count > 0 {
                out.insert(id.clone(), count);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl LearningRepository for InMemoryStore {
    async fn create(&self, learning: NewLearning) -> Result<Learning> {
        let id = self.next_learning_id.fetch_add(1, Ordering::SeqCst);
        let created = Learning {
            id,
            content: learning.content,
            source_type: learning.source_type,
            source_ref: learning.source_ref,
            created_at: Utc::now(),
            keywords: learning.keywords,
            category: learning.category,
            usage_count: 0,
            outcome_score: None,
        };
        self.learnings.lock().insert(id, created.clone());
        Ok(created)
    }

    async fn get(&self, id: i64) -> Result<Option<Learning>> {
        Ok(self.learnings.lock().get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Learning>> {
        Ok(self.learnings.lock().values().cloned().collect())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        self.learnings.lock().remove(&id).ok_or_else(|| OrchestratorError::LearningNotFound { id })?;
        Ok(())
    }

    async fn update_outcome(&self, id: i64, score: f64) -> Result<Learning> {
        let mut learnings = self.learnings.lock();
        let learning = learnings.get_mut(&id).ok_or_else(|| OrchestratorError::LearningNotFound { id })?;
        learning.outcome_score = Some(score);
        Ok(learning.clone())
    }

    async fn record_usage(&self, id: i64) -> Result<Learning> {
        let mut learnings = self.learnings.lock();
        let learning = learnings.get_mut(&id).ok_or_else(|| OrchestratorError::LearningNotFound { id })?;
        learning.usage_count += 1;
        Ok(learning.clone())
    }

    /// A plain case-insensitive substring match standing in for the real
    /// store's three-rank-list BM25 + RRF pipeline (`orchestrator-db`
    /// implements that; the fusion math itself lives in
    /// `orchestrator_core::retrieval` and is unit-tested there directly).
    async fn search(&self, query: &str, limit: i64, min_score: f64) -> Result<Vec<LearningSearchResult>> {
        let needle = query.to_lowercase();
        let mut results: Vec<LearningSearchResult> = self
            .learnings
            .lock()
            .values()
            .filter(|l| l.content.to_lowercase().contains(&needle))
            .map(|l| LearningSearchResult {
                learning: l.clone(),
                relevance: 1.0,
                bm25_score: 1.0,
                recency_score: 1.0,
            })
            .filter(|r| r.relevance >= min_score)
            .collect();
        results.sort_by_key(|r| r.learning.id);
        if limit >= 0 {
            results.truncate(limit as usize);
        }
        Ok(results)
    }
}

#[async_trait]
impl CandidateRepository for InMemoryStore {
    async fn insert(&self, candidate: NewCandidate) -> Result<Candidate> {
        let id = self.next_candidate_id.fetch_add(1, Ordering::SeqCst);
        let created = Candidate {
            id,
            content: candidate.content,
            confidence: candidate.confidence,
            source_file: candidate.source_file,
            source_run_id: candidate.source_run_id,
            source_task_id: candidate.source_task_id,
            status: CandidateStatus::Pending,
            category: candidate.category,
            extracted_at: Utc::now(),
            reviewed_at: None,
            reviewed_by: None,
            promoted_learning_id: None,
            rejection_reason: None,
        };
        self.candidates.lock().insert(id, created.clone());
        Ok(created)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Candidate>> {
        Ok(self.candidates.lock().get(&id).cloned())
    }

    async fn find_by_filter(&self, filter: CandidateFilter) -> Result<Vec<Candidate>> {
        let candidates = self.candidates.lock();
        let mut out: Vec<Candidate> = candidates
            .values()
            .filter(|c| filter.status.as_ref().map(|s| s.contains(&c.status)).unwrap_or(true))
            .filter(|c| filter.confidence.as_ref().map(|s| s.contains(&c.confidence)).unwrap_or(true))
            .filter(|c| filter.category.as_ref().map(|s| c.category.as_ref().map(|cat| s.contains(cat)).unwrap_or(false)).unwrap_or(true))
            .filter(|c| filter.source_file.as_ref().map(|s| s.contains(&c.source_file)).unwrap_or(true))
            .filter(|c| {
                filter
                    .source_run_id
                    .as_ref()
                    .map(|s| c.source_run_id.as_ref().map(|r| s.contains(r)).unwrap_or(false))
                    .unwrap_or(true)
            })
            .filter(|c| {
                filter
                    .source_task_id
                    .as_ref()
                    .map(|s| c.source_task_id.as_ref().map(|t| s.contains(t)).unwrap_or(false))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        out.sort_by_key(|c| c.id);
        if let Some(offset) = filter.offset {
            out = out.into_iter().skip(offset.max(0) as usize).collect();
        }
        if let Some(limit) = filter.limit {
            if limit >= 0 {
                out.truncate(limit as usize);
            }
        }
        Ok(out)
    }

    async fn update(&self, id: i64, content: Option<String>, category: Option<String>) -> Result<Candidate> {
        let mut candidates = self.candidates.lock();
        let candidate = candidates.get_mut(&id).ok_or_else(|| OrchestratorError::CandidateNotFound { id })?;
        if let Some(content) = content {
            candidate.content = content;
        }
        if let Some(category) = category {
            candidate.category = Some(category);
        }
        Ok(candidate.clone())
    }

    async fn update_status(&self, id: i64, transition: CandidateTransition, reviewed_by: Option<String>) -> Result<Candidate> {
        let mut candidates = self.candidates.lock();
        let candidate = candidates.get_mut(&id).ok_or_else(|| OrchestratorError::CandidateNotFound { id })?;
        if candidate.status != CandidateStatus::Pending {
            return Err(OrchestratorError::validation(format!(
                "candidate {id} has already been reviewed (status {})",
                candidate.status
            )));
        }
        match transition {
            CandidateTransition::Promoted { learning_id } => {
                candidate.status = CandidateStatus::Promoted;
                candidate.promoted_learning_id = Some(learning_id);
            }
            CandidateTransition::Rejected { reason } => {
                candidate.status = CandidateStatus::Rejected;
                candidate.rejection_reason = Some(reason);
            }
            CandidateTransition::Merged { absorbing_learning_id } => {
                candidate.status = CandidateStatus::Merged;
                candidate.promoted_learning_id = absorbing_learning_id;
            }
        }
        candidate.reviewed_at = Some(Utc::now());
        candidate.reviewed_by = reviewed_by;
        Ok(candidate.clone())
    }
}

#[async_trait]
impl LabelRepository for InMemoryStore {
    async fn upsert(&self, name: &str, color: &str) -> Result<TaskLabel> {
        let mut labels = self.labels.lock();
        if let Some(existing) = labels.values_mut().find(|l| l.name.eq_ignore_ascii_case(name)) {
            existing.color = color.to_string();
            return Ok(existing.clone());
        }
        let id = self.next_label_id.fetch_add(1, Ordering::SeqCst);
        let created = TaskLabel { id, name: name.to_string(), color: color.to_string() };
        labels.insert(id, created.clone());
        Ok(created)
    }

    async fn list(&self) -> Result<Vec<TaskLabel>> {
        let mut out: Vec<TaskLabel> = self.labels.lock().values().cloned().collect();
        out.sort_by_key(|l| l.id);
        Ok(out)
    }

    async fn attach(&self, task_id: &str, label_id: i64) -> Result<()> {
        let mut assignments = self.label_assignments.lock();
        if !assignments.iter().any(|a| a.task_id == task_id && a.label_id == label_id) {
            assignments.push(LabelAssignment { task_id: task_id.into(), label_id });
        }
        Ok(())
    }

    async fn detach(&self, task_id: &str, label_id: i64) -> Result<()> {
        self.label_assignments.lock().retain(|a| !(a.task_id == task_id && a.label_id == label_id));
        Ok(())
    }

    async fn labels_for_task(&self, task_id: &str) -> Result<Vec<TaskLabel>> {
        let label_ids: Vec<i64> = self.label_assignments.lock().iter().filter(|a| a.task_id == task_id).map(|a| a.label_id).collect();
        let labels = self.labels.lock();
        Ok(label_ids.into_iter().filter_map(|id| labels.get(&id).cloned()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_claim_on_same_task_is_rejected() {
        let store = InMemoryStore::new();
        let task = store.create(NewTask { title: "t".into(), ..Default::default() }).await.unwrap();
        store.claim(&task.id, "worker-aaaaaaaa").await.unwrap();
        let err = store.claim(&task.id, "worker-bbbbbbbb").await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn registration_is_rejected_once_pool_is_full() {
        let store = InMemoryStore::new();
        store.start(100, StartConfig { worker_pool_size: Some(1), ..Default::default() }).await.unwrap();
        store.register(NewWorker { name: "w1".into(), ..Default::default() }).await.unwrap();
        let err = store.register(NewWorker { name: "w2".into(), ..Default::default() }).await.unwrap_err();
        assert_eq!(err.status_code(), 409);
    }

    #[tokio::test]
    async fn candidate_transition_is_monotonic() {
        let store = InMemoryStore::new();
        let candidate = store
            .insert(NewCandidate { content: "c".into(), source_file: "f.rs".into(), ..Default::default() })
            .await
            .unwrap();
        store
            .update_status(candidate.id, CandidateTransition::Rejected { reason: "dup".into() }, None)
            .await
            .unwrap();
        let err = store
            .update_status(candidate.id, CandidateTransition::Rejected { reason: "again".into() }, None)
            .await
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[tokio::test]
    async fn ready_set_excludes_tasks_with_unsatisfied_blockers() {
        let store = InMemoryStore::new();
        let blocker = store.create(NewTask { title: "blocker".into(), ..Default::default() }).await.unwrap();
        let blocked = store.create(NewTask { title: "blocked".into(), ..Default::default() }).await.unwrap();
        store.add_blocker(&blocked.id, &blocker.id).await.unwrap();

        let ready = store.ready(-1).await.unwrap();
        let ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&blocker.id.as_str()));
        assert!(!ids.contains(&blocked.id.as_str()));

        store.force_status(&blocker.id, TaskStatus::Done).await.unwrap();
        let ready = store.ready(-1).await.unwrap();
        let ids: Vec<&str> = ready.iter().map(|t| t.id.as_str()).collect();
        assert!(ids.contains(&blocked.id.as_str()));
    }
}
