//! Orchestrator reconciliation (§4.7): a stateless controller over the
//! singleton `OrchestratorState` row. `OrchestratorService` holds no process
//! state of its own beyond what it reads back from the store on every call,
//! so `reconcile()` is safe to call from a fresh instance (e.g. after a
//! process restart) without any handoff.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::warn;

use orchestrator_core::{
    ClaimRepository, DependencyRepository, OrchestratorError, OrchestratorState, Result,
    StartConfig, TaskFilter, TaskRepository, TaskStatus, WorkerRepository, WorkerStatus,
};

/// Missed heartbeats after which a worker is declared dead, per §4.7.
const DEAD_WORKER_MISSED_HEARTBEATS: i64 = 2;

/// Counts of rows each reconciliation phase actually processed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub dead_workers_marked: u64,
    pub claims_expired: u64,
    pub orphans_restored: u64,
    pub stale_workers_idled: u64,
}

pub struct OrchestratorService<S, C, T, D, W> {
    state: Arc<S>,
    claims: Arc<C>,
    tasks: Arc<T>,
    dependencies: Arc<D>,
    workers: Arc<W>,
}

impl<S, C, T, D, W> OrchestratorService<S, C, T, D, W>
where
    S: orchestrator_core::OrchestratorStateRepository,
    C: ClaimRepository,
    T: TaskRepository,
    D: DependencyRepository,
    W: WorkerRepository,
{
    pub fn new(state: Arc<S>, claims: Arc<C>, tasks: Arc<T>, dependencies: Arc<D>, workers: Arc<W>) -> Self {
        Self { state, claims, tasks, dependencies, workers }
    }

    pub async fn status(&self) -> Result<OrchestratorState> {
        self.state.get().await
    }

    pub async fn start(&self, pid: i64, config: StartConfig) -> Result<OrchestratorState> {
        let current = self.state.get().await?;
        if current.status == orchestrator_core::OrchestratorStatus::Running {
            return Err(OrchestratorError::AlreadyRunning);
        }
        self.state.start(pid, config).await
    }

    /// `graceful = false` marks every non-dead worker `dead` before the
    /// state row flips to `stopped`, per §4.7's "Non-graceful `stop` marks
    /// all non-dead workers `dead`." A graceful stop leaves worker rows
    /// untouched — callers are expected to have released their own claims
    /// and deregistered already (§5's cooperative shutdown).
    pub async fn stop(&self, graceful: bool) -> Result<OrchestratorState> {
        let current = self.state.get().await?;
        if current.status == orchestrator_core::OrchestratorStatus::Stopped {
            return Err(OrchestratorError::NotRunning);
        }
        if !graceful {
            for worker in self.workers.list().await? {
                if worker.status != WorkerStatus::Dead {
                    if let Err(err) = self.workers.mark_dead(&worker.id).await {
                        warn!(worker_id = %worker.id, error = %err, "failed to mark worker dead during non-graceful stop");
                    }
                }
            }
        }
        self.state.stop().await
    }

    /// Runs the five reconciliation phases in order. Each phase swallows
    /// per-row errors (logged, not propagated) so one bad row never aborts
    /// the rest of the sweep.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let mut report = ReconcileReport::default();
        let mut restored: HashSet<String> = HashSet::new();

        // Phase 1 only marks workers dead. A dead worker's claim is left
        // alone here — its lease may still be valid, and it is phase 2
        // (expired claims) and phase 3 (active tasks with no active claim)
        // that own restoring the task's status, not this phase. Touching
        // the task here would force it back to ready/blocked while the
        // claim row is still active, making it unclaimable until the
        // lease eventually expires on its own.
        let dead = self.workers.find_dead(DEAD_WORKER_MISSED_HEARTBEATS).await?;
        for worker in &dead {
            match self.workers.mark_dead(&worker.id).await {
                Ok(()) => report.dead_workers_marked += 1,
                Err(err) => warn!(worker_id = %worker.id, error = %err, "failed to mark worker dead"),
            }
        }

        let expired = self.claims.get_expired().await?;
        for claim in &expired {
            match self.claims.expire(claim.id).await {
                Ok(()) => {
                    report.claims_expired += 1;
                    if let Err(err) = self.restore_post_expiry_status(&claim.task_id).await {
                        warn!(task_id = %claim.task_id, error = %err, "failed to restore expired-claim task status");
                    } else {
                        restored.insert(claim.task_id.clone());
                        report.orphans_restored += 1;
                    }
                }
                Err(err) => warn!(claim_id = claim.id, error = %err, "failed to expire claim"),
            }
        }

        // Every task left in `active` with no active claim is orphaned,
        // independent of whichever path (dead worker, expired lease)
        // caused it — e.g. a claim that was released without the task
        // ever transitioning off `active`.
        let active_tasks = self
            .tasks
            .list(TaskFilter { status: Some(vec![TaskStatus::Active]), ..Default::default() })
            .await?;
        for task in &active_tasks {
            if restored.contains(&task.id) {
                continue;
            }
            if self.claims.get_active_claim(&task.id).await?.is_none() {
                match self.restore_post_expiry_status(&task.id).await {
                    Ok(()) => {
                        restored.insert(task.id.clone());
                        report.orphans_restored += 1;
                    }
                    Err(err) => warn!(task_id = %task.id, error = %err, "failed to restore orphaned active task"),
                }
            }
        }

        for worker in self.workers.list().await? {
            if worker.status == WorkerStatus::Busy && worker.current_task_id.is_none() {
                match self.workers.update_status(&worker.id, WorkerStatus::Idle).await {
                    Ok(_) => report.stale_workers_idled += 1,
                    Err(err) => warn!(worker_id = %worker.id, error = %err, "failed to idle stale worker"),
                }
            }
        }

        self.state.set_last_reconcile(Utc::now()).await?;
        Ok(report)
    }

    /// A task left claimless by a dead worker or an expired claim goes back
    /// to `ready` if every blocker is `done`, else `blocked` — it must never
    /// be restored to `ready` while a blocker is unsatisfied.
    async fn restore_post_expiry_status(&self, task_id: &str) -> Result<()> {
        let blockers = self.dependencies.list_blockers(task_id).await?;
        let mut all_done = true;
        for blocker_id in &blockers {
            match self.tasks.get(blocker_id).await? {
                Some(t) if t.status == TaskStatus::Done => {}
                _ => {
                    all_done = false;
                    break;
                }
            }
        }
        let target = if all_done { TaskStatus::Ready } else { TaskStatus::Blocked };
        self.tasks.force_status(task_id, target).await?;
        Ok(())
    }

    /// Runs `reconcile()` on the state's configured interval until `shutdown`
    /// reports `true`, swallowing errors from individual reconcile passes so
    /// a transient store failure doesn't kill the loop.
    pub async fn run_reconcile_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        loop {
            let interval_seconds = match self.state.get().await {
                Ok(state) => state.reconcile_interval_seconds.max(1) as u64,
                Err(err) => {
                    warn!(error = %err, "failed to read orchestrator state, using default interval");
                    30
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(interval_seconds)) => {
                    if let Err(err) = self.reconcile().await {
                        warn!(error = %err, "reconcile pass failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        return;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_mocks::InMemoryStore;
    use orchestrator_core::{NewTask, NewWorker, TaskRepository, WorkerRepository};

    type Service = OrchestratorService<InMemoryStore, InMemoryStore, InMemoryStore, InMemoryStore, InMemoryStore>;

    fn service(store: &Arc<InMemoryStore>) -> Service {
        OrchestratorService::new(store.clone(), store.clone(), store.clone(), store.clone(), store.clone())
    }

    /// An `active` task with no active claim at all (no dead worker, no
    /// expired lease — e.g. the claim was released without the task being
    /// transitioned off `active`) must still be picked up and restored.
    #[tokio::test]
    async fn orphaned_active_task_with_done_blocker_is_restored_to_ready() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();

        let blocker = store.create(NewTask { title: "blocker".into(), ..Default::default() }).await.unwrap();
        store.force_status(&blocker.id, TaskStatus::Done).await.unwrap();
        let orphan = store.create(NewTask { title: "orphan".into(), ..Default::default() }).await.unwrap();
        orchestrator_core::DependencyRepository::add_blocker(&*store, &orphan.id, &blocker.id).await.unwrap();
        store.force_status(&orphan.id, TaskStatus::Active).await.unwrap();

        let report = svc.reconcile().await.unwrap();
        assert_eq!(report.orphans_restored, 1);
        let restored = store.get(&orphan.id).await.unwrap().unwrap();
        assert_eq!(restored.status, TaskStatus::Ready);
    }

    #[tokio::test]
    async fn orphaned_active_task_with_unsatisfied_blocker_is_blocked() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();

        let blocker = store.create(NewTask { title: "blocker".into(), ..Default::default() }).await.unwrap();
        let orphan = store.create(NewTask { title: "orphan".into(), ..Default::default() }).await.unwrap();
        orchestrator_core::DependencyRepository::add_blocker(&*store, &orphan.id, &blocker.id).await.unwrap();
        store.force_status(&orphan.id, TaskStatus::Active).await.unwrap();

        svc.reconcile().await.unwrap();
        let restored = store.get(&orphan.id).await.unwrap().unwrap();
        assert_eq!(restored.status, TaskStatus::Blocked);
    }

    #[tokio::test]
    async fn actively_claimed_task_is_left_alone() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();
        let worker = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap();
        let task = store.create(NewTask { title: "t".into(), ..Default::default() }).await.unwrap();
        ClaimRepository::claim(&*store, &task.id, &worker.id).await.unwrap();

        let report = svc.reconcile().await.unwrap();
        assert_eq!(report.orphans_restored, 0);
        let task = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Active);
    }

    /// A worker declared dead whose claim lease is still valid must not have
    /// its task restored in the same phase — that task stays `active` with
    /// an active claim until phase 2 expires the lease, so it never becomes
    /// a ready-but-unclaimable task.
    #[tokio::test]
    async fn dead_worker_with_unexpired_claim_leaves_task_active() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();
        let worker = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap();
        let task = store.create(NewTask { title: "t".into(), ..Default::default() }).await.unwrap();
        let claim = ClaimRepository::claim(&*store, &task.id, &worker.id).await.unwrap();

        orchestrator_core::WorkerRepository::heartbeat(
            &*store,
            orchestrator_core::HeartbeatInput {
                worker_id: worker.id.clone(),
                timestamp: Utc::now() - chrono::Duration::hours(1),
                status: WorkerStatus::Busy,
                current_task_id: Some(task.id.clone()),
                metrics: None,
            },
        )
        .await
        .unwrap();

        let report = svc.reconcile().await.unwrap();
        assert_eq!(report.dead_workers_marked, 1);
        assert_eq!(report.orphans_restored, 0, "task must not be restored while its claim is still active");

        let dead_worker = store.get(&worker.id).await.unwrap().unwrap();
        assert_eq!(dead_worker.status, WorkerStatus::Dead);

        let task = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Active, "task should stay active until its lease actually expires");

        let active_claim = ClaimRepository::get_active_claim(&*store, &task.id).await.unwrap();
        assert_eq!(active_claim.map(|c| c.id), Some(claim.id));
    }

    #[tokio::test]
    async fn graceful_stop_leaves_workers_untouched() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();
        let worker = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap();
        store.update_status(&worker.id, WorkerStatus::Idle).await.unwrap();

        svc.stop(true).await.unwrap();

        let worker = store.get(&worker.id).await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
    }

    #[tokio::test]
    async fn non_graceful_stop_marks_every_non_dead_worker_dead() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();
        let idle = store.register(NewWorker { name: "idle".into(), ..Default::default() }).await.unwrap();
        let busy = store.register(NewWorker { name: "busy".into(), ..Default::default() }).await.unwrap();
        store.update_status(&idle.id, WorkerStatus::Idle).await.unwrap();
        store.update_status(&busy.id, WorkerStatus::Busy).await.unwrap();

        svc.stop(false).await.unwrap();

        let idle = store.get(&idle.id).await.unwrap().unwrap();
        let busy = store.get(&busy.id).await.unwrap().unwrap();
        assert_eq!(idle.status, WorkerStatus::Dead);
        assert_eq!(busy.status, WorkerStatus::Dead);
    }

    #[tokio::test]
    async fn stale_busy_worker_without_a_task_is_idled() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(&store);
        store.start(1, StartConfig::default()).await.unwrap();
        let worker = store.register(NewWorker { name: "w".into(), ..Default::default() }).await.unwrap();
        store.update_status(&worker.id, WorkerStatus::Busy).await.unwrap();

        let report = svc.reconcile().await.unwrap();
        assert_eq!(report.stale_workers_idled, 1);
        let worker = store.get(&worker.id).await.unwrap().unwrap();
        assert_eq!(worker.status, WorkerStatus::Idle);
    }
}
