//! Seven end-to-end scenarios (§8), each wiring `orchestrator-runtime`'s
//! services over a real `orchestrator-db::SqliteStore` rather than the
//! in-memory mocks the unit tests in each crate already use. These exercise
//! behavior that only shows up once the full stack — transaction
//! boundaries, the partial unique index, raw SQL row state — is in play.

use std::sync::Arc;

use orchestrator_core::{
    retry::RetryDecision, NewLearning, NewTask, NewWorker, OrchestratorError,
    OrchestratorStateRepository, StartConfig, TaskStatus, UpdateTask,
};
use orchestrator_db::SqliteStore;
use orchestrator_runtime::{
    AttemptLedger, ClaimCoordinator, DependencyService, OrchestratorService, ReadySetService,
    TaskService, WorkerService,
};

/// One store, every service wired over it — the shape `engine-server`'s
/// `setup::initialize_app` assembles for the real binary.
struct App {
    store: Arc<SqliteStore>,
    tasks: TaskService<SqliteStore, SqliteStore>,
    ready: ReadySetService<SqliteStore>,
    deps: DependencyService<SqliteStore>,
    claims: ClaimCoordinator<SqliteStore, SqliteStore, SqliteStore>,
    workers: WorkerService<SqliteStore>,
    attempts: AttemptLedger<SqliteStore, SqliteStore>,
    orchestrator: OrchestratorService<SqliteStore, SqliteStore, SqliteStore, SqliteStore, SqliteStore>,
}

async fn app() -> App {
    let store = Arc::new(SqliteStore::connect(":memory:").await.unwrap());
    store.start(1, StartConfig::default()).await.unwrap();
    App {
        tasks: TaskService::new(store.clone(), store.clone()),
        ready: ReadySetService::new(store.clone()),
        deps: DependencyService::new(store.clone()),
        claims: ClaimCoordinator::new(store.clone(), store.clone(), store.clone()),
        workers: WorkerService::new(store.clone()),
        attempts: AttemptLedger::new(store.clone(), store.clone()),
        orchestrator: OrchestratorService::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
        ),
        store,
    }
}

/// 1. Claim contention: two workers race for one ready task over a single
/// store shared behind `Arc`. Exactly one wins; the loser sees
/// `AlreadyClaimed` naming the winner.
#[tokio::test]
async fn claim_contention_has_exactly_one_winner() {
    let app = app().await;
    let task = app.tasks.create(NewTask { title: "contested task".into(), ..Default::default() }).await.unwrap();
    let w1 = app.workers.register(NewWorker { name: "worker-a".into(), ..Default::default() }).await.unwrap();
    let w2 = app.workers.register(NewWorker { name: "worker-b".into(), ..Default::default() }).await.unwrap();

    let claims_a = ClaimCoordinator::new(app.store.clone(), app.store.clone(), app.store.clone());
    let claims_b = ClaimCoordinator::new(app.store.clone(), app.store.clone(), app.store.clone());
    let (task_id_a, task_id_b) = (task.id.clone(), task.id.clone());
    let (worker_a, worker_b) = (w1.id.clone(), w2.id.clone());

    let (result_a, result_b) = tokio::join!(
        claims_a.claim(&task_id_a, &worker_a),
        claims_b.claim(&task_id_b, &worker_b),
    );

    let (winner, loser_err) = match (result_a, result_b) {
        (Ok(claim), Err(err)) => (claim.worker_id, err),
        (Err(err), Ok(claim)) => (claim.worker_id, err),
        other => panic!("expected exactly one winner and one loser, got {other:?}"),
    };

    match loser_err {
        OrchestratorError::AlreadyClaimed { claimed_by_worker_id, .. } => {
            assert_eq!(claimed_by_worker_id, winner);
        }
        other => panic!("expected AlreadyClaimed, got {other:?}"),
    }

    let active = app.claims.get_active_claim(&task.id).await.unwrap().unwrap();
    assert_eq!(active.worker_id, winner);
}

/// 2. Deep cycle rejection: a 100-task chain `t0 -> t1 -> ... -> t99`
/// (`blocker -> blocked`), then closing the loop with `add_blocker(t0, t99)`
/// must fail with `CircularDependency` rather than looping forever or
/// blowing a recursion limit.
#[tokio::test]
async fn hundred_task_chain_rejects_the_closing_edge() {
    let app = app().await;
    let mut ids = Vec::with_capacity(100);
    for i in 0..100 {
        let task = app.tasks.create(NewTask { title: format!("t{i}"), ..Default::default() }).await.unwrap();
        ids.push(task.id);
    }
    for i in 0..99 {
        app.deps.add_blocker(&ids[i + 1], &ids[i]).await.unwrap();
    }

    let err = app.deps.add_blocker(&ids[0], &ids[99]).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::CircularDependency));

    let blockers_of_t0 = app.deps.list_blockers(&ids[0]).await.unwrap();
    assert!(blockers_of_t0.is_empty(), "the rejected edge must not have been persisted");
}

/// 3. An expired claim on a task with an unsatisfied second blocker: after
/// reconciliation the task goes back to `blocked`, not `ready`.
#[tokio::test]
async fn expired_claim_with_unsatisfied_blocker_restores_to_blocked() {
    let app = app().await;
    let blocker = app.tasks.create(NewTask { title: "unfinished blocker".into(), ..Default::default() }).await.unwrap();
    let task = app.tasks.create(NewTask { title: "leased task".into(), ..Default::default() }).await.unwrap();
    app.deps.add_blocker(&task.id, &blocker.id).await.unwrap();

    let worker = app.workers.register(NewWorker { name: "lease-holder".into(), ..Default::default() }).await.unwrap();
    let claim = app.claims.claim(&task.id, &worker.id).await.unwrap();

    sqlx::query("UPDATE claims SET lease_expires_at = ? WHERE id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::minutes(5))
        .bind(claim.id)
        .execute(app.store.pool())
        .await
        .unwrap();

    let report = app.orchestrator.reconcile().await.unwrap();
    assert_eq!(report.claims_expired, 1);
    assert_eq!(report.orphans_restored, 1);

    let restored = app.tasks.get(&task.id).await.unwrap();
    assert_eq!(restored.status, TaskStatus::Blocked);
}

/// 4. An orphaned `active` task whose only blocker is already `done` is
/// restored to `ready` by reconciliation.
#[tokio::test]
async fn orphaned_task_with_done_blocker_restores_to_ready() {
    let app = app().await;
    let blocker = app.tasks.create(NewTask { title: "finished blocker".into(), ..Default::default() }).await.unwrap();
    app.tasks.force_status(&blocker.id, TaskStatus::Active).await.unwrap();
    app.tasks.update(&blocker.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() }).await.unwrap();

    let task = app.tasks.create(NewTask { title: "orphan".into(), ..Default::default() }).await.unwrap();
    app.deps.add_blocker(&task.id, &blocker.id).await.unwrap();
    app.tasks.force_status(&task.id, TaskStatus::Active).await.unwrap();

    let report = app.orchestrator.reconcile().await.unwrap();
    assert_eq!(report.orphans_restored, 1);

    let restored = app.tasks.get(&task.id).await.unwrap();
    assert_eq!(restored.status, TaskStatus::Ready);
}

/// 5. Completing every child via the checked `update` path auto-completes
/// the parent; forcing one child back to `backlog` afterward does not
/// un-complete it.
#[tokio::test]
async fn completing_all_children_auto_completes_parent_and_force_status_does_not_undo_it() {
    let app = app().await;
    let parent = app.tasks.create(NewTask { title: "epic".into(), ..Default::default() }).await.unwrap();
    app.tasks.force_status(&parent.id, TaskStatus::Active).await.unwrap();

    let mut children = Vec::new();
    for name in ["design", "implement", "review"] {
        let child = app
            .tasks
            .create(NewTask { title: name.into(), parent_id: Some(parent.id.clone()), ..Default::default() })
            .await
            .unwrap();
        app.tasks.force_status(&child.id, TaskStatus::Active).await.unwrap();
        children.push(child);
    }

    for (i, child) in children.iter().enumerate() {
        app.tasks.update(&child.id, UpdateTask { status: Some(TaskStatus::Done), ..Default::default() }).await.unwrap();
        let parent_now = app.tasks.get(&parent.id).await.unwrap();
        if i < children.len() - 1 {
            assert_ne!(parent_now.status, TaskStatus::Done);
        } else {
            assert_eq!(parent_now.status, TaskStatus::Done);
        }
    }

    app.tasks.force_status(&children[2].id, TaskStatus::Backlog).await.unwrap();
    let parent_after = app.tasks.get(&parent.id).await.unwrap();
    assert_eq!(parent_after.status, TaskStatus::Done, "force_status on a child must not un-complete the parent");
}

/// 6. Learning relevance ordering: two learnings with near-identical content
/// but different ages rank with the newer one first once `recencyWeight` is
/// positive (the default orchestrator state carries `recencyWeight = 0.1`).
#[tokio::test]
async fn newer_learning_outranks_an_older_near_duplicate() {
    let app = app().await;
    let older = app
        .store
        .create(NewLearning {
            content: "retrying a flaky network call should back off exponentially".into(),
            source_type: "run".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    let newer = app
        .store
        .create(NewLearning {
            content: "retrying a flaky network call should back off exponentially, confirmed again".into(),
            source_type: "run".into(),
            ..Default::default()
        })
        .await
        .unwrap();

    sqlx::query("UPDATE learnings SET created_at = ? WHERE id = ?")
        .bind(chrono::Utc::now() - chrono::Duration::days(20))
        .bind(older.id)
        .execute(app.store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE learnings SET created_at = ? WHERE id = ?")
        .bind(chrono::Utc::now())
        .bind(newer.id)
        .execute(app.store.pool())
        .await
        .unwrap();

    let state = app.orchestrator.status().await.unwrap();
    assert!(state.recency_weight > 0.0);

    let results = app.store.search("retrying flaky network call exponentially", 10, 0.0).await.unwrap();
    let rank_of = |id: i64| results.iter().position(|r| r.learning.id == id).unwrap();
    assert!(rank_of(newer.id) < rank_of(older.id), "the newer near-duplicate should rank first");
}

/// 7. Retry circuit: three failed attempts trip the circuit, the task is
/// moved to `blocked`, and it drops out of the ready set.
#[tokio::test]
async fn three_failed_attempts_trip_the_retry_circuit() {
    let app = app().await;
    let task = app.tasks.create(NewTask { title: "flaky task".into(), ..Default::default() }).await.unwrap();
    assert!(app.ready.ready(-1).await.unwrap().iter().any(|t| t.id == task.id));

    let mut last_decision = None;
    for attempt in 0..3 {
        let decision = app
            .attempts
            .record_failure_and_decide(&task.id, "direct-edit", Some(format!("attempt {attempt} failed")))
            .await
            .unwrap();
        last_decision = Some(decision);
    }

    assert_eq!(last_decision.unwrap(), RetryDecision::GiveUp, "the third failure should give up, not retry again");

    app.tasks.force_status(&task.id, TaskStatus::Blocked).await.unwrap();
    let ready = app.ready.ready(-1).await.unwrap();
    assert!(!ready.iter().any(|t| t.id == task.id), "a blocked task must not appear in the ready set");
}
