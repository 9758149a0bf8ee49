//! Axum router assembly (§6). `AppState<S>` is generic over a single store
//! type implementing every repository trait — `orchestrator-db::SqliteStore`
//! in production, `orchestrator-mocks::InMemoryStore` in tests — the same
//! "one struct, every trait" shape those two crates already commit to, so
//! the HTTP layer needs no `dyn` beyond what axum's own `State` extractor
//! requires.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use orchestrator_core::{
    AttemptRepository, CandidateRepository, ClaimRepository, DependencyRepository,
    HierarchyRepository, LabelRepository, LearningRepository, OrchestratorStateRepository,
    TaskRepository, WorkerRepository,
};
use orchestrator_runtime::{
    AttemptLedger, CandidatePromotionService, ClaimCoordinator, DependencyService,
    OrchestratorService, ReadySetService, ScoreService, TaskService, WorkerService,
};

use crate::handler;

/// A store that backs every repository trait this router touches, shared
/// behind `Arc` with the service wrappers that sit in front of it.
pub trait Store:
    TaskRepository
    + DependencyRepository
    + HierarchyRepository
    + ClaimRepository
    + WorkerRepository
    + OrchestratorStateRepository
    + AttemptRepository
    + LearningRepository
    + CandidateRepository
    + LabelRepository
    + Send
    + Sync
    + 'static
{
}

impl<T> Store for T where
    T: TaskRepository
        + DependencyRepository
        + HierarchyRepository
        + ClaimRepository
        + WorkerRepository
        + OrchestratorStateRepository
        + AttemptRepository
        + LearningRepository
        + CandidateRepository
        + LabelRepository
        + Send
        + Sync
        + 'static
{
}

pub struct AppState<S: Store> {
    pub store: Arc<S>,
    pub tasks: TaskService<S, S>,
    pub ready: ReadySetService<S>,
    pub score: ScoreService<S, S, S>,
    pub dependencies: DependencyService<S>,
    pub claims: ClaimCoordinator<S, S, S>,
    pub workers: WorkerService<S>,
    pub orchestrator: Arc<OrchestratorService<S, S, S, S, S>>,
    pub attempts: AttemptLedger<S, S>,
    pub candidates: CandidatePromotionService<S, S>,
    /// Most recent reconcile pass, for `GET /api/ralph`'s `recentActivity`.
    /// `OrchestratorService` itself is stateless by design (§4.7); this is
    /// the one piece of process memory the HTTP layer keeps, written by
    /// whichever task runs the reconcile loop.
    pub last_reconcile: tokio::sync::RwLock<Option<orchestrator_runtime::ReconcileReport>>,
}

impl<S: Store> AppState<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            tasks: TaskService::new(store.clone(), store.clone()),
            ready: ReadySetService::new(store.clone()),
            score: ScoreService::new(store.clone(), store.clone(), store.clone()),
            dependencies: DependencyService::new(store.clone()),
            claims: ClaimCoordinator::new(store.clone(), store.clone(), store.clone()),
            workers: WorkerService::new(store.clone()),
            orchestrator: Arc::new(OrchestratorService::new(
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
            )),
            attempts: AttemptLedger::new(store.clone(), store.clone()),
            candidates: CandidatePromotionService::new(store.clone(), store.clone()),
            last_reconcile: tokio::sync::RwLock::new(None),
            store,
        }
    }
}

pub fn build_router<S: Store>(state: Arc<AppState<S>>) -> Router {
    Router::new()
        .route("/api/tasks", get(handler::list_tasks::<S>).post(handler::create_task::<S>))
        .route("/api/tasks/ready", get(handler::ready_tasks::<S>))
        .route(
            "/api/tasks/:id",
            get(handler::get_task::<S>).patch(handler::update_task::<S>).delete(handler::delete_task::<S>),
        )
        .route("/api/labels", get(handler::list_labels::<S>).post(handler::upsert_label::<S>))
        .route("/api/tasks/:id/labels", post(handler::attach_label::<S>))
        .route("/api/tasks/:id/labels/:label_id", delete(handler::detach_label::<S>))
        .route("/api/runs", get(handler::list_runs))
        .route("/api/runs/:id", get(handler::get_run))
        .route("/api/ralph", get(handler::ralph_status::<S>))
        .route("/api/stats", get(handler::stats::<S>))
        .route("/api/docs", get(handler::docs_stub).post(handler::docs_stub))
        .route("/api/docs/*path", get(handler::docs_stub).post(handler::docs_stub).delete(handler::docs_stub))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use orchestrator_mocks::InMemoryStore;
    use tower::ServiceExt;

    fn app() -> Router {
        let store = Arc::new(InMemoryStore::new());
        build_router(Arc::new(AppState::new(store)))
    }

    #[tokio::test]
    async fn health_surface_lists_empty_tasks() {
        let response = app()
            .oneshot(Request::builder().uri("/api/tasks").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn docs_endpoint_is_stubbed_not_implemented() {
        let response = app()
            .oneshot(Request::builder().uri("/api/docs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }

    #[tokio::test]
    async fn runs_endpoint_is_stubbed_not_implemented() {
        let response = app()
            .oneshot(Request::builder().uri("/api/runs").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
    }
}
