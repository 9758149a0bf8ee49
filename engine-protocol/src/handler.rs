//! Route handlers (§6). Each is a thin adapter from an axum extractor to the
//! matching `orchestrator-runtime` service call; validation and
//! orchestration themselves live in the service, not here.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;

use orchestrator_core::{HeartbeatInput, NewWorker, RepositoryStats, Task, TaskLabel, TaskWithDeps};

use crate::error::{ApiError, ApiResult};
use crate::serialization::{
    build_task_page, AttachLabelBody, CreateTaskBody, RalphStatusResponse, TaskListQuery,
    TaskListResponse, UpdateTaskBody, UpsertLabelBody,
};
use crate::server::{AppState, Store};

pub async fn list_tasks<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Query(query): Query<TaskListQuery>,
) -> ApiResult<Json<TaskListResponse>> {
    let filter = query.to_task_filter();
    let total = state.tasks.count(filter.clone()).await.map_err(ApiError::from)?;
    let mut all = state.tasks.list(filter).await.map_err(ApiError::from)?;
    all.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
    Ok(Json(build_task_page(all, &query, total)))
}

pub async fn ready_tasks<S: Store>(State(state): State<Arc<AppState<S>>>) -> ApiResult<Json<Vec<Task>>> {
    let tasks = state.ready.ready(-1).await.map_err(ApiError::from)?;
    Ok(Json(tasks))
}

pub async fn get_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<Json<TaskWithDeps>> {
    let task = state.tasks.get_with_deps(&id).await.map_err(ApiError::from)?;
    Ok(Json(task))
}

pub async fn create_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<CreateTaskBody>,
) -> ApiResult<(StatusCode, Json<Task>)> {
    let task = state.tasks.create(body.into()).await.map_err(ApiError::from)?;
    Ok((StatusCode::CREATED, Json(task)))
}

pub async fn update_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateTaskBody>,
) -> ApiResult<Json<Task>> {
    let task = state.tasks.update(&id, body.into()).await.map_err(ApiError::from)?;
    Ok(Json(task))
}

pub async fn delete_task<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.tasks.delete(&id).await.map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_labels<S: Store>(State(state): State<Arc<AppState<S>>>) -> ApiResult<Json<Vec<TaskLabel>>> {
    let labels = orchestrator_core::LabelRepository::list(&*state.store).await.map_err(ApiError::from)?;
    Ok(Json(labels))
}

pub async fn upsert_label<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Json(body): Json<UpsertLabelBody>,
) -> ApiResult<Json<TaskLabel>> {
    let label = orchestrator_core::LabelRepository::upsert(&*state.store, &body.name, &body.color)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(label))
}

pub async fn attach_label<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path(task_id): Path<String>,
    Json(body): Json<AttachLabelBody>,
) -> ApiResult<StatusCode> {
    orchestrator_core::LabelRepository::attach(&*state.store, &task_id, body.label_id)
        .await
        .map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn detach_label<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    Path((task_id, label_id)): Path<(String, i64)>,
) -> ApiResult<StatusCode> {
    orchestrator_core::LabelRepository::detach(&*state.store, &task_id, label_id)
        .await
        .map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

/// The file watcher that discovers agent transcripts, and the transcripts
/// themselves, are explicit external collaborators (spec §1) with no
/// repository trait of their own — there is nothing in this engine to serve
/// `/api/runs` from, so it is stubbed rather than faked.
pub async fn list_runs() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

pub async fn get_run(Path(_id): Path<String>) -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

pub async fn ralph_status<S: Store>(
    State(state): State<Arc<AppState<S>>>,
) -> ApiResult<Json<RalphStatusResponse>> {
    let orchestrator_state = state.orchestrator.status().await.map_err(ApiError::from)?;
    let last_reconcile = state.last_reconcile.read().await;
    let recent_activity = last_reconcile.as_ref().map(|report| {
        format!(
            "orphans_restored={} claims_expired={} dead_workers_marked={} stale_workers_idled={}",
            report.orphans_restored, report.claims_expired, report.dead_workers_marked, report.stale_workers_idled
        )
    });
    Ok(Json(RalphStatusResponse {
        running: orchestrator_state.status == orchestrator_core::OrchestratorStatus::Running,
        pid: orchestrator_state.pid,
        current_iteration: None,
        current_task: None,
        recent_activity,
    }))
}

pub async fn stats<S: Store>(State(state): State<Arc<AppState<S>>>) -> ApiResult<Json<RepositoryStats>> {
    let stats = orchestrator_core::TaskRepository::get_stats(&*state.store).await.map_err(ApiError::from)?;
    Ok(Json(stats))
}

/// Docs listing/source/render is peripheral and explicitly "opaque to the
/// core" (spec §6) — stubbed rather than implemented.
pub async fn docs_stub() -> StatusCode {
    StatusCode::NOT_IMPLEMENTED
}

/// Not an HTTP route: kept here so `NewWorker`/`HeartbeatInput` stay
/// referenced for the worker-registration path a future in-process worker
/// runtime wires up directly against `WorkerService`, bypassing HTTP
/// entirely (workers are this engine's own clients, not external API
/// consumers, per §6's endpoint table).
#[allow(dead_code)]
fn _worker_types_are_used_by_the_runtime_not_http(_: NewWorker, _: HeartbeatInput) {}
