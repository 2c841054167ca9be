use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::Value;
use uuid::Uuid;

use super::AppState;
use db::repository::executions as exec_repo;
use engine::models::{ExecutionRequest, Priority};
use queue::QueuedItem;

#[derive(serde::Deserialize)]
pub struct ExecuteWorkflowDto {
    #[serde(default)]
    pub input: Value,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub idempotency_key: Option<String>,
}

#[derive(serde::Serialize)]
pub struct ExecuteWorkflowResponse {
    pub execution_id: Uuid,
}

/// Admits an execution the same way a trigger does: build an
/// `ExecutionRequest` and hand it straight to the priority queue (spec.md
/// §6 submit API). The `Execution` row itself is created by the
/// orchestrator once the dispatcher picks the request up — admission only
/// guarantees the request is durably queued.
pub async fn execute(
    Path(workflow_id): Path<Uuid>,
    State(state): State<AppState>,
    Json(payload): Json<ExecuteWorkflowDto>,
) -> Result<(StatusCode, Json<ExecuteWorkflowResponse>), StatusCode> {
    if db::repository::workflows::get_workflow(&state.pool, workflow_id).await.is_err() {
        return Err(StatusCode::NOT_FOUND);
    }

    if let Some(key) = &payload.idempotency_key {
        if let Ok(Some(existing)) = exec_repo::find_by_idempotency_key(&state.pool, key).await {
            return Ok((StatusCode::ACCEPTED, Json(ExecuteWorkflowResponse { execution_id: existing.id })));
        }
    }

    let mut request = ExecutionRequest::new(workflow_id, payload.priority.unwrap_or(Priority::Normal), payload.input);
    request.idempotency_key = payload.idempotency_key;

    // `PriorityQueue::enqueue` publishes `execution.queued` itself on success
    // (spec.md §4.2), so every admission path — this handler, the webhook
    // handler, and the schedule trigger — gets it for free.
    if state.queue.enqueue(QueuedItem::new(request.clone())).await.is_err() {
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok((StatusCode::ACCEPTED, Json(ExecuteWorkflowResponse { execution_id: request.id })))
}

/// Status inspection: the full `Execution` record plus its node-execution
/// list (spec.md §6).
#[derive(serde::Serialize)]
pub struct ExecutionDetail {
    #[serde(flatten)]
    pub execution: db::models::ExecutionRow,
    pub node_executions: Vec<db::models::NodeExecutionRow>,
}

pub async fn inspect(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<ExecutionDetail>, StatusCode> {
    let execution = match exec_repo::get_execution(&state.pool, id).await {
        Ok(e) => e,
        Err(db::DbError::NotFound) => return Err(StatusCode::NOT_FOUND),
        Err(_) => return Err(StatusCode::INTERNAL_SERVER_ERROR),
    };

    let node_executions = exec_repo::list_node_executions(&state.pool, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;

    Ok(Json(ExecutionDetail { execution, node_executions }))
}

/// The merged state-transition / node-event timeline for one execution
/// (spec.md §4.5 "Timeline").
pub async fn timeline(
    Path(id): Path<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Vec<db::models::TimelineEvent>>, StatusCode> {
    exec_repo::timeline(&state.pool, id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
