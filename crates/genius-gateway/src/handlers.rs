use crate::error::ApiError;
use crate::server::AppState;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use genius_core::GeniusError;
use genius_supervisor::{
    AgentConnection, AggregatedResult, CancelAck, StatusReport, SubmitReceipt, SubmitRequest,
    Workflow, WorkflowList,
};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

type ApiResult<T> = Result<T, ApiError>;

fn parse_id(raw: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw)
        .map_err(|_| ApiError(GeniusError::Validation(format!("'{raw}' is not a workflow id"))))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> ApiResult<Json<Value>> {
    let list = state.coordinator.list().await?;
    Ok(Json(serde_json::json!({
        "status": "ok",
        "service": "genius-supervisor",
        "active_workflows": list.active.len(),
        "terminal_workflows": list.terminal.len(),
    })))
}

/// `GET /api/agents`
pub async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<AgentConnection>> {
    Json(state.coordinator.registry().snapshot().await)
}

/// `POST /api/workflows`
///
/// The body is parsed here rather than by an extractor so that malformed
/// input gets the same error shape as every other rejection.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<SubmitReceipt>)> {
    let request: SubmitRequest = serde_json::from_slice(&body).map_err(|e| {
        ApiError(GeniusError::Validation(format!("malformed request body: {e}")))
    })?;
    let receipt = state.coordinator.submit(request).await?;
    info!(workflow_id = %receipt.workflow_id, "Submission accepted over HTTP");
    Ok((StatusCode::ACCEPTED, Json(receipt)))
}

/// `GET /api/workflows`
pub async fn list_workflows(State(state): State<Arc<AppState>>) -> ApiResult<Json<WorkflowList>> {
    Ok(Json(state.coordinator.list().await?))
}

/// `GET /api/workflows/{id}`
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Workflow>> {
    Ok(Json(state.coordinator.get(parse_id(&id)?).await?))
}

/// `GET /api/workflows/{id}/status`
pub async fn get_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<StatusReport>> {
    Ok(Json(state.coordinator.get_status(parse_id(&id)?).await?))
}

/// `GET /api/workflows/{id}/result`
pub async fn get_result(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<AggregatedResult>> {
    Ok(Json(state.coordinator.get_result(parse_id(&id)?).await?))
}

/// `POST /api/workflows/{id}/cancel`
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CancelAck>> {
    Ok(Json(state.coordinator.cancel(parse_id(&id)?).await?))
}

/// `DELETE /api/workflows/{id}`
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = parse_id(&id)?;
    state.coordinator.delete(id).await?;
    Ok(Json(serde_json::json!({"workflow_id": id, "deleted": true})))
}
