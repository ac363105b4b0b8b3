//! Execution API Handlers
//!
//! HTTP endpoints for reading and driving the executions of one pipeline,
//! plus the runtime status report endpoint.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use gantry_core::domain::execution::Execution;
use gantry_core::dto::execution::{
    CreateExecution, ListQuery, Page, PromoteExecution, ReportStatus,
};
use uuid::Uuid;

use crate::api::AppState;
use crate::api::caller::Caller;
use crate::api::error::ApiResult;

// =============================================================================
// Pipeline-scoped Endpoints
// =============================================================================

/// GET /api/repos/{repo}/pipelines/{pipeline}/executions?cursor&limit
pub async fn list_executions(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((repo_id, pipeline_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<Page<Execution>>> {
    tracing::debug!("Listing executions of pipeline {}", pipeline_id);

    let page = state
        .controller
        .list(&principal, repo_id, pipeline_id, query)
        .await?;
    Ok(Json(page))
}

/// POST /api/repos/{repo}/pipelines/{pipeline}/executions
/// Start a manual execution
pub async fn create_execution(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((repo_id, pipeline_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<CreateExecution>,
) -> ApiResult<(StatusCode, Json<Execution>)> {
    tracing::info!("{} triggers pipeline {}", principal, pipeline_id);

    let execution = state
        .controller
        .create(&principal, repo_id, pipeline_id, req)
        .await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

/// GET /api/repos/{repo}/pipelines/{pipeline}/executions/{number}
pub async fn get_execution(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((repo_id, pipeline_id, number)): Path<(Uuid, Uuid, i64)>,
) -> ApiResult<Json<Execution>> {
    let execution = state
        .controller
        .get(&principal, repo_id, pipeline_id, number)
        .await?;
    Ok(Json(execution))
}

/// DELETE /api/repos/{repo}/pipelines/{pipeline}/executions/{number}
pub async fn delete_execution(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((repo_id, pipeline_id, number)): Path<(Uuid, Uuid, i64)>,
) -> ApiResult<StatusCode> {
    state
        .controller
        .delete(&principal, repo_id, pipeline_id, number)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/repos/{repo}/pipelines/{pipeline}/executions/{number}/cancel
pub async fn cancel_execution(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((repo_id, pipeline_id, number)): Path<(Uuid, Uuid, i64)>,
) -> ApiResult<Json<Execution>> {
    let execution = state
        .controller
        .cancel(&principal, repo_id, pipeline_id, number)
        .await?;
    Ok(Json(execution))
}

/// POST /api/repos/{repo}/pipelines/{pipeline}/executions/{number}/promote
pub async fn promote_execution(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path((repo_id, pipeline_id, number)): Path<(Uuid, Uuid, i64)>,
    Json(req): Json<PromoteExecution>,
) -> ApiResult<(StatusCode, Json<Execution>)> {
    tracing::info!(
        "{} promotes execution #{} of pipeline {} to {}",
        principal,
        number,
        pipeline_id,
        req.target
    );

    let execution = state
        .controller
        .promote(&principal, repo_id, pipeline_id, number, req)
        .await?;
    Ok((StatusCode::CREATED, Json(execution)))
}

// =============================================================================
// Runtime Endpoints
// =============================================================================

/// POST /api/executions/{id}/status
/// Status report from the execution runtime
pub async fn report_status(
    State(state): State<AppState>,
    Caller(principal): Caller,
    Path(id): Path<Uuid>,
    Json(report): Json<ReportStatus>,
) -> ApiResult<Json<Execution>> {
    tracing::debug!("Execution {} reports {}", id, report.status);

    let execution = state
        .controller
        .report_status(&principal, id, report)
        .await?;
    Ok(Json(execution))
}
