//! Hook API Handler
//!
//! Ingress for source-control webhooks and the cron scheduler.

use axum::{Json, extract::State, http::StatusCode};
use gantry_core::dto::execution::TriggerResponse;
use gantry_core::trigger::Hook;

use crate::api::AppState;
use crate::api::error::ApiResult;
use crate::service::triggerer::TriggerOutcome;

/// POST /api/hooks
/// Created executions answer 201; filtered events answer 200 with the reason.
pub async fn handle_hook(
    State(state): State<AppState>,
    Json(hook): Json<Hook>,
) -> ApiResult<(StatusCode, Json<TriggerResponse>)> {
    tracing::debug!(
        "Received {} hook for pipeline {} (delivery {:?})",
        hook.event.kind(),
        hook.pipeline_id,
        hook.delivery_id
    );

    let (status, response) = match state.controller.handle_hook(hook).await? {
        TriggerOutcome::Created(execution) => (
            StatusCode::CREATED,
            TriggerResponse::Created {
                execution: Box::new(execution),
            },
        ),
        TriggerOutcome::Filtered(reason) => (
            StatusCode::OK,
            TriggerResponse::Filtered {
                reason: reason.to_string(),
            },
        ),
    };

    Ok((status, Json(response)))
}
