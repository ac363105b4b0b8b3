//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod caller;
pub mod error;
pub mod execution;
pub mod health;
pub mod hook;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::service::ExecutionController;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<ExecutionController>,
}

/// Create the main API router with all endpoints
pub fn create_router(controller: Arc<ExecutionController>) -> Router {
    let executions = "/api/repos/{repo}/pipelines/{pipeline}/executions";

    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Trigger ingress
        .route("/api/hooks", post(hook::handle_hook))
        // Pipeline-scoped execution endpoints
        .route(
            executions,
            get(execution::list_executions).post(execution::create_execution),
        )
        .route(
            &format!("{executions}/{{number}}"),
            get(execution::get_execution).delete(execution::delete_execution),
        )
        .route(
            &format!("{executions}/{{number}}/cancel"),
            post(execution::cancel_execution),
        )
        .route(
            &format!("{executions}/{{number}}/promote"),
            post(execution::promote_execution),
        )
        // Runtime reporting
        .route("/api/executions/{id}/status", post(execution::report_status))
        // Add state and middleware
        .with_state(AppState { controller })
        .layer(TraceLayer::new_for_http())
}
