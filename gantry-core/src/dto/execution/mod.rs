//! Execution DTOs for API communication

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::execution::{Execution, ExecutionStatus};

/// Request to start a manual execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateExecution {
    /// Branch name or full ref; defaults to the pipeline's default branch.
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub debug: bool,
}

/// Request to promote a successful execution to an environment
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteExecution {
    pub target: String,
    #[serde(default)]
    pub deploy_id: Option<Uuid>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// Status report from the execution runtime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportStatus {
    pub status: ExecutionStatus,
    #[serde(default)]
    pub error: Option<String>,
}

/// Pagination for execution listings
///
/// `cursor` is the number of the last execution seen; the next page starts
/// strictly below it.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub cursor: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One page of a listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass back as `cursor` to fetch the next page; absent on the last one.
    pub next_cursor: Option<i64>,
}

/// Result of submitting a trigger event
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TriggerResponse {
    Created { execution: Box<Execution> },
    Filtered { reason: String },
}
