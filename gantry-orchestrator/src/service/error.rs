//! Service error types

use gantry_core::domain::access::Action;
use gantry_core::domain::execution::TransitionError;
use gantry_core::trigger::InvalidEvent;
use thiserror::Error;
use uuid::Uuid;

use crate::repository::StoreError;
use crate::service::commit::CommitError;

pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Errors surfaced by the execution services
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("execution {id} was modified concurrently (version {version} is stale)")]
    VersionConflict { id: Uuid, version: i64 },

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    /// A manual trigger was rejected by the pipeline's rules.
    #[error("trigger filtered: {0}")]
    Filtered(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("{principal} is not allowed to {action} executions of pipeline {pipeline_id}")]
    Forbidden {
        principal: String,
        action: Action,
        pipeline_id: Uuid,
    },

    #[error(transparent)]
    InvalidEvent(#[from] InvalidEvent),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ExecutionError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ExecutionError::NotFound(what),
            err @ (StoreError::Conflict { .. } | StoreError::DuplicateEvent { .. }) => {
                ExecutionError::Conflict(err.to_string())
            }
            StoreError::VersionConflict { id, version } => {
                ExecutionError::VersionConflict { id, version }
            }
            StoreError::Corrupt(detail) => ExecutionError::Internal(detail),
            StoreError::Database(err) => ExecutionError::Database(err),
        }
    }
}

impl From<CommitError> for ExecutionError {
    fn from(err: CommitError) -> Self {
        match err {
            CommitError::NotFound(reference) => {
                ExecutionError::NotFound(format!("commit {reference}"))
            }
            CommitError::Unavailable(detail) => ExecutionError::Unavailable(detail),
        }
    }
}
