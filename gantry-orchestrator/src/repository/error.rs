//! Repository error types

use thiserror::Error;
use uuid::Uuid;

pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors surfaced by the execution and pipeline repositories
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    /// Another execution already holds this sequence number.
    #[error("pipeline {pipeline_id} already has execution #{number}")]
    Conflict { pipeline_id: Uuid, number: i64 },

    /// An execution was already created for this idempotency key.
    #[error("pipeline {pipeline_id} already processed event '{key}'")]
    DuplicateEvent { pipeline_id: Uuid, key: String },

    #[error("execution {id} was modified concurrently (expected version {version})")]
    VersionConflict { id: Uuid, version: i64 },

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    pub fn execution_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("execution {id}"))
    }

    pub fn number_not_found(pipeline_id: Uuid, number: i64) -> Self {
        StoreError::NotFound(format!("execution #{number} of pipeline {pipeline_id}"))
    }

    pub fn pipeline_not_found(id: Uuid) -> Self {
        StoreError::NotFound(format!("pipeline {id}"))
    }
}
