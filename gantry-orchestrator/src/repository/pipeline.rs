//! Pipeline Repository
//!
//! Read access to pipeline definitions owned by the surrounding platform.

use async_trait::async_trait;
use gantry_core::domain::execution::TriggerKind;
use gantry_core::domain::pipeline::{Pipeline, TriggerRules};
use sqlx::PgPool;
use uuid::Uuid;

use crate::repository::error::{Result, StoreError};

#[async_trait]
pub trait PipelineRepository: Send + Sync {
    async fn find(&self, id: Uuid) -> Result<Pipeline>;
}

/// PostgreSQL implementation of [`PipelineRepository`]
#[derive(Clone)]
pub struct PgPipelineRepository {
    pool: PgPool,
}

impl PgPipelineRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl PipelineRepository for PgPipelineRepository {
    async fn find(&self, id: Uuid) -> Result<Pipeline> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r#"
            SELECT id, repo_id, identifier, default_branch, config_path, seq,
                   trigger_events, trigger_branches, cancel_superseded,
                   created_at, updated_at
            FROM pipelines
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or_else(|| StoreError::pipeline_not_found(id))?
            .try_into()
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct PipelineRow {
    id: Uuid,
    repo_id: Uuid,
    identifier: String,
    default_branch: String,
    config_path: String,
    seq: i64,
    trigger_events: Vec<String>,
    trigger_branches: Vec<String>,
    cancel_superseded: bool,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<PipelineRow> for Pipeline {
    type Error = StoreError;

    fn try_from(row: PipelineRow) -> Result<Self> {
        let events = row
            .trigger_events
            .iter()
            .map(|e| e.parse::<TriggerKind>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| StoreError::Corrupt(format!("pipeline {} trigger events: {}", row.id, e)))?;

        Ok(Pipeline {
            id: row.id,
            repo_id: row.repo_id,
            identifier: row.identifier,
            default_branch: row.default_branch,
            config_path: row.config_path,
            seq: row.seq,
            triggers: TriggerRules {
                events,
                branches: row.trigger_branches,
            },
            cancel_superseded: row.cancel_superseded,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
