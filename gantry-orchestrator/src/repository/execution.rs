//! Execution Repository
//!
//! Durable, versioned storage for execution records.
//!
//! Sequence numbers are handed out by the create path only: the pipeline's
//! counter row is incremented and the execution inserted in one transaction,
//! so concurrent creates for the same pipeline serialize on that row lock.
//! Every update is a compare-and-swap on the `version` column.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::domain::execution::{EventMetadata, Execution, ExecutionStatus, UnknownVariant};
use gantry_core::dto::execution::Page;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::repository::error::{Result, StoreError};

const EVENT_KEY_INDEX: &str = "executions_pipeline_event_key";

const COLUMNS: &str = r#"
    id, pipeline_id, repo_id, number, parent, created_by, trigger_kind, status, error,
    action, git_ref, before_sha, after_sha, fork, source, target,
    author_login, author_name, author_email, author_avatar, sender,
    title, message, link, event_timestamp,
    params, cron, deploy, deploy_id, debug, event_key,
    started, finished, created, updated, version
"#;

/// Keyset pagination over sequence numbers, newest first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    /// Only executions numbered strictly below this are returned.
    pub cursor: Option<i64>,
    pub limit: u32,
}

/// Persistence for execution records
///
/// Implementations provide compare-and-swap semantics on `update` and
/// serialize sequence assignment per pipeline in `create`. No business
/// validation happens here.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Persist a new execution, assigning id, sequence number, version 1
    /// and timestamps.
    async fn create(&self, execution: Execution) -> Result<Execution>;

    async fn find(&self, id: Uuid) -> Result<Execution>;

    async fn find_by_number(&self, pipeline_id: Uuid, number: i64) -> Result<Execution>;

    async fn find_by_event_key(&self, pipeline_id: Uuid, key: &str) -> Result<Option<Execution>>;

    /// List a pipeline's executions by descending sequence number.
    async fn list(&self, pipeline_id: Uuid, page: Pagination) -> Result<Page<Execution>>;

    /// Pending and running executions of a pipeline, newest first.
    async fn list_active(&self, pipeline_id: Uuid) -> Result<Vec<Execution>>;

    /// Persist lifecycle changes if `execution.version` is still current.
    ///
    /// Returns the stored record with its incremented version.
    async fn update(&self, execution: &Execution) -> Result<Execution>;

    async fn delete(&self, id: Uuid) -> Result<()>;
}

/// PostgreSQL implementation of [`ExecutionRepository`]
#[derive(Clone)]
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn create(&self, execution: Execution) -> Result<Execution> {
        let mut tx = self.pool.begin().await?;

        let number: Option<i64> =
            sqlx::query_scalar("UPDATE pipelines SET seq = seq + 1 WHERE id = $1 RETURNING seq")
                .bind(execution.pipeline_id)
                .fetch_optional(&mut *tx)
                .await?;
        let number = number.ok_or_else(|| StoreError::pipeline_not_found(execution.pipeline_id))?;

        let now = Utc::now();
        let created = Execution {
            id: Uuid::new_v4(),
            number,
            version: 1,
            created: now,
            updated: now,
            ..execution
        };

        insert(&mut tx, &created)
            .await
            .map_err(|err| classify_insert_error(err, &created))?;
        tx.commit().await?;

        tracing::debug!(
            "Stored execution {} as #{} of pipeline {}",
            created.id,
            created.number,
            created.pipeline_id
        );

        Ok(created)
    }

    async fn find(&self, id: Uuid) -> Result<Execution> {
        let sql = format!("SELECT {COLUMNS} FROM executions WHERE id = $1");
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::execution_not_found(id))?
            .try_into()
    }

    async fn find_by_number(&self, pipeline_id: Uuid, number: i64) -> Result<Execution> {
        let sql = format!("SELECT {COLUMNS} FROM executions WHERE pipeline_id = $1 AND number = $2");
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(pipeline_id)
            .bind(number)
            .fetch_optional(&self.pool)
            .await?;

        row.ok_or_else(|| StoreError::number_not_found(pipeline_id, number))?
            .try_into()
    }

    async fn find_by_event_key(&self, pipeline_id: Uuid, key: &str) -> Result<Option<Execution>> {
        let sql =
            format!("SELECT {COLUMNS} FROM executions WHERE pipeline_id = $1 AND event_key = $2");
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(pipeline_id)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        row.map(Execution::try_from).transpose()
    }

    async fn list(&self, pipeline_id: Uuid, page: Pagination) -> Result<Page<Execution>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM executions
            WHERE pipeline_id = $1 AND ($2::BIGINT IS NULL OR number < $2)
            ORDER BY number DESC
            LIMIT $3
            "#
        );
        // One extra row tells us whether another page exists.
        let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(pipeline_id)
            .bind(page.cursor)
            .bind(i64::from(page.limit) + 1)
            .fetch_all(&self.pool)
            .await?;

        let mut items = rows
            .into_iter()
            .map(Execution::try_from)
            .collect::<Result<Vec<_>>>()?;

        Ok(paginate(&mut items, page.limit))
    }

    async fn list_active(&self, pipeline_id: Uuid) -> Result<Vec<Execution>> {
        let sql = format!(
            r#"
            SELECT {COLUMNS} FROM executions
            WHERE pipeline_id = $1 AND status IN ('pending', 'running')
            ORDER BY number DESC
            "#
        );
        let rows = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(pipeline_id)
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(Execution::try_from).collect()
    }

    async fn update(&self, execution: &Execution) -> Result<Execution> {
        let sql = format!(
            r#"
            UPDATE executions
            SET status = $1, error = $2, params = $3, debug = $4,
                started = $5, finished = $6, updated = $7, version = version + 1
            WHERE id = $8 AND version = $9
            RETURNING {COLUMNS}
            "#
        );
        let row = sqlx::query_as::<_, ExecutionRow>(&sql)
            .bind(execution.status.as_str())
            .bind(&execution.error)
            .bind(sqlx::types::Json(&execution.params))
            .bind(execution.debug)
            .bind(execution.started)
            .bind(execution.finished)
            .bind(Utc::now())
            .bind(execution.id)
            .bind(execution.version)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(row) = row {
            return row.try_into();
        }

        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM executions WHERE id = $1)")
            .bind(execution.id)
            .fetch_one(&self.pool)
            .await?;

        if exists {
            Err(StoreError::VersionConflict {
                id: execution.id,
                version: execution.version,
            })
        } else {
            Err(StoreError::execution_not_found(execution.id))
        }
    }

    async fn delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM executions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::execution_not_found(id));
        }
        Ok(())
    }
}

/// Trim an over-fetched, number-descending list to one page.
pub(crate) fn paginate(items: &mut Vec<Execution>, limit: u32) -> Page<Execution> {
    let limit = limit as usize;
    let has_more = items.len() > limit;
    items.truncate(limit);

    Page {
        next_cursor: if has_more {
            items.last().map(|e| e.number)
        } else {
            None
        },
        items: std::mem::take(items),
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

async fn insert(tx: &mut Transaction<'_, Postgres>, exec: &Execution) -> sqlx::Result<()> {
    let sql = format!(
        r#"
        INSERT INTO executions ({COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18,
                $19, $20, $21, $22, $23, $24, $25, $26, $27, $28, $29, $30, $31, $32, $33, $34,
                $35, $36)
        "#
    );
    let event = &exec.event;

    sqlx::query(&sql)
        .bind(exec.id)
        .bind(exec.pipeline_id)
        .bind(exec.repo_id)
        .bind(exec.number)
        .bind(exec.parent)
        .bind(&exec.created_by)
        .bind(exec.trigger.as_str())
        .bind(exec.status.as_str())
        .bind(&exec.error)
        .bind(&event.action)
        .bind(&event.git_ref)
        .bind(&event.before)
        .bind(&event.after)
        .bind(event.fork)
        .bind(&event.source)
        .bind(&event.target)
        .bind(&event.author_login)
        .bind(&event.author_name)
        .bind(&event.author_email)
        .bind(&event.author_avatar)
        .bind(&event.sender)
        .bind(&event.title)
        .bind(&event.message)
        .bind(&event.link)
        .bind(event.timestamp)
        .bind(sqlx::types::Json(&exec.params))
        .bind(&exec.cron)
        .bind(&exec.deploy)
        .bind(exec.deploy_id)
        .bind(exec.debug)
        .bind(&exec.event_key)
        .bind(exec.started)
        .bind(exec.finished)
        .bind(exec.created)
        .bind(exec.updated)
        .bind(exec.version)
        .execute(&mut **tx)
        .await?;

    Ok(())
}

fn classify_insert_error(err: sqlx::Error, exec: &Execution) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match (db.constraint(), &exec.event_key) {
                (Some(EVENT_KEY_INDEX), Some(key)) => StoreError::DuplicateEvent {
                    pipeline_id: exec.pipeline_id,
                    key: key.clone(),
                },
                _ => StoreError::Conflict {
                    pipeline_id: exec.pipeline_id,
                    number: exec.number,
                },
            };
        }
    }
    StoreError::Database(err)
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: Uuid,
    pipeline_id: Uuid,
    repo_id: Uuid,
    number: i64,
    parent: Option<i64>,
    created_by: String,
    trigger_kind: String,
    status: String,
    error: Option<String>,
    action: String,
    git_ref: String,
    before_sha: String,
    after_sha: String,
    fork: bool,
    source: String,
    target: String,
    author_login: String,
    author_name: String,
    author_email: String,
    author_avatar: String,
    sender: String,
    title: String,
    message: String,
    link: String,
    event_timestamp: Option<DateTime<Utc>>,
    params: serde_json::Value,
    cron: Option<String>,
    deploy: Option<String>,
    deploy_id: Option<Uuid>,
    debug: bool,
    event_key: Option<String>,
    started: Option<DateTime<Utc>>,
    finished: Option<DateTime<Utc>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
    version: i64,
}

impl TryFrom<ExecutionRow> for Execution {
    type Error = StoreError;

    fn try_from(row: ExecutionRow) -> Result<Self> {
        let corrupt = |what: &str, detail: String| {
            StoreError::Corrupt(format!("execution {} {}: {}", row.id, what, detail))
        };

        let status: ExecutionStatus = row
            .status
            .parse()
            .map_err(|e: UnknownVariant| corrupt("status", e.to_string()))?;
        let trigger = row
            .trigger_kind
            .parse()
            .map_err(|e: UnknownVariant| corrupt("trigger", e.to_string()))?;
        let params = serde_json::from_value(row.params.clone())
            .map_err(|e| corrupt("params", e.to_string()))?;

        Ok(Execution {
            id: row.id,
            pipeline_id: row.pipeline_id,
            repo_id: row.repo_id,
            number: row.number,
            parent: row.parent,
            created_by: row.created_by,
            trigger,
            status,
            error: row.error,
            event: EventMetadata {
                action: row.action,
                git_ref: row.git_ref,
                before: row.before_sha,
                after: row.after_sha,
                fork: row.fork,
                source: row.source,
                target: row.target,
                author_login: row.author_login,
                author_name: row.author_name,
                author_email: row.author_email,
                author_avatar: row.author_avatar,
                sender: row.sender,
                title: row.title,
                message: row.message,
                link: row.link,
                timestamp: row.event_timestamp,
            },
            params,
            cron: row.cron,
            deploy: row.deploy,
            deploy_id: row.deploy_id,
            debug: row.debug,
            event_key: row.event_key,
            started: row.started,
            finished: row.finished,
            created: row.created,
            updated: row.updated,
            version: row.version,
        })
    }
}
