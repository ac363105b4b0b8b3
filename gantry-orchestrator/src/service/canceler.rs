//! Canceler
//!
//! Forces pending and running executions into Killed. Marking the record is
//! the durable part; the abort message to runners and the check update are
//! best-effort.

use chrono::Utc;
use gantry_core::domain::execution::Execution;
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{ExecutionRepository, StoreError};
use crate::service::error::Result;
use crate::service::signals::Signals;

/// Outcome of one cancellation within a batch
pub type CancelResult = (Uuid, Result<Execution>);

pub struct Canceler {
    executions: Arc<dyn ExecutionRepository>,
    signals: Signals,
    attempts: u32,
}

impl Canceler {
    pub fn new(executions: Arc<dyn ExecutionRepository>, signals: Signals, attempts: u32) -> Self {
        Self {
            executions,
            signals,
            attempts: attempts.max(1),
        }
    }

    /// Cancel one execution.
    ///
    /// Already-terminal executions are returned as they are, without
    /// signalling anything. Losing a version race re-reads and retries.
    pub async fn cancel(&self, id: Uuid) -> Result<Execution> {
        let mut attempt = 0;

        loop {
            attempt += 1;

            let mut execution = self.executions.find(id).await?;
            if execution.is_terminal() {
                tracing::debug!(
                    "Execution {} already {}, nothing to cancel",
                    id,
                    execution.status
                );
                return Ok(execution);
            }

            execution.kill(Utc::now())?;

            match self.executions.update(&execution).await {
                Ok(killed) => {
                    tracing::info!(
                        "Cancelled execution #{} ({}) of pipeline {}",
                        killed.number,
                        killed.id,
                        killed.pipeline_id
                    );
                    self.signals.abort(&killed).await;
                    self.signals.check(&killed).await;
                    return Ok(killed);
                }
                Err(StoreError::VersionConflict { version, .. }) if attempt < self.attempts => {
                    tracing::debug!(
                        "Execution {} changed under cancellation (version {}), retrying {}/{}",
                        id,
                        version,
                        attempt,
                        self.attempts
                    );
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Cancel several executions; one failure does not stop the others.
    pub async fn cancel_many(&self, ids: &[Uuid]) -> Vec<CancelResult> {
        let mut results = Vec::with_capacity(ids.len());
        for &id in ids {
            results.push((id, self.cancel(id).await));
        }
        results
    }

    /// Cancel active executions older than `latest` on the same ref.
    pub async fn cancel_superseded(&self, latest: &Execution) -> Result<Vec<CancelResult>> {
        let ids: Vec<Uuid> = self
            .executions
            .list_active(latest.pipeline_id)
            .await?
            .into_iter()
            .filter(|e| e.number < latest.number && e.event.git_ref == latest.event.git_ref)
            .map(|e| e.id)
            .collect();

        if !ids.is_empty() {
            tracing::info!(
                "Execution #{} supersedes {} active execution(s) on {}",
                latest.number,
                ids.len(),
                latest.event.git_ref
            );
        }

        Ok(self.cancel_many(&ids).await)
    }
}
