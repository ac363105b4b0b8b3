//! Execution Controller
//!
//! Entry point for every principal-facing execution operation. Each call is
//! authorized against the pipeline it addresses and scoped to the repository
//! that owns that pipeline; mutating work is delegated to the Triggerer and
//! Canceler.

use chrono::Utc;
use gantry_core::domain::access::{Action, Principal, Resource};
use gantry_core::domain::execution::{Execution, ExecutionStatus, TriggerKind};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::execution::{
    CreateExecution, ListQuery, Page, PromoteExecution, ReportStatus,
};
use gantry_core::trigger::{Hook, InvalidEvent, ManualEvent, PromoteEvent, TriggerEvent};
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::execution::Pagination;
use crate::repository::{ExecutionRepository, PipelineRepository, StoreError};
use crate::service::authz::Authorizer;
use crate::service::canceler::Canceler;
use crate::service::error::{ExecutionError, Result};
use crate::service::signals::Signals;
use crate::service::triggerer::{TriggerOutcome, Triggerer};

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

pub struct ExecutionController {
    executions: Arc<dyn ExecutionRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    authorizer: Arc<dyn Authorizer>,
    triggerer: Arc<Triggerer>,
    canceler: Arc<Canceler>,
    signals: Signals,
}

impl ExecutionController {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        authorizer: Arc<dyn Authorizer>,
        triggerer: Arc<Triggerer>,
        canceler: Arc<Canceler>,
        signals: Signals,
    ) -> Self {
        Self {
            executions,
            pipelines,
            authorizer,
            triggerer,
            canceler,
            signals,
        }
    }

    pub async fn get(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
    ) -> Result<Execution> {
        self.scope(principal, repo_id, pipeline_id, Action::View).await?;
        Ok(self.executions.find_by_number(pipeline_id, number).await?)
    }

    pub async fn list(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        query: ListQuery,
    ) -> Result<Page<Execution>> {
        let limit = query.limit.unwrap_or(DEFAULT_PAGE_SIZE);
        if limit == 0 {
            return Err(ExecutionError::InvalidRequest(
                "limit must be at least 1".to_string(),
            ));
        }

        self.scope(principal, repo_id, pipeline_id, Action::View).await?;

        let page = Pagination {
            cursor: query.cursor,
            limit: limit.min(MAX_PAGE_SIZE),
        };
        Ok(self.executions.list(pipeline_id, page).await?)
    }

    pub async fn cancel(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
    ) -> Result<Execution> {
        self.scope(principal, repo_id, pipeline_id, Action::Cancel).await?;
        let execution = self.executions.find_by_number(pipeline_id, number).await?;

        tracing::info!("{} cancels execution #{} of pipeline {}", principal, number, pipeline_id);
        self.canceler.cancel(execution.id).await
    }

    /// Start a manual execution.
    pub async fn create(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        req: CreateExecution,
    ) -> Result<Execution> {
        let pipeline = self.scope(principal, repo_id, pipeline_id, Action::Trigger).await?;

        let event = TriggerEvent::Manual(ManualEvent {
            git_ref: req.branch.unwrap_or_else(|| pipeline.default_branch.clone()),
            sha: req.sha,
            params: req.params,
            debug: req.debug,
        });
        self.run(principal, &pipeline, event).await
    }

    /// Deploy the commit of a successful execution to an environment.
    pub async fn promote(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
        req: PromoteExecution,
    ) -> Result<Execution> {
        let pipeline = self.scope(principal, repo_id, pipeline_id, Action::Trigger).await?;
        let parent = self.executions.find_by_number(pipeline_id, number).await?;

        let mut params = parent.params.clone();
        params.extend(req.params);

        let event = TriggerEvent::Promote(PromoteEvent {
            parent: parent.number,
            target: req.target,
            git_ref: parent.event.git_ref.clone(),
            after: parent.event.after.clone(),
            deploy_id: req.deploy_id,
            params,
        });
        self.run(principal, &pipeline, event).await
    }

    /// Administrative removal; the sequence number is not reused.
    pub async fn delete(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
    ) -> Result<()> {
        self.scope(principal, repo_id, pipeline_id, Action::Delete).await?;
        let execution = self.executions.find_by_number(pipeline_id, number).await?;

        if !execution.is_terminal() {
            tracing::warn!(
                "Deleting execution #{} of pipeline {} while {}",
                number,
                pipeline_id,
                execution.status
            );
        }

        self.executions.delete(execution.id).await?;
        tracing::info!("{} deleted execution #{} of pipeline {}", principal, number, pipeline_id);
        Ok(())
    }

    /// Apply a status reported by the execution runtime.
    ///
    /// A stale version is surfaced to the reporter rather than retried. A
    /// denied principal sees the same NotFound as for an unknown id.
    pub async fn report_status(
        &self,
        principal: &Principal,
        execution_id: Uuid,
        report: ReportStatus,
    ) -> Result<Execution> {
        if matches!(report.status, ExecutionStatus::Killed | ExecutionStatus::Pending) {
            return Err(ExecutionError::InvalidRequest(format!(
                "status {} cannot be reported by the runtime",
                report.status
            )));
        }

        let mut execution = self.executions.find(execution_id).await?;
        if let Err(denied) = self
            .authorize(principal, execution.repo_id, execution.pipeline_id, Action::Report)
            .await
        {
            tracing::debug!("Status report for {} rejected: {}", execution_id, denied);
            return Err(StoreError::execution_not_found(execution_id).into());
        }

        execution.transition(report.status, report.error, Utc::now())?;
        let updated = self.executions.update(&execution).await?;

        tracing::info!(
            "Execution #{} of pipeline {} is now {}",
            updated.number,
            updated.pipeline_id,
            updated.status
        );
        self.signals.check(&updated).await;

        Ok(updated)
    }

    /// Webhook and scheduler ingress.
    ///
    /// Manual and promote events carry no authenticated principal here and
    /// must come through `create` and `promote`.
    pub async fn handle_hook(&self, hook: Hook) -> Result<TriggerOutcome> {
        let kind = hook.event.kind();
        if matches!(kind, TriggerKind::Manual | TriggerKind::Promote) {
            return Err(InvalidEvent(format!(
                "{kind} events cannot be submitted as hooks, use the execution API"
            ))
            .into());
        }
        self.triggerer.trigger(hook).await
    }

    async fn run(&self, principal: &Principal, pipeline: &Pipeline, event: TriggerEvent) -> Result<Execution> {
        let hook = Hook {
            repo_id: pipeline.repo_id,
            pipeline_id: pipeline.id,
            principal: principal.to_string(),
            delivery_id: None,
            event,
        };

        match self.triggerer.trigger(hook).await? {
            TriggerOutcome::Created(execution) => Ok(execution),
            TriggerOutcome::Filtered(reason) => Err(ExecutionError::Filtered(reason.to_string())),
        }
    }

    async fn authorize(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        action: Action,
    ) -> Result<()> {
        let resource = Resource {
            repo_id,
            pipeline_id,
        };
        if !self.authorizer.authorize(principal, &resource, action).await {
            return Err(ExecutionError::Forbidden {
                principal: principal.to_string(),
                action,
                pipeline_id,
            });
        }
        Ok(())
    }

    /// Authorize, then load the pipeline and check it belongs to the repo.
    async fn scope(
        &self,
        principal: &Principal,
        repo_id: Uuid,
        pipeline_id: Uuid,
        action: Action,
    ) -> Result<Pipeline> {
        self.authorize(principal, repo_id, pipeline_id, action).await?;

        let pipeline = self.pipelines.find(pipeline_id).await?;
        if pipeline.repo_id != repo_id {
            return Err(StoreError::pipeline_not_found(pipeline_id).into());
        }
        Ok(pipeline)
    }
}
