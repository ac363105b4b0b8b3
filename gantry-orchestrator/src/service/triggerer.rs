//! Triggerer
//!
//! Turns an inbound trigger event into a new pending execution: validates
//! the event, applies the pipeline's trigger policy and duplicate detection,
//! enriches it with commit metadata, and persists it through the store which
//! hands out the sequence number.

use chrono::Utc;
use gantry_core::domain::execution::{Execution, ExecutionStatus, TriggerKind};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::trigger::{Hook, IdempotencyKeyMode, InvalidEvent, TriggerEvent};
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::repository::{ExecutionRepository, PipelineRepository, StoreError};
use crate::service::canceler::Canceler;
use crate::service::commit::{CommitError, CommitService};
use crate::service::error::{ExecutionError, Result};
use crate::service::policy::TriggerPolicy;
use crate::service::signals::Signals;

/// Why an event did not create an execution
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterReason {
    PolicyRejected,
    /// The same event already created execution `number`.
    Duplicate { number: i64 },
}

impl fmt::Display for FilterReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterReason::PolicyRejected => f.write_str("event does not match the pipeline's trigger rules"),
            FilterReason::Duplicate { number } => {
                write!(f, "event was already handled by execution #{number}")
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum TriggerOutcome {
    Created(Execution),
    Filtered(FilterReason),
}

pub struct Triggerer {
    executions: Arc<dyn ExecutionRepository>,
    pipelines: Arc<dyn PipelineRepository>,
    commits: Arc<dyn CommitService>,
    policy: Arc<dyn TriggerPolicy>,
    signals: Signals,
    canceler: Arc<Canceler>,
    dedupe: IdempotencyKeyMode,
}

impl Triggerer {
    pub fn new(
        executions: Arc<dyn ExecutionRepository>,
        pipelines: Arc<dyn PipelineRepository>,
        commits: Arc<dyn CommitService>,
        policy: Arc<dyn TriggerPolicy>,
        signals: Signals,
        canceler: Arc<Canceler>,
        dedupe: IdempotencyKeyMode,
    ) -> Self {
        Self {
            executions,
            pipelines,
            commits,
            policy,
            signals,
            canceler,
            dedupe,
        }
    }

    pub async fn trigger(&self, hook: Hook) -> Result<TriggerOutcome> {
        hook.event.validate()?;

        let pipeline = self.pipelines.find(hook.pipeline_id).await?;
        if pipeline.repo_id != hook.repo_id {
            return Err(InvalidEvent(format!(
                "pipeline {} does not belong to repository {}",
                pipeline.id, hook.repo_id
            ))
            .into());
        }

        if let TriggerEvent::Promote(promote) = &hook.event {
            self.require_promotable(pipeline.id, promote.parent).await?;
        }

        let kind = hook.event.kind();
        if !self.policy.allows(&pipeline, &hook.event.filter_subject()).await {
            tracing::info!("{} event filtered for pipeline {}", kind, pipeline.id);
            return Ok(TriggerOutcome::Filtered(FilterReason::PolicyRejected));
        }

        let event_key = hook.idempotency_key(self.dedupe);
        if let Some(key) = &event_key {
            if let Some(existing) = self.executions.find_by_event_key(pipeline.id, key).await? {
                tracing::info!(
                    "Event '{}' already handled by execution #{} of pipeline {}",
                    key,
                    existing.number,
                    pipeline.id
                );
                return Ok(TriggerOutcome::Filtered(FilterReason::Duplicate {
                    number: existing.number,
                }));
            }
        }

        let mut execution =
            Execution::pending(pipeline.id, pipeline.repo_id, hook.principal.as_str(), kind, Utc::now());
        hook.event.populate(&mut execution);
        execution.event_key = event_key;
        self.enrich(&hook.event, &mut execution).await?;

        let created = match self.store(execution).await? {
            TriggerOutcome::Created(created) => created,
            filtered => return Ok(filtered),
        };

        tracing::info!(
            "Created execution #{} ({}) for pipeline {} from {} event",
            created.number,
            created.id,
            pipeline.id,
            kind
        );

        self.signals.start(&created, &pipeline).await;
        self.signals.check(&created).await;
        self.supersede(&pipeline, &created).await;

        Ok(TriggerOutcome::Created(created))
    }

    /// Only a successful execution can be promoted.
    async fn require_promotable(&self, pipeline_id: Uuid, number: i64) -> Result<()> {
        let parent = self.executions.find_by_number(pipeline_id, number).await?;
        if parent.status != ExecutionStatus::Success {
            return Err(ExecutionError::InvalidRequest(format!(
                "execution #{} is {}, only successful executions can be promoted",
                parent.number, parent.status
            )));
        }
        Ok(())
    }

    /// Overlay provider metadata for the event's commit.
    ///
    /// Only events that cannot be built without it fail when the lookup does.
    async fn enrich(&self, event: &TriggerEvent, execution: &mut Execution) -> Result<()> {
        let Some(reference) = event.commit_ref() else {
            return Ok(());
        };

        match self.commits.resolve(execution.repo_id, reference).await {
            Ok(info) => info.apply_to(&mut execution.event),
            Err(CommitError::NotFound(reference)) if event.requires_metadata() => {
                return Err(InvalidEvent(format!("commit '{reference}' does not exist")).into());
            }
            Err(err @ CommitError::Unavailable(_)) if event.requires_metadata() => {
                return Err(err.into());
            }
            Err(err) => {
                tracing::warn!(
                    "Building {} execution without commit metadata: {}",
                    event.kind(),
                    err
                );
            }
        }
        Ok(())
    }

    /// Persist the execution, retrying a sequence conflict once.
    async fn store(&self, execution: Execution) -> Result<TriggerOutcome> {
        let mut retried = false;

        loop {
            match self.executions.create(execution.clone()).await {
                Ok(created) => return Ok(TriggerOutcome::Created(created)),
                Err(StoreError::Conflict { pipeline_id, number }) if !retried => {
                    tracing::warn!(
                        "Sequence conflict on #{} of pipeline {}, retrying",
                        number,
                        pipeline_id
                    );
                    retried = true;
                }
                Err(StoreError::DuplicateEvent { pipeline_id, key }) => {
                    return self.racing_duplicate(pipeline_id, &key).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Another delivery of the same event won the insert.
    async fn racing_duplicate(&self, pipeline_id: Uuid, key: &str) -> Result<TriggerOutcome> {
        match self.executions.find_by_event_key(pipeline_id, key).await? {
            Some(existing) => Ok(TriggerOutcome::Filtered(FilterReason::Duplicate {
                number: existing.number,
            })),
            None => Err(ExecutionError::Conflict(format!(
                "event '{key}' was recorded concurrently for pipeline {pipeline_id}"
            ))),
        }
    }

    async fn supersede(&self, pipeline: &Pipeline, latest: &Execution) {
        if !pipeline.cancel_superseded
            || !matches!(latest.trigger, TriggerKind::Push | TriggerKind::PullRequest)
        {
            return;
        }

        match self.canceler.cancel_superseded(latest).await {
            Ok(results) => {
                for (id, result) in results {
                    if let Err(e) = result {
                        tracing::warn!("Failed to cancel superseded execution {}: {}", id, e);
                    }
                }
            }
            Err(e) => tracing::warn!(
                "Could not list executions superseded by #{} of pipeline {}: {}",
                latest.number,
                pipeline.id,
                e
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::Harness;
    use gantry_core::domain::pipeline::TriggerRules;
    use gantry_core::dto::dispatch::DispatchMessage;
    use gantry_core::trigger::{ManualEvent, PromoteEvent, PullRequestEvent};
    use std::collections::{HashMap, HashSet};

    fn created(outcome: TriggerOutcome) -> Execution {
        match outcome {
            TriggerOutcome::Created(execution) => execution,
            TriggerOutcome::Filtered(reason) => panic!("unexpectedly filtered: {reason}"),
        }
    }

    fn manual(pipeline: &Pipeline) -> Hook {
        Hook {
            repo_id: pipeline.repo_id,
            pipeline_id: pipeline.id,
            principal: "alice".to_string(),
            delivery_id: None,
            event: TriggerEvent::Manual(ManualEvent {
                git_ref: "main".to_string(),
                sha: None,
                params: HashMap::new(),
                debug: false,
            }),
        }
    }

    #[tokio::test]
    async fn test_push_creates_pending_execution() {
        let h = Harness::new();
        let pipeline = h.pipeline();

        let exec = created(
            h.triggerer
                .trigger(h.push(&pipeline, "refs/heads/main", "abc", Some("d-1")))
                .await
                .unwrap(),
        );

        assert_eq!(exec.number, 1);
        assert_eq!(exec.version, 1);
        assert_eq!(exec.status, ExecutionStatus::Pending);
        assert_eq!(exec.event.after, "abc");
        assert_eq!(exec.event.title, "Commit abc");
        assert_eq!(exec.event_key.as_deref(), Some("delivery:d-1"));

        let messages = h.dispatcher.messages();
        assert_eq!(messages.len(), 1);
        assert!(matches!(messages[0], DispatchMessage::Start { number: 1, .. }));
        assert_eq!(h.checks.reports().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_triggers_get_unique_increasing_numbers() {
        let h = Harness::new();
        let pipeline = h.pipeline();

        let mut handles = Vec::new();
        for i in 0..40 {
            let triggerer = h.triggerer.clone();
            let hook = h.push(&pipeline, "refs/heads/main", &format!("sha{i}"), None);
            handles.push(tokio::spawn(async move { triggerer.trigger(hook).await }));
        }

        let mut numbers = HashSet::new();
        for handle in handles {
            let exec = created(handle.await.unwrap().unwrap());
            assert!(numbers.insert(exec.number), "number {} reused", exec.number);
        }
        assert_eq!(numbers, (1..=40).collect::<HashSet<i64>>());
    }

    #[tokio::test]
    async fn test_redelivered_event_is_filtered() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        let hook = h.push(&pipeline, "refs/heads/main", "abc", Some("d-1"));

        created(h.triggerer.trigger(hook.clone()).await.unwrap());
        let again = h.triggerer.trigger(hook).await.unwrap();

        assert!(matches!(
            again,
            TriggerOutcome::Filtered(FilterReason::Duplicate { number: 1 })
        ));
        assert_eq!(h.dispatcher.messages().len(), 1);
        assert_eq!(h.store.count(pipeline.id).await, 1);
    }

    #[tokio::test]
    async fn test_policy_rejection_is_filtered() {
        let h = Harness::new();
        let pipeline = h.pipeline_with(|p| {
            p.triggers = TriggerRules {
                events: vec![TriggerKind::Push],
                branches: vec!["main".to_string()],
            }
        });

        let outcome = h
            .triggerer
            .trigger(h.push(&pipeline, "refs/heads/dev", "abc", None))
            .await
            .unwrap();

        assert!(matches!(outcome, TriggerOutcome::Filtered(FilterReason::PolicyRejected)));
        assert!(h.dispatcher.messages().is_empty());
    }

    #[tokio::test]
    async fn test_conflict_is_retried_once() {
        let h = Harness::new();
        let pipeline = h.pipeline();

        h.store.inject_conflicts(1);
        let exec = created(
            h.triggerer
                .trigger(h.push(&pipeline, "refs/heads/main", "abc", None))
                .await
                .unwrap(),
        );
        assert_eq!(exec.number, 1);

        h.store.inject_conflicts(2);
        let err = h
            .triggerer
            .trigger(h.push(&pipeline, "refs/heads/main", "def", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unavailable_provider_aborts_push_but_not_manual() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        h.commits.fail_next(u32::MAX);

        let err = h
            .triggerer
            .trigger(h.push(&pipeline, "refs/heads/main", "abc", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Unavailable(_)));

        let exec = created(h.triggerer.trigger(manual(&pipeline)).await.unwrap());
        assert_eq!(exec.trigger, TriggerKind::Manual);
        assert_eq!(exec.event.git_ref, "refs/heads/main");
        assert!(exec.event.title.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_push_commit_is_invalid() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        h.commits.missing("abc");

        let err = h
            .triggerer
            .trigger(h.push(&pipeline, "refs/heads/main", "abc", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_hook_for_foreign_repo_is_invalid() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        let mut hook = h.push(&pipeline, "refs/heads/main", "abc", None);
        hook.repo_id = Uuid::new_v4();

        let err = h.triggerer.trigger(hook).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidEvent(_)));
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_not_found() {
        let h = Harness::new();
        let mut pipeline = Pipeline::new(Uuid::new_v4(), "ghost");
        pipeline.id = Uuid::new_v4();

        let err = h.triggerer.trigger(manual(&pipeline)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_new_push_cancels_superseded_executions_on_same_ref() {
        let h = Harness::new();
        let pipeline = h.pipeline_with(|p| p.cancel_superseded = true);

        let first = created(
            h.triggerer
                .trigger(h.push(&pipeline, "refs/heads/main", "a1", None))
                .await
                .unwrap(),
        );
        let other_branch = created(
            h.triggerer
                .trigger(h.push(&pipeline, "refs/heads/dev", "b1", None))
                .await
                .unwrap(),
        );
        let second = created(
            h.triggerer
                .trigger(h.push(&pipeline, "refs/heads/main", "a2", None))
                .await
                .unwrap(),
        );

        assert_eq!(h.store.find(first.id).await.unwrap().status, ExecutionStatus::Killed);
        assert_eq!(
            h.store.find(other_branch.id).await.unwrap().status,
            ExecutionStatus::Pending
        );
        assert_eq!(h.store.find(second.id).await.unwrap().status, ExecutionStatus::Pending);
        assert!(
            h.dispatcher
                .messages()
                .contains(&DispatchMessage::abort(first.id))
        );
    }

    #[tokio::test]
    async fn test_pull_request_ref_and_dedupe_by_commit() {
        let h = Harness::with_dedupe(IdempotencyKeyMode::Commit);
        let pipeline = h.pipeline();
        let hook = Hook {
            repo_id: pipeline.repo_id,
            pipeline_id: pipeline.id,
            principal: "octo".to_string(),
            delivery_id: Some("d-1".to_string()),
            event: TriggerEvent::PullRequest(PullRequestEvent {
                number: 12,
                action: "opened".to_string(),
                source: "feature".to_string(),
                target: "main".to_string(),
                after: "abc".to_string(),
                fork: false,
                title: "Feature".to_string(),
                sender: "octo".to_string(),
                link: String::new(),
            }),
        };

        let exec = created(h.triggerer.trigger(hook.clone()).await.unwrap());
        assert_eq!(exec.event.git_ref, "refs/pullreq/12/head");
        assert_eq!(exec.event_key.as_deref(), Some("pull_request:12:abc"));

        let mut redelivered = hook;
        redelivered.delivery_id = Some("d-2".to_string());
        assert!(matches!(
            h.triggerer.trigger(redelivered).await.unwrap(),
            TriggerOutcome::Filtered(FilterReason::Duplicate { number: 1 })
        ));
    }

    #[tokio::test]
    async fn test_promote_requires_successful_parent_on_every_path() {
        let h = Harness::new();
        let pipeline = h.pipeline();
        let parent = h.create(&pipeline, "refs/heads/main", "abc").await;
        let promote = |parent: i64| Hook {
            repo_id: pipeline.repo_id,
            pipeline_id: pipeline.id,
            principal: "alice".to_string(),
            delivery_id: None,
            event: TriggerEvent::Promote(PromoteEvent {
                parent,
                target: "production".to_string(),
                git_ref: "refs/heads/main".to_string(),
                after: "abc".to_string(),
                deploy_id: None,
                params: HashMap::new(),
            }),
        };

        let err = h.triggerer.trigger(promote(1)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::InvalidRequest(_)));

        let err = h.triggerer.trigger(promote(7)).await.unwrap_err();
        assert!(matches!(err, ExecutionError::NotFound(_)));

        h.start(parent.id).await;
        let mut running = h.store.find(parent.id).await.unwrap();
        running
            .transition(ExecutionStatus::Success, None, Utc::now())
            .unwrap();
        h.store.update(&running).await.unwrap();

        let promoted = created(h.triggerer.trigger(promote(1)).await.unwrap());
        assert_eq!(promoted.parent, Some(1));
        assert_eq!(promoted.deploy.as_deref(), Some("production"));
    }
}
