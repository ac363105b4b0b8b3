//! Test doubles shared by the service tests

use async_trait::async_trait;
use chrono::Utc;
use gantry_core::domain::check::CheckReport;
use gantry_core::domain::commit::{CommitAuthor, CommitInfo};
use gantry_core::domain::execution::{Execution, ExecutionStatus};
use gantry_core::domain::pipeline::Pipeline;
use gantry_core::dto::dispatch::DispatchMessage;
use gantry_core::dto::execution::Page;
use gantry_core::trigger::{Hook, IdempotencyKeyMode, PushEvent, TriggerEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::repository::error::Result as StoreResult;
use crate::repository::execution::Pagination;
use crate::repository::{
    ExecutionRepository, MemoryExecutionRepository, MemoryPipelineRepository, StoreError,
};
use crate::service::authz::Authorizer;
use crate::service::canceler::Canceler;
use crate::service::check::{CheckReporter, LinkBuilder};
use crate::service::commit::{CommitError, CommitService};
use crate::service::controller::ExecutionController;
use crate::service::dispatch::BuildDispatcher;
use crate::service::policy::PipelineRulesPolicy;
use crate::service::signals::Signals;
use crate::service::triggerer::{TriggerOutcome, Triggerer};

/// Commit provider answering with `sha = reference`
#[derive(Default)]
pub struct FakeCommits {
    state: Mutex<CommitState>,
}

#[derive(Default)]
struct CommitState {
    fail_next: u32,
    missing: HashSet<String>,
    delay: Option<Duration>,
    calls: u32,
}

impl FakeCommits {
    /// Answer the next `n` lookups with `Unavailable`.
    pub fn fail_next(&self, n: u32) {
        self.state.lock().unwrap().fail_next = n;
    }

    pub fn missing(&self, reference: &str) {
        self.state.lock().unwrap().missing.insert(reference.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        self.state.lock().unwrap().delay = Some(delay);
    }

    pub fn calls(&self) -> u32 {
        self.state.lock().unwrap().calls
    }
}

#[async_trait]
impl CommitService for FakeCommits {
    async fn resolve(&self, _repo_id: Uuid, reference: &str) -> Result<CommitInfo, CommitError> {
        let (delay, outcome) = {
            let mut state = self.state.lock().unwrap();
            state.calls += 1;
            let outcome = if state.missing.contains(reference) {
                Err(CommitError::NotFound(reference.to_string()))
            } else if state.fail_next > 0 {
                state.fail_next -= 1;
                Err(CommitError::Unavailable("provider down".to_string()))
            } else {
                Ok(CommitInfo {
                    sha: reference.to_string(),
                    title: format!("Commit {reference}"),
                    message: format!("Commit {reference}\n\nDetails"),
                    author: CommitAuthor {
                        login: "octo".to_string(),
                        name: "Octo Cat".to_string(),
                        email: "octo@example.com".to_string(),
                        avatar: String::new(),
                    },
                    link: String::new(),
                    timestamp: None,
                    stats: None,
                })
            };
            (state.delay, outcome)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        outcome
    }
}

#[derive(Default)]
pub struct RecordingDispatcher {
    messages: Mutex<Vec<DispatchMessage>>,
    failing: bool,
}

impl RecordingDispatcher {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn messages(&self) -> Vec<DispatchMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl BuildDispatcher for RecordingDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.clone());
        if self.failing {
            anyhow::bail!("dispatcher offline");
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingChecks {
    reports: Mutex<Vec<CheckReport>>,
    failing: bool,
}

impl RecordingChecks {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Default::default()
        }
    }

    pub fn reports(&self) -> Vec<CheckReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl CheckReporter for RecordingChecks {
    async fn report(&self, check: &CheckReport) -> anyhow::Result<()> {
        self.reports.lock().unwrap().push(check.clone());
        if self.failing {
            anyhow::bail!("provider rejected check");
        }
        Ok(())
    }
}

/// Memory store that can be told to fail the next few writes
#[derive(Default)]
pub struct ScriptedStore {
    inner: MemoryExecutionRepository,
    conflicts: AtomicU32,
    version_conflicts: AtomicU32,
}

impl ScriptedStore {
    pub fn inject_conflicts(&self, n: u32) {
        self.conflicts.store(n, Ordering::SeqCst);
    }

    pub fn inject_version_conflicts(&self, n: u32) {
        self.version_conflicts.store(n, Ordering::SeqCst);
    }

    pub async fn count(&self, pipeline_id: Uuid) -> usize {
        let page = Pagination {
            cursor: None,
            limit: u32::MAX - 1,
        };
        self.inner.list(pipeline_id, page).await.unwrap().items.len()
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl ExecutionRepository for ScriptedStore {
    async fn create(&self, execution: Execution) -> StoreResult<Execution> {
        if Self::take(&self.conflicts) {
            return Err(StoreError::Conflict {
                pipeline_id: execution.pipeline_id,
                number: 0,
            });
        }
        self.inner.create(execution).await
    }

    async fn find(&self, id: Uuid) -> StoreResult<Execution> {
        self.inner.find(id).await
    }

    async fn find_by_number(&self, pipeline_id: Uuid, number: i64) -> StoreResult<Execution> {
        self.inner.find_by_number(pipeline_id, number).await
    }

    async fn find_by_event_key(&self, pipeline_id: Uuid, key: &str) -> StoreResult<Option<Execution>> {
        self.inner.find_by_event_key(pipeline_id, key).await
    }

    async fn list(&self, pipeline_id: Uuid, page: Pagination) -> StoreResult<Page<Execution>> {
        self.inner.list(pipeline_id, page).await
    }

    async fn list_active(&self, pipeline_id: Uuid) -> StoreResult<Vec<Execution>> {
        self.inner.list_active(pipeline_id).await
    }

    async fn update(&self, execution: &Execution) -> StoreResult<Execution> {
        if Self::take(&self.version_conflicts) {
            return Err(StoreError::VersionConflict {
                id: execution.id,
                version: execution.version,
            });
        }
        self.inner.update(execution).await
    }

    async fn delete(&self, id: Uuid) -> StoreResult<()> {
        self.inner.delete(id).await
    }
}

/// Fully wired services over in-memory collaborators
pub struct Harness {
    pub store: Arc<ScriptedStore>,
    pub pipelines: Arc<MemoryPipelineRepository>,
    pub commits: Arc<FakeCommits>,
    pub dispatcher: Arc<RecordingDispatcher>,
    pub checks: Arc<RecordingChecks>,
    pub signals: Signals,
    pub canceler: Arc<Canceler>,
    pub triggerer: Arc<Triggerer>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_dedupe(IdempotencyKeyMode::Delivery)
    }

    pub fn with_dedupe(dedupe: IdempotencyKeyMode) -> Self {
        let store = Arc::new(ScriptedStore::default());
        let pipelines = Arc::new(MemoryPipelineRepository::new());
        let commits = Arc::new(FakeCommits::default());
        let dispatcher = Arc::new(RecordingDispatcher::default());
        let checks = Arc::new(RecordingChecks::default());
        let signals = Signals::new(
            dispatcher.clone(),
            checks.clone(),
            LinkBuilder::new("http://gantry.test"),
        );
        let canceler = Arc::new(Canceler::new(store.clone(), signals.clone(), 3));
        let triggerer = Arc::new(Triggerer::new(
            store.clone(),
            pipelines.clone(),
            commits.clone(),
            Arc::new(PipelineRulesPolicy),
            signals.clone(),
            canceler.clone(),
            dedupe,
        ));

        Self {
            store,
            pipelines,
            commits,
            dispatcher,
            checks,
            signals,
            canceler,
            triggerer,
        }
    }

    pub fn controller(&self, authorizer: Arc<dyn Authorizer>) -> ExecutionController {
        ExecutionController::new(
            self.store.clone(),
            self.pipelines.clone(),
            authorizer,
            self.triggerer.clone(),
            self.canceler.clone(),
            self.signals.clone(),
        )
    }

    pub fn pipeline(&self) -> Pipeline {
        self.pipeline_with(|_| {})
    }

    pub fn pipeline_with(&self, configure: impl FnOnce(&mut Pipeline)) -> Pipeline {
        let mut pipeline = Pipeline::new(Uuid::new_v4(), "build");
        configure(&mut pipeline);
        self.pipelines.insert(pipeline.clone()).unwrap();
        pipeline
    }

    pub fn push(&self, pipeline: &Pipeline, git_ref: &str, after: &str, delivery: Option<&str>) -> Hook {
        Hook {
            repo_id: pipeline.repo_id,
            pipeline_id: pipeline.id,
            principal: "octo".to_string(),
            delivery_id: delivery.map(str::to_string),
            event: TriggerEvent::Push(PushEvent {
                git_ref: git_ref.to_string(),
                before: String::new(),
                after: after.to_string(),
                sender: "octo".to_string(),
                link: String::new(),
            }),
        }
    }

    /// Trigger a push and return the created execution.
    pub async fn create(&self, pipeline: &Pipeline, git_ref: &str, after: &str) -> Execution {
        match self
            .triggerer
            .trigger(self.push(pipeline, git_ref, after, None))
            .await
            .unwrap()
        {
            TriggerOutcome::Created(execution) => execution,
            TriggerOutcome::Filtered(reason) => panic!("unexpectedly filtered: {reason}"),
        }
    }

    /// Move an execution to Running as the runtime would.
    pub async fn start(&self, id: Uuid) -> Execution {
        let mut execution = self.store.find(id).await.unwrap();
        execution
            .transition(ExecutionStatus::Running, None, Utc::now())
            .unwrap();
        self.store.update(&execution).await.unwrap()
    }
}
