//! Execution domain types
//!
//! An execution is one recorded attempt to run a pipeline for a trigger.
//! The status field follows a small state machine; every change to it goes
//! through [`Execution::transition`] or [`Execution::kill`] so that the
//! timestamps stay consistent with the status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Error message recorded on executions killed by a cancellation.
pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Execution record
///
/// Structure shared between the orchestrator (persists) and API clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub repo_id: Uuid,
    /// Per-pipeline sequence number, assigned by the store on create.
    pub number: i64,
    /// Number of the execution this one was promoted from.
    pub parent: Option<i64>,
    pub created_by: String,
    pub trigger: TriggerKind,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub event: EventMetadata,
    pub params: HashMap<String, String>,
    /// Name of the cron job that fired, for cron triggers.
    pub cron: Option<String>,
    /// Target environment name, for promotions.
    pub deploy: Option<String>,
    pub deploy_id: Option<Uuid>,
    pub debug: bool,
    /// Idempotency key of the event that created this execution.
    pub event_key: Option<String>,
    pub started: Option<DateTime<Utc>>,
    pub finished: Option<DateTime<Utc>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    pub version: i64,
}

/// Source-control metadata describing what an execution builds.
///
/// Empty strings mean "unknown"; most fields are best-effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMetadata {
    pub action: String,
    pub git_ref: String,
    pub before: String,
    pub after: String,
    pub fork: bool,
    pub source: String,
    pub target: String,
    pub author_login: String,
    pub author_name: String,
    pub author_email: String,
    pub author_avatar: String,
    pub sender: String,
    pub title: String,
    pub message: String,
    pub link: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failure,
    Error,
    Killed,
}

impl ExecutionStatus {
    /// Terminal statuses have no outgoing transitions.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success
                | ExecutionStatus::Failure
                | ExecutionStatus::Error
                | ExecutionStatus::Killed
        )
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(self, next: ExecutionStatus) -> bool {
        use ExecutionStatus::*;
        matches!(
            (self, next),
            (Pending, Running)
                | (Pending, Killed)
                | (Running, Success)
                | (Running, Failure)
                | (Running, Error)
                | (Running, Killed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Error => "error",
            ExecutionStatus::Killed => "killed",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ExecutionStatus::Pending),
            "running" => Ok(ExecutionStatus::Running),
            "success" => Ok(ExecutionStatus::Success),
            "failure" => Ok(ExecutionStatus::Failure),
            "error" => Ok(ExecutionStatus::Error),
            "killed" => Ok(ExecutionStatus::Killed),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// What fired an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    Push,
    PullRequest,
    Cron,
    Manual,
    Promote,
}

impl TriggerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TriggerKind::Push => "push",
            TriggerKind::PullRequest => "pull_request",
            TriggerKind::Cron => "cron",
            TriggerKind::Manual => "manual",
            TriggerKind::Promote => "promote",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TriggerKind {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "push" => Ok(TriggerKind::Push),
            "pull_request" => Ok(TriggerKind::PullRequest),
            "cron" => Ok(TriggerKind::Cron),
            "manual" => Ok(TriggerKind::Manual),
            "promote" => Ok(TriggerKind::Promote),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

/// A stored string did not name a known enum variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown variant: {0}")]
pub struct UnknownVariant(pub String);

/// An attempted status change that the state machine does not allow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("execution {id} cannot transition from {from} to {to}")]
pub struct TransitionError {
    pub id: Uuid,
    pub from: ExecutionStatus,
    pub to: ExecutionStatus,
}

impl Execution {
    /// Build a fresh pending execution for a pipeline.
    ///
    /// Identity, number and version are placeholders until the store
    /// assigns them on create.
    pub fn pending(
        pipeline_id: Uuid,
        repo_id: Uuid,
        created_by: impl Into<String>,
        trigger: TriggerKind,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::nil(),
            pipeline_id,
            repo_id,
            number: 0,
            parent: None,
            created_by: created_by.into(),
            trigger,
            status: ExecutionStatus::Pending,
            error: None,
            event: EventMetadata::default(),
            params: HashMap::new(),
            cron: None,
            deploy: None,
            deploy_id: None,
            debug: false,
            event_key: None,
            started: None,
            finished: None,
            created: now,
            updated: now,
            version: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a runtime-reported status change.
    ///
    /// Killed is reserved for [`Execution::kill`]. On error the record is
    /// left untouched.
    pub fn transition(
        &mut self,
        next: ExecutionStatus,
        error: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if next == ExecutionStatus::Killed || !self.status.can_transition_to(next) {
            return Err(self.rejected(next));
        }

        match next {
            ExecutionStatus::Running => self.started = Some(now),
            ExecutionStatus::Success => {
                self.finished = Some(now);
                self.error = None;
            }
            ExecutionStatus::Failure | ExecutionStatus::Error => {
                self.finished = Some(now);
                self.error = error;
            }
            ExecutionStatus::Pending | ExecutionStatus::Killed => unreachable!(),
        }

        self.status = next;
        self.updated = now;
        Ok(())
    }

    /// Force a pending or running execution into Killed.
    pub fn kill(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(ExecutionStatus::Killed) {
            return Err(self.rejected(ExecutionStatus::Killed));
        }

        self.status = ExecutionStatus::Killed;
        self.error = Some(CANCELLED_MESSAGE.to_string());
        self.finished = Some(now);
        self.updated = now;
        Ok(())
    }

    fn rejected(&self, to: ExecutionStatus) -> TransitionError {
        TransitionError {
            id: self.id,
            from: self.status,
            to,
        }
    }
}
