//! Source-control status checks mirroring an execution's status

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::{Execution, ExecutionStatus};

/// State of a check as the provider displays it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckState {
    Pending,
    Running,
    Success,
    Failure,
    Error,
}

impl From<ExecutionStatus> for CheckState {
    fn from(status: ExecutionStatus) -> Self {
        match status {
            ExecutionStatus::Pending => CheckState::Pending,
            ExecutionStatus::Running => CheckState::Running,
            ExecutionStatus::Success => CheckState::Success,
            ExecutionStatus::Failure => CheckState::Failure,
            ExecutionStatus::Error | ExecutionStatus::Killed => CheckState::Error,
        }
    }
}

/// Check update sent to the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckReport {
    pub execution_id: Uuid,
    pub repo_id: Uuid,
    pub sha: String,
    pub identifier: String,
    pub state: CheckState,
    pub link: String,
    pub summary: String,
}

impl CheckReport {
    /// Build the check for an execution; `None` when there is no commit to
    /// attach it to.
    pub fn for_execution(execution: &Execution, link: String) -> Option<Self> {
        if execution.event.after.is_empty() {
            return None;
        }

        let summary = match (&execution.error, execution.status) {
            (Some(error), _) => error.clone(),
            (None, status) => format!("execution #{} {}", execution.number, status),
        };

        Some(Self {
            execution_id: execution.id,
            repo_id: execution.repo_id,
            sha: execution.event.after.clone(),
            identifier: format!("gantry/{}", execution.pipeline_id),
            state: execution.status.into(),
            link,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::execution::TriggerKind;

    #[test]
    fn test_killed_maps_to_error_check() {
        let mut exec = Execution::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            TriggerKind::Push,
            chrono::Utc::now(),
        );
        exec.event.after = "deadbeef".to_string();
        exec.kill(chrono::Utc::now()).unwrap();

        let check = CheckReport::for_execution(&exec, "http://x".into()).unwrap();
        assert_eq!(check.state, CheckState::Error);
        assert_eq!(check.sha, "deadbeef");
        assert_eq!(check.summary, "cancelled");
    }

    #[test]
    fn test_no_check_without_commit() {
        let exec = Execution::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            TriggerKind::Cron,
            chrono::Utc::now(),
        );
        assert!(CheckReport::for_execution(&exec, String::new()).is_none());
    }
}
