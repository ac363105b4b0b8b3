//! Check reporting
//!
//! Publishes execution state as commit checks on the source-control
//! provider. Reports are fire-and-forget.

use anyhow::Context;
use async_trait::async_trait;
use gantry_core::domain::check::{CheckReport, CheckState};
use gantry_core::domain::execution::Execution;
use reqwest::Client;
use serde::Serialize;
use uuid::Uuid;

#[async_trait]
pub trait CheckReporter: Send + Sync {
    async fn report(&self, check: &CheckReport) -> anyhow::Result<()>;
}

/// Posts checks to `{scm_url}/api/v1/repos/{repo_id}/checks/commits/{sha}`
pub struct HttpCheckReporter {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCheckReporter {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[derive(Serialize)]
struct CheckPayload<'a> {
    execution_id: Uuid,
    identifier: &'a str,
    state: CheckState,
    link: &'a str,
    summary: &'a str,
}

#[async_trait]
impl CheckReporter for HttpCheckReporter {
    async fn report(&self, check: &CheckReport) -> anyhow::Result<()> {
        let url = format!(
            "{}/api/v1/repos/{}/checks/commits/{}",
            self.base_url, check.repo_id, check.sha
        );
        let payload = CheckPayload {
            execution_id: check.execution_id,
            identifier: &check.identifier,
            state: check.state,
            link: &check.link,
            summary: &check.summary,
        };

        let mut request = self.client.post(&url).json(&payload);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        request
            .send()
            .await
            .context("Failed to reach check endpoint")?
            .error_for_status()
            .context("Check endpoint rejected report")?;
        Ok(())
    }
}

/// Builds the user-facing link for an execution
#[derive(Debug, Clone)]
pub struct LinkBuilder {
    public_url: String,
}

impl LinkBuilder {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn execution(&self, execution: &Execution) -> String {
        format!(
            "{}/api/repos/{}/pipelines/{}/executions/{}",
            self.public_url, execution.repo_id, execution.pipeline_id, execution.number
        )
    }
}

/// Report the execution's current state, logging instead of failing.
///
/// Executions without a commit sha have nothing to attach a check to.
pub async fn report_logged(reporter: &dyn CheckReporter, links: &LinkBuilder, execution: &Execution) {
    let Some(check) = CheckReport::for_execution(execution, links.execution(execution)) else {
        tracing::debug!("Execution {} has no commit, skipping check", execution.id);
        return;
    };

    if let Err(e) = reporter.report(&check).await {
        tracing::warn!(
            "Check report for execution {} ({:?}) failed: {:#}",
            execution.id,
            check.state,
            e
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::RecordingChecks;
    use chrono::Utc;
    use gantry_core::domain::execution::TriggerKind;

    fn execution(after: &str) -> Execution {
        let mut exec = Execution::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            TriggerKind::Push,
            Utc::now(),
        );
        exec.number = 4;
        exec.event.after = after.to_string();
        exec
    }

    #[tokio::test]
    async fn test_report_includes_link() {
        let checks = RecordingChecks::default();
        let links = LinkBuilder::new("http://gantry.local/");
        let exec = execution("abc");

        report_logged(&checks, &links, &exec).await;

        let reports = checks.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].state, CheckState::Pending);
        assert!(reports[0].link.starts_with("http://gantry.local/api/repos/"));
        assert!(reports[0].link.ends_with("/executions/4"));
    }

    #[tokio::test]
    async fn test_skips_executions_without_commit() {
        let checks = RecordingChecks::default();
        report_logged(&checks, &LinkBuilder::new("http://x"), &execution("")).await;
        assert!(checks.reports().is_empty());
    }

    #[tokio::test]
    async fn test_reporter_failure_is_logged_only() {
        let checks = RecordingChecks::failing();
        report_logged(&checks, &LinkBuilder::new("http://x"), &execution("abc")).await;
        assert_eq!(checks.reports().len(), 1);
    }
}
