//! Execution-related API endpoints

use crate::OrchestratorClient;
use crate::error::Result;
use gantry_core::domain::execution::Execution;
use gantry_core::dto::execution::{
    CreateExecution, ListQuery, Page, PromoteExecution, ReportStatus, TriggerResponse,
};
use gantry_core::trigger::Hook;
use reqwest::Method;
use uuid::Uuid;

fn executions_path(repo_id: Uuid, pipeline_id: Uuid) -> String {
    format!("/api/repos/{repo_id}/pipelines/{pipeline_id}/executions")
}

impl OrchestratorClient {
    // =============================================================================
    // Pipeline Executions
    // =============================================================================

    /// List a pipeline's executions, newest first
    ///
    /// Pass the previous page's `next_cursor` as `cursor` to continue.
    pub async fn list_executions(
        &self,
        repo_id: Uuid,
        pipeline_id: Uuid,
        cursor: Option<i64>,
        limit: Option<u32>,
    ) -> Result<Page<Execution>> {
        let response = self
            .request(Method::GET, &executions_path(repo_id, pipeline_id))
            .query(&ListQuery { cursor, limit })
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Get an execution by its sequence number
    pub async fn get_execution(
        &self,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
    ) -> Result<Execution> {
        let path = format!("{}/{}", executions_path(repo_id, pipeline_id), number);
        let response = self.request(Method::GET, &path).send().await?;

        self.handle_response(response).await
    }

    /// Start a manual execution
    pub async fn create_execution(
        &self,
        repo_id: Uuid,
        pipeline_id: Uuid,
        req: &CreateExecution,
    ) -> Result<Execution> {
        let response = self
            .request(Method::POST, &executions_path(repo_id, pipeline_id))
            .json(req)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Cancel an execution; cancelling a finished one returns it unchanged
    pub async fn cancel_execution(
        &self,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
    ) -> Result<Execution> {
        let path = format!("{}/{}/cancel", executions_path(repo_id, pipeline_id), number);
        let response = self.request(Method::POST, &path).send().await?;

        self.handle_response(response).await
    }

    /// Promote a successful execution to a deployment target
    pub async fn promote_execution(
        &self,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
        req: &PromoteExecution,
    ) -> Result<Execution> {
        let path = format!("{}/{}/promote", executions_path(repo_id, pipeline_id), number);
        let response = self.request(Method::POST, &path).json(req).send().await?;

        self.handle_response(response).await
    }

    /// Delete an execution record
    pub async fn delete_execution(
        &self,
        repo_id: Uuid,
        pipeline_id: Uuid,
        number: i64,
    ) -> Result<()> {
        let path = format!("{}/{}", executions_path(repo_id, pipeline_id), number);
        let response = self.request(Method::DELETE, &path).send().await?;

        self.handle_empty_response(response).await
    }

    // =============================================================================
    // Runtime and Ingress
    // =============================================================================

    /// Report a status change from the execution runtime
    pub async fn report_status(&self, execution_id: Uuid, report: &ReportStatus) -> Result<Execution> {
        let path = format!("/api/executions/{execution_id}/status");
        let response = self.request(Method::POST, &path).json(report).send().await?;

        self.handle_response(response).await
    }

    /// Submit a trigger event, as a webhook relay or scheduler would
    pub async fn send_hook(&self, hook: &Hook) -> Result<TriggerResponse> {
        let response = self
            .request(Method::POST, "/api/hooks")
            .json(hook)
            .send()
            .await?;

        self.handle_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_encoding() {
        let client = OrchestratorClient::new("http://gantry").with_principal("bob");
        let (repo, pipeline) = (Uuid::nil(), Uuid::nil());
        let request = client
            .request(Method::GET, &executions_path(repo, pipeline))
            .query(&ListQuery {
                cursor: Some(8),
                limit: Some(3),
            })
            .build()
            .unwrap();

        assert_eq!(
            request.url().as_str(),
            format!(
                "http://gantry/api/repos/{repo}/pipelines/{pipeline}/executions?cursor=8&limit=3"
            )
        );
    }
}
