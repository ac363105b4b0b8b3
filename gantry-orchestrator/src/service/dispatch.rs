//! Build dispatch
//!
//! Hands start and abort messages to whatever schedules work on runners.
//! Delivery is best-effort: callers log failures and move on.

use anyhow::Context;
use async_trait::async_trait;
use gantry_core::dto::dispatch::DispatchMessage;
use reqwest::Client;

#[async_trait]
pub trait BuildDispatcher: Send + Sync {
    async fn dispatch(&self, message: &DispatchMessage) -> anyhow::Result<()>;
}

/// Posts dispatch messages as JSON to a fixed endpoint
pub struct HttpDispatcher {
    client: Client,
    url: String,
}

impl HttpDispatcher {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl BuildDispatcher for HttpDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> anyhow::Result<()> {
        self.client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .context("Failed to reach build dispatcher")?
            .error_for_status()
            .context("Build dispatcher rejected message")?;

        tracing::debug!("Dispatched message for execution {}", message.execution_id());
        Ok(())
    }
}

/// Used when no dispatcher endpoint is configured
pub struct LogDispatcher;

#[async_trait]
impl BuildDispatcher for LogDispatcher {
    async fn dispatch(&self, message: &DispatchMessage) -> anyhow::Result<()> {
        tracing::info!(
            "No dispatcher configured, dropping message: {}",
            serde_json::to_string(message)?
        );
        Ok(())
    }
}

/// Send a message, logging instead of failing.
pub async fn dispatch_logged(dispatcher: &dyn BuildDispatcher, message: DispatchMessage) {
    if let Err(e) = dispatcher.dispatch(&message).await {
        tracing::warn!(
            "Dispatch for execution {} failed: {:#}",
            message.execution_id(),
            e
        );
    }
}
