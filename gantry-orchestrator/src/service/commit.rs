//! Commit Enricher
//!
//! Resolves a ref or sha into descriptive commit metadata from the
//! source-control provider. A pure lookup: nothing here writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use gantry_core::domain::commit::{CommitAuthor, CommitInfo, DiffStats};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::RetryPolicy;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommitError {
    #[error("commit '{0}' not found")]
    NotFound(String),

    #[error("source control provider unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait CommitService: Send + Sync {
    async fn resolve(&self, repo_id: Uuid, reference: &str) -> Result<CommitInfo, CommitError>;
}

/// [`CommitService`] backed by the provider's REST API
pub struct HttpCommitService {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl HttpCommitService {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    /// `{base}/api/v1/repos/{repo}/commits/{ref}` with the ref as one
    /// encoded segment, so `release/1.2` stays a single path component.
    fn commit_url(&self, repo_id: Uuid, reference: &str) -> Result<Url, CommitError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| CommitError::Unavailable(format!("invalid provider url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| CommitError::Unavailable(format!("invalid provider url: {}", self.base_url)))?
            .pop_if_empty()
            .extend(["api", "v1", "repos", repo_id.to_string().as_str(), "commits", reference]);
        Ok(url)
    }
}

#[async_trait]
impl CommitService for HttpCommitService {
    async fn resolve(&self, repo_id: Uuid, reference: &str) -> Result<CommitInfo, CommitError> {
        let url = self.commit_url(repo_id, reference)?;

        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CommitError::Unavailable(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(CommitError::NotFound(reference.to_string())),
            status if status.is_success() => {
                let payload: CommitPayload = response
                    .json()
                    .await
                    .map_err(|e| CommitError::Unavailable(format!("malformed commit payload: {e}")))?;
                Ok(payload.into())
            }
            status => Err(CommitError::Unavailable(format!(
                "commit lookup for '{reference}' returned {status}"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitPayload {
    sha: String,
    title: String,
    message: String,
    author: CommitAuthorPayload,
    html_url: String,
    timestamp: Option<DateTime<Utc>>,
    stats: Option<DiffStats>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CommitAuthorPayload {
    login: String,
    name: String,
    email: String,
    avatar_url: String,
}

impl From<CommitPayload> for CommitInfo {
    fn from(payload: CommitPayload) -> Self {
        let title = if payload.title.is_empty() {
            payload.message.lines().next().unwrap_or_default().to_string()
        } else {
            payload.title
        };

        CommitInfo {
            sha: payload.sha,
            title,
            message: payload.message,
            author: CommitAuthor {
                login: payload.author.login,
                name: payload.author.name,
                email: payload.author.email,
                avatar: payload.author.avatar_url,
            },
            link: payload.html_url,
            timestamp: payload.timestamp,
            stats: payload.stats,
        }
    }
}

/// Bounds each lookup by a timeout and retries `Unavailable` with backoff
///
/// `NotFound` is final and never retried.
pub struct RetryingCommitService {
    inner: Arc<dyn CommitService>,
    policy: RetryPolicy,
}

impl RetryingCommitService {
    pub fn new(inner: Arc<dyn CommitService>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    async fn attempt(&self, repo_id: Uuid, reference: &str) -> Result<CommitInfo, CommitError> {
        match tokio::time::timeout(self.policy.timeout, self.inner.resolve(repo_id, reference)).await {
            Ok(result) => result,
            Err(_) => Err(CommitError::Unavailable(format!(
                "commit lookup for '{}' timed out after {:?}",
                reference, self.policy.timeout
            ))),
        }
    }
}

#[async_trait]
impl CommitService for RetryingCommitService {
    async fn resolve(&self, repo_id: Uuid, reference: &str) -> Result<CommitInfo, CommitError> {
        let attempts = self.policy.attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            match self.attempt(repo_id, reference).await {
                Err(CommitError::Unavailable(detail)) if attempt < attempts => {
                    let delay = self.policy.backoff(attempt);
                    tracing::warn!(
                        "Commit lookup attempt {}/{} for '{}' failed: {}. Retrying in {:?}",
                        attempt,
                        attempts,
                        reference,
                        detail,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(CommitError::Unavailable(detail)) => {
                    tracing::error!(
                        "Commit lookup for '{}' failed after {} attempts: {}",
                        reference,
                        attempts,
                        detail
                    );
                    return Err(CommitError::Unavailable(detail));
                }
                result => return result,
            }
        }
    }
}
