//! Gantry HTTP Client
//!
//! A simple, type-safe HTTP client for the Gantry orchestrator API.
//!
//! # Example
//!
//! ```no_run
//! use gantry_client::OrchestratorClient;
//! use uuid::Uuid;
//!
//! # async fn example(repo: Uuid, pipeline: Uuid) -> gantry_client::Result<()> {
//! let client = OrchestratorClient::new("http://localhost:8080").with_principal("alice");
//!
//! let page = client.list_executions(repo, pipeline, None, Some(10)).await?;
//! for execution in page.items {
//!     println!("#{} {}", execution.number, execution.status);
//! }
//! # Ok(())
//! # }
//! ```

pub mod error;
mod executions;

// Re-export commonly used types
pub use error::{ClientError, Result};

use gantry_core::domain::access::PRINCIPAL_HEADER;
use reqwest::{Client, Method, RequestBuilder};
use serde::de::DeserializeOwned;

/// HTTP client for the Gantry orchestrator API
#[derive(Debug, Clone)]
pub struct OrchestratorClient {
    /// Base URL of the orchestrator (e.g., "http://localhost:8080")
    base_url: String,
    /// Sent as the caller identity on every request
    principal: Option<String>,
    /// HTTP client instance
    client: Client,
}

impl OrchestratorClient {
    /// Create a new orchestrator client
    ///
    /// # Example
    /// ```
    /// use gantry_client::OrchestratorClient;
    ///
    /// let client = OrchestratorClient::new("http://localhost:8080");
    /// ```
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new orchestrator client with a custom HTTP client
    ///
    /// This allows you to configure timeouts, proxies, TLS settings, etc.
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            principal: None,
            client,
        }
    }

    /// Identify requests as coming from `principal`
    pub fn with_principal(mut self, principal: impl Into<String>) -> Self {
        self.principal = Some(principal.into());
        self
    }

    /// Get the base URL of the orchestrator
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn principal(&self) -> Option<&str> {
        self.principal.as_deref()
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!("{} {}", method, url);
        let builder = self.client.request(method, url);
        match &self.principal {
            Some(principal) => builder.header(PRINCIPAL_HEADER, principal),
            None => builder,
        }
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Handle an API response and deserialize JSON
    async fn handle_response<T: DeserializeOwned>(&self, response: reqwest::Response) -> Result<T> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Orchestrator answered {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        response
            .json()
            .await
            .map_err(|e| ClientError::ParseError(format!("Failed to parse JSON response: {}", e)))
    }

    /// Handle an API response that returns no content (e.g., DELETE operations)
    async fn handle_empty_response(&self, response: reqwest::Response) -> Result<()> {
        let status = response.status();

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            tracing::debug!("Orchestrator answered {}: {}", status, error_text);
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = OrchestratorClient::new("http://localhost:8080");
        assert_eq!(client.base_url(), "http://localhost:8080");
        assert!(client.principal().is_none());
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = OrchestratorClient::new("http://localhost:8080/");
        assert_eq!(client.base_url(), "http://localhost:8080");
    }

    #[test]
    fn test_principal_header_is_attached() {
        let client = OrchestratorClient::new("http://localhost:8080").with_principal("alice");
        let request = client.request(Method::GET, "/health").build().unwrap();

        assert_eq!(request.url().as_str(), "http://localhost:8080/health");
        assert_eq!(request.headers()[PRINCIPAL_HEADER], "alice");
    }
}
