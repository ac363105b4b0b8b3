//! Configuration module
//!
//! Handles CLI configuration: where the orchestrator is and who is calling.

use gantry_client::OrchestratorClient;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// URL of the orchestrator service
    pub orchestrator_url: String,
    /// Identity sent with every request
    pub principal: Option<String>,
}

impl Config {
    pub fn client(&self) -> OrchestratorClient {
        let client = OrchestratorClient::new(&self.orchestrator_url);
        match &self.principal {
            Some(principal) => client.with_principal(principal),
            None => client,
        }
    }
}
