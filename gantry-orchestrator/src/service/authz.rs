//! Authorization
//!
//! Decides whether a principal may perform an action on a pipeline's
//! executions.

use anyhow::Context;
use async_trait::async_trait;
use gantry_core::domain::access::{Action, Principal, Resource};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use uuid::Uuid;

#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, principal: &Principal, resource: &Resource, action: Action) -> bool;
}

/// Allows every request. Development only.
pub struct AllowAllAuthorizer;

#[async_trait]
impl Authorizer for AllowAllAuthorizer {
    async fn authorize(&self, _principal: &Principal, _resource: &Resource, _action: Action) -> bool {
        true
    }
}

/// One entry of a principal's grants
///
/// A grant without `repo_id` applies to every repository.
#[derive(Debug, Clone, Deserialize)]
pub struct Grant {
    #[serde(default)]
    pub repo_id: Option<Uuid>,
    pub actions: Vec<Action>,
}

impl Grant {
    fn permits(&self, resource: &Resource, action: Action) -> bool {
        self.repo_id.is_none_or(|repo| repo == resource.repo_id) && self.actions.contains(&action)
    }
}

/// Static grants loaded from a JSON document
///
/// ```json
/// { "alice": [{ "repo_id": "…", "actions": ["view", "trigger"] }],
///   "scheduler": [{ "actions": ["trigger"] }] }
/// ```
#[derive(Debug, Default)]
pub struct PolicyAuthorizer {
    grants: HashMap<String, Vec<Grant>>,
}

impl PolicyAuthorizer {
    pub fn new(grants: HashMap<String, Vec<Grant>>) -> Self {
        Self { grants }
    }

    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let grants = serde_json::from_str(json).context("Invalid grants document")?;
        Ok(Self::new(grants))
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read grants file {}", path.display()))?;
        Self::from_json(&json)
    }
}

#[async_trait]
impl Authorizer for PolicyAuthorizer {
    async fn authorize(&self, principal: &Principal, resource: &Resource, action: Action) -> bool {
        let allowed = self
            .grants
            .get(principal.as_str())
            .is_some_and(|grants| grants.iter().any(|g| g.permits(resource, action)));

        if !allowed {
            tracing::debug!(
                "Denied {} for {} on pipeline {}",
                action,
                principal,
                resource.pipeline_id
            );
        }
        allowed
    }
}
