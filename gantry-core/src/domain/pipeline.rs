//! Pipeline domain types
//!
//! Pipelines are owned by the surrounding platform. The orchestrator reads
//! them to decide whether a trigger applies and only ever touches the
//! sequence counter from the store's create path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::execution::TriggerKind;

/// Pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub identifier: String,
    pub default_branch: String,
    /// Path of the build definition inside the repository.
    pub config_path: String,
    /// Last sequence number handed out to an execution of this pipeline.
    pub seq: i64,
    pub triggers: TriggerRules,
    /// Cancel older active executions on the same ref when a new push or
    /// pull request execution is created.
    pub cancel_superseded: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Which events a pipeline reacts to
///
/// An empty list means "no restriction".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriggerRules {
    pub events: Vec<TriggerKind>,
    /// Branch or tag patterns; a trailing `*` matches any suffix.
    pub branches: Vec<String>,
}

impl Pipeline {
    pub fn new(repo_id: Uuid, identifier: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            repo_id,
            identifier: identifier.into(),
            default_branch: "main".to_string(),
            config_path: ".gantry/pipeline.yaml".to_string(),
            seq: 0,
            triggers: TriggerRules::default(),
            cancel_superseded: false,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TriggerRules {
    pub fn allows_event(&self, kind: TriggerKind) -> bool {
        self.events.is_empty() || self.events.contains(&kind)
    }

    pub fn allows_branch(&self, branch: Option<&str>) -> bool {
        if self.branches.is_empty() {
            return true;
        }
        match branch {
            Some(branch) => self.branches.iter().any(|p| pattern_matches(p, branch)),
            None => false,
        }
    }
}

fn pattern_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}
