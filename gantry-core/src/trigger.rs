//! Trigger events
//!
//! A [`Hook`] wraps one [`TriggerEvent`] variant together with the routing
//! information the orchestrator needs. Each variant knows how to validate
//! itself, what the trigger policy should look at, which commit to resolve,
//! and how to fill in an execution's metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::domain::execution::{Execution, TriggerKind, UnknownVariant};

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";

/// An inbound trigger addressed to one pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub repo_id: Uuid,
    pub pipeline_id: Uuid,
    /// Who the execution is created on behalf of.
    pub principal: String,
    /// Provider delivery id for webhooks, tick id for the scheduler.
    #[serde(default)]
    pub delivery_id: Option<String>,
    pub event: TriggerEvent,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerEvent {
    Push(PushEvent),
    PullRequest(PullRequestEvent),
    Cron(CronEvent),
    Manual(ManualEvent),
    Promote(PromoteEvent),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushEvent {
    pub git_ref: String,
    #[serde(default)]
    pub before: String,
    pub after: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequestEvent {
    pub number: i64,
    #[serde(default)]
    pub action: String,
    pub source: String,
    pub target: String,
    pub after: String,
    #[serde(default)]
    pub fork: bool,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronEvent {
    pub name: String,
    pub branch: String,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualEvent {
    /// Branch name or full ref.
    pub git_ref: String,
    #[serde(default)]
    pub sha: Option<String>,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromoteEvent {
    pub parent: i64,
    pub target: String,
    pub git_ref: String,
    pub after: String,
    #[serde(default)]
    pub deploy_id: Option<Uuid>,
    #[serde(default)]
    pub params: HashMap<String, String>,
}

/// What the trigger policy evaluates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterSubject {
    pub kind: TriggerKind,
    /// Short branch name, or the full ref for tags.
    pub branch: Option<String>,
}

/// The event payload is malformed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid trigger event: {0}")]
pub struct InvalidEvent(pub String);

/// How "the same trigger event" is recognised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyKeyMode {
    /// The provider's delivery id; events without one are never deduplicated.
    #[default]
    Delivery,
    /// Event kind plus the commit it targets.
    Commit,
    None,
}

impl FromStr for IdempotencyKeyMode {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "delivery" => Ok(IdempotencyKeyMode::Delivery),
            "commit" => Ok(IdempotencyKeyMode::Commit),
            "none" => Ok(IdempotencyKeyMode::None),
            other => Err(UnknownVariant(other.to_string())),
        }
    }
}

impl fmt::Display for IdempotencyKeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IdempotencyKeyMode::Delivery => "delivery",
            IdempotencyKeyMode::Commit => "commit",
            IdempotencyKeyMode::None => "none",
        };
        f.write_str(name)
    }
}

impl Hook {
    /// Key identifying this event for duplicate detection, if any.
    pub fn idempotency_key(&self, mode: IdempotencyKeyMode) -> Option<String> {
        match mode {
            IdempotencyKeyMode::Delivery => self
                .delivery_id
                .as_deref()
                .filter(|id| !id.is_empty())
                .map(|id| format!("delivery:{id}")),
            IdempotencyKeyMode::Commit => self.event.commit_key(),
            IdempotencyKeyMode::None => None,
        }
    }
}

impl TriggerEvent {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerEvent::Push(_) => TriggerKind::Push,
            TriggerEvent::PullRequest(_) => TriggerKind::PullRequest,
            TriggerEvent::Cron(_) => TriggerKind::Cron,
            TriggerEvent::Manual(_) => TriggerKind::Manual,
            TriggerEvent::Promote(_) => TriggerKind::Promote,
        }
    }

    pub fn validate(&self) -> Result<(), InvalidEvent> {
        match self {
            TriggerEvent::Push(push) => {
                require("git_ref", &push.git_ref)?;
                require("after", &push.after)?;
                if !push.git_ref.starts_with("refs/") {
                    return Err(InvalidEvent(format!(
                        "push ref '{}' is not fully qualified",
                        push.git_ref
                    )));
                }
                if push.after == ZERO_SHA {
                    return Err(InvalidEvent(format!(
                        "push deletes '{}' and cannot be built",
                        push.git_ref
                    )));
                }
            }
            TriggerEvent::PullRequest(pr) => {
                if pr.number <= 0 {
                    return Err(InvalidEvent(format!(
                        "pull request number must be positive, got {}",
                        pr.number
                    )));
                }
                require("source", &pr.source)?;
                require("target", &pr.target)?;
                require("after", &pr.after)?;
            }
            TriggerEvent::Cron(cron) => {
                require("name", &cron.name)?;
                require("branch", &cron.branch)?;
            }
            TriggerEvent::Manual(manual) => {
                require("git_ref", &manual.git_ref)?;
                validate_params(&manual.params)?;
            }
            TriggerEvent::Promote(promote) => {
                if promote.parent <= 0 {
                    return Err(InvalidEvent(format!(
                        "promotion parent must be positive, got {}",
                        promote.parent
                    )));
                }
                require("target", &promote.target)?;
                require("after", &promote.after)?;
                validate_params(&promote.params)?;
            }
        }
        Ok(())
    }

    pub fn filter_subject(&self) -> FilterSubject {
        let branch = match self {
            TriggerEvent::Push(push) => Some(short_ref(&push.git_ref)),
            TriggerEvent::PullRequest(pr) => Some(pr.target.clone()),
            TriggerEvent::Cron(cron) => Some(cron.branch.clone()),
            TriggerEvent::Manual(manual) => Some(short_ref(&manual.git_ref)),
            TriggerEvent::Promote(promote) => Some(short_ref(&promote.git_ref)),
        };
        FilterSubject {
            kind: self.kind(),
            branch: branch.filter(|b| !b.is_empty()),
        }
    }

    /// The ref or sha to resolve against the provider.
    pub fn commit_ref(&self) -> Option<&str> {
        let reference = match self {
            TriggerEvent::Push(push) => push.after.as_str(),
            TriggerEvent::PullRequest(pr) => pr.after.as_str(),
            TriggerEvent::Cron(cron) => cron.branch.as_str(),
            TriggerEvent::Manual(manual) => manual.sha.as_deref().unwrap_or(&manual.git_ref),
            TriggerEvent::Promote(promote) => promote.after.as_str(),
        };
        Some(reference).filter(|r| !r.is_empty())
    }

    /// Whether an execution cannot be built without provider metadata.
    pub fn requires_metadata(&self) -> bool {
        matches!(self, TriggerEvent::Push(_))
    }

    /// Fill the event-specific fields of a pending execution.
    pub fn populate(&self, exec: &mut Execution) {
        let event = &mut exec.event;
        match self {
            TriggerEvent::Push(push) => {
                let branch = short_ref(&push.git_ref);
                event.git_ref = push.git_ref.clone();
                event.before = push.before.clone();
                event.after = push.after.clone();
                event.source = branch.clone();
                event.target = branch;
                event.sender = push.sender.clone();
                event.link = push.link.clone();
            }
            TriggerEvent::PullRequest(pr) => {
                event.action = pr.action.clone();
                event.git_ref = format!("refs/pullreq/{}/head", pr.number);
                event.after = pr.after.clone();
                event.source = pr.source.clone();
                event.target = pr.target.clone();
                event.fork = pr.fork;
                event.title = pr.title.clone();
                event.sender = pr.sender.clone();
                event.link = pr.link.clone();
            }
            TriggerEvent::Cron(cron) => {
                event.git_ref = full_ref(&cron.branch);
                event.source = cron.branch.clone();
                event.target = cron.branch.clone();
                event.timestamp = Some(cron.scheduled_at);
                exec.cron = Some(cron.name.clone());
            }
            TriggerEvent::Manual(manual) => {
                let reference = full_ref(&manual.git_ref);
                let branch = short_ref(&reference);
                event.git_ref = reference;
                event.after = manual.sha.clone().unwrap_or_default();
                event.source = branch.clone();
                event.target = branch;
                event.sender = exec.created_by.clone();
                exec.params = manual.params.clone();
                exec.debug = manual.debug;
            }
            TriggerEvent::Promote(promote) => {
                let reference = full_ref(&promote.git_ref);
                event.target = short_ref(&reference);
                event.git_ref = reference;
                event.after = promote.after.clone();
                event.sender = exec.created_by.clone();
                exec.parent = Some(promote.parent);
                exec.deploy = Some(promote.target.clone());
                exec.deploy_id = promote.deploy_id;
                exec.params = promote.params.clone();
            }
        }
    }

    fn commit_key(&self) -> Option<String> {
        match self {
            TriggerEvent::Push(push) => Some(format!("push:{}:{}", push.git_ref, push.after)),
            TriggerEvent::PullRequest(pr) => {
                Some(format!("pull_request:{}:{}", pr.number, pr.after))
            }
            TriggerEvent::Cron(cron) => Some(format!(
                "cron:{}:{}",
                cron.name,
                cron.scheduled_at.timestamp()
            )),
            TriggerEvent::Manual(_) | TriggerEvent::Promote(_) => None,
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), InvalidEvent> {
    if value.trim().is_empty() {
        return Err(InvalidEvent(format!("{field} is required")));
    }
    Ok(())
}

fn validate_params(params: &HashMap<String, String>) -> Result<(), InvalidEvent> {
    if params.keys().any(|k| k.trim().is_empty()) {
        return Err(InvalidEvent("parameter names cannot be empty".to_string()));
    }
    Ok(())
}

/// `refs/heads/main` -> `main`; tags keep their full ref.
fn short_ref(reference: &str) -> String {
    reference
        .strip_prefix("refs/heads/")
        .unwrap_or(reference)
        .to_string()
}

fn full_ref(branch_or_ref: &str) -> String {
    if branch_or_ref.starts_with("refs/") {
        branch_or_ref.to_string()
    } else {
        format!("refs/heads/{branch_or_ref}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push(after: &str) -> TriggerEvent {
        TriggerEvent::Push(PushEvent {
            git_ref: "refs/heads/main".to_string(),
            before: "1111".to_string(),
            after: after.to_string(),
            sender: "octo".to_string(),
            link: String::new(),
        })
    }

    fn hook(event: TriggerEvent, delivery: Option<&str>) -> Hook {
        Hook {
            repo_id: Uuid::new_v4(),
            pipeline_id: Uuid::new_v4(),
            principal: "octo".to_string(),
            delivery_id: delivery.map(str::to_string),
            event,
        }
    }

    #[test]
    fn test_push_validation() {
        assert!(push("abc").validate().is_ok());
        assert!(push("").validate().is_err());
        assert!(push(ZERO_SHA).validate().is_err());

        let unqualified = TriggerEvent::Push(PushEvent {
            git_ref: "main".to_string(),
            before: String::new(),
            after: "abc".to_string(),
            sender: String::new(),
            link: String::new(),
        });
        assert!(unqualified.validate().is_err());
    }

    #[test]
    fn test_filter_subject_uses_target_branch_for_pull_requests() {
        let pr = TriggerEvent::PullRequest(PullRequestEvent {
            number: 7,
            action: "opened".to_string(),
            source: "feature".to_string(),
            target: "main".to_string(),
            after: "abc".to_string(),
            fork: true,
            title: "Add feature".to_string(),
            sender: "octo".to_string(),
            link: String::new(),
        });
        assert_eq!(
            pr.filter_subject(),
            FilterSubject {
                kind: TriggerKind::PullRequest,
                branch: Some("main".to_string())
            }
        );
        assert_eq!(push("abc").filter_subject().branch.as_deref(), Some("main"));
    }

    #[test]
    fn test_manual_populates_params_and_ref() {
        let mut params = HashMap::new();
        params.insert("TARGET".to_string(), "staging".to_string());
        let event = TriggerEvent::Manual(ManualEvent {
            git_ref: "develop".to_string(),
            sha: None,
            params: params.clone(),
            debug: true,
        });
        let mut exec = Execution::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            TriggerKind::Manual,
            Utc::now(),
        );

        event.populate(&mut exec);

        assert_eq!(exec.event.git_ref, "refs/heads/develop");
        assert_eq!(exec.event.target, "develop");
        assert_eq!(exec.event.sender, "alice");
        assert_eq!(exec.params, params);
        assert!(exec.debug);
        assert_eq!(event.commit_ref(), Some("develop"));
        assert!(!event.requires_metadata());
    }

    #[test]
    fn test_promote_records_parent_and_target() {
        let event = TriggerEvent::Promote(PromoteEvent {
            parent: 3,
            target: "production".to_string(),
            git_ref: "refs/heads/main".to_string(),
            after: "abc".to_string(),
            deploy_id: None,
            params: HashMap::new(),
        });
        let mut exec = Execution::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "alice",
            TriggerKind::Promote,
            Utc::now(),
        );
        event.populate(&mut exec);
        assert_eq!(exec.parent, Some(3));
        assert_eq!(exec.deploy.as_deref(), Some("production"));
        assert_eq!(exec.event.after, "abc");
    }

    #[test]
    fn test_idempotency_keys() {
        let delivered = hook(push("abc"), Some("d-1"));
        assert_eq!(
            delivered.idempotency_key(IdempotencyKeyMode::Delivery),
            Some("delivery:d-1".to_string())
        );
        assert_eq!(
            delivered.idempotency_key(IdempotencyKeyMode::Commit),
            Some("push:refs/heads/main:abc".to_string())
        );
        assert_eq!(delivered.idempotency_key(IdempotencyKeyMode::None), None);

        let anonymous = hook(push("abc"), None);
        assert_eq!(anonymous.idempotency_key(IdempotencyKeyMode::Delivery), None);

        let manual = hook(
            TriggerEvent::Manual(ManualEvent {
                git_ref: "main".to_string(),
                sha: None,
                params: HashMap::new(),
                debug: false,
            }),
            None,
        );
        assert_eq!(manual.idempotency_key(IdempotencyKeyMode::Commit), None);
    }

    #[test]
    fn test_hook_deserializes_tagged_event() {
        let json = serde_json::json!({
            "repo_id": Uuid::nil(),
            "pipeline_id": Uuid::nil(),
            "principal": "scheduler",
            "event": {
                "kind": "cron",
                "name": "nightly",
                "branch": "main",
                "scheduled_at": "2024-01-01T00:00:00Z"
            }
        });
        let hook: Hook = serde_json::from_value(json).unwrap();
        assert_eq!(hook.event.kind(), TriggerKind::Cron);
        assert!(hook.delivery_id.is_none());
        assert_eq!(hook.event.commit_ref(), Some("main"));
    }

    #[test]
    fn test_dedupe_mode_parsing() {
        assert_eq!("commit".parse(), Ok(IdempotencyKeyMode::Commit));
        assert!("sometimes".parse::<IdempotencyKeyMode>().is_err());
    }
}
