//! Commit metadata resolved from the source-control provider

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::execution::EventMetadata;

/// Descriptive metadata for a single commit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub sha: String,
    pub title: String,
    pub message: String,
    pub author: CommitAuthor,
    pub link: String,
    pub timestamp: Option<DateTime<Utc>>,
    /// Absent when the provider could not compute a diff.
    pub stats: Option<DiffStats>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitAuthor {
    pub login: String,
    pub name: String,
    pub email: String,
    pub avatar: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStats {
    pub files_changed: u32,
    pub additions: u32,
    pub deletions: u32,
}

impl CommitInfo {
    /// Overlay provider data on event metadata.
    ///
    /// Non-empty provider fields win; empty ones keep whatever the event
    /// payload carried. A timestamp already set by the event (the scheduled
    /// time of a cron run) is kept.
    pub fn apply_to(&self, event: &mut EventMetadata) {
        fn overlay(slot: &mut String, value: &str) {
            if !value.is_empty() {
                *slot = value.to_string();
            }
        }

        overlay(&mut event.after, &self.sha);
        overlay(&mut event.title, &self.title);
        overlay(&mut event.message, &self.message);
        overlay(&mut event.link, &self.link);
        overlay(&mut event.author_login, &self.author.login);
        overlay(&mut event.author_name, &self.author.name);
        overlay(&mut event.author_email, &self.author.email);
        overlay(&mut event.author_avatar, &self.author.avatar);
        if event.timestamp.is_none() {
            event.timestamp = self.timestamp;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_keeps_event_fields_when_provider_is_partial() {
        let mut event = EventMetadata {
            title: "from webhook".to_string(),
            sender: "bob".to_string(),
            ..Default::default()
        };
        let info = CommitInfo {
            sha: "abc123".to_string(),
            author: CommitAuthor {
                name: "Alice".to_string(),
                ..Default::default()
            },
            ..Default::default()
        };

        info.apply_to(&mut event);

        assert_eq!(event.after, "abc123");
        assert_eq!(event.title, "from webhook");
        assert_eq!(event.author_name, "Alice");
        assert_eq!(event.sender, "bob");
        assert!(event.timestamp.is_none());
    }

    #[test]
    fn test_apply_keeps_event_timestamp() {
        let scheduled = Utc::now();
        let committed = scheduled - chrono::Duration::hours(3);
        let info = CommitInfo {
            timestamp: Some(committed),
            ..Default::default()
        };

        let mut cron = EventMetadata {
            timestamp: Some(scheduled),
            ..Default::default()
        };
        info.apply_to(&mut cron);
        assert_eq!(cron.timestamp, Some(scheduled));

        let mut push = EventMetadata::default();
        info.apply_to(&mut push);
        assert_eq!(push.timestamp, Some(committed));
    }
}
