//! Replay script format.
//!
//! ```json
//! {
//!   "initial": [{"id": "n1", "message": "Welcome", "timestamp": 1}],
//!   "steps": [
//!     {"publish": {"message": "Leave approved", "category": "success"}},
//!     {"markRead": {"id": "n1"}},
//!     {"remove": {"id": "n1"}},
//!     {"fail": {"kind": "transport", "reason": "connection reset"}}
//!   ]
//! }
//! ```

use notify_core::{Category, FeedError, NotificationId, NotificationRecord, UserId};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Failed to read script {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid script: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Records present before the session subscribes, then the changes to apply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayScript {
    #[serde(default)]
    pub initial: Vec<NotificationRecord>,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScriptStep {
    /// Create a notification with a fresh id and the current time.
    Publish {
        message: String,
        #[serde(default)]
        category: Category,
    },
    /// Insert a fully-specified record.
    Insert(NotificationRecord),
    /// Mark a record read, by the session user unless `user` says otherwise.
    MarkRead {
        id: NotificationId,
        #[serde(default)]
        user: Option<UserId>,
    },
    Remove { id: NotificationId },
    /// Terminate the feed subscription.
    Fail {
        #[serde(default)]
        kind: FailureKind,
        #[serde(default)]
        reason: String,
    },
}

/// How the store ends a subscription in a `fail` step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    #[default]
    PermissionDenied,
    Closed,
    Transport,
}

impl FailureKind {
    pub fn into_error(self, reason: String) -> FeedError {
        match self {
            Self::PermissionDenied => FeedError::PermissionDenied(reason),
            Self::Closed => FeedError::Closed,
            Self::Transport => FeedError::Transport(reason),
        }
    }
}

impl ReplayScript {
    pub fn from_json_str(json: &str) -> Result<Self, ScriptError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let content = std::fs::read_to_string(path).map_err(|source| ScriptError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_all_step_kinds() {
        let script = ReplayScript::from_json_str(
            r#"{
                "initial": [{"id": "n1", "message": "Welcome"}],
                "steps": [
                    {"publish": {"message": "Leave approved", "category": "success"}},
                    {"insert": {"id": "n2", "message": "Stock low", "type": "alert", "timestamp": 5}},
                    {"markRead": {"id": "n1"}},
                    {"markRead": {"id": "n2", "user": "admin@officehub.io"}},
                    {"remove": {"id": "n1"}},
                    {"fail": {"reason": "permission revoked"}},
                    {"fail": {"kind": "closed"}}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(script.initial.len(), 1);
        assert_eq!(script.steps.len(), 7);
        assert_eq!(
            script.steps[0],
            ScriptStep::Publish {
                message: "Leave approved".into(),
                category: Category::Success,
            }
        );
        assert!(matches!(&script.steps[1], ScriptStep::Insert(r) if r.category == Category::Alert));
        assert_eq!(
            script.steps[2],
            ScriptStep::MarkRead {
                id: NotificationId::from("n1"),
                user: None,
            }
        );
        assert_eq!(
            script.steps[5],
            ScriptStep::Fail {
                kind: FailureKind::PermissionDenied,
                reason: "permission revoked".into(),
            }
        );
        assert_eq!(
            script.steps[6],
            ScriptStep::Fail {
                kind: FailureKind::Closed,
                reason: String::new(),
            }
        );
    }

    #[test]
    fn test_failure_kind_maps_to_feed_error() {
        assert_eq!(
            FailureKind::Transport.into_error("reset".into()),
            FeedError::Transport("reset".into())
        );
        assert_eq!(FailureKind::Closed.into_error("ignored".into()), FeedError::Closed);
        assert_eq!(
            FailureKind::default().into_error("revoked".into()),
            FeedError::PermissionDenied("revoked".into())
        );
    }

    #[test]
    fn test_empty_script() {
        let script = ReplayScript::from_json_str("{}").unwrap();
        assert_eq!(script, ReplayScript::default());
    }

    #[test]
    fn test_unknown_step_is_rejected() {
        let err = ReplayScript::from_json_str(r#"{"steps": [{"explode": {}}]}"#).unwrap_err();
        assert!(err.to_string().starts_with("Invalid script"));
    }
}
