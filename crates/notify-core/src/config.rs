//! Engine configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid engine config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// What to do with unread records present in the very first snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FirstSnapshotPolicy {
    /// Alert on every unread record already in the store at subscribe time.
    #[default]
    AlertBacklog,
    /// Treat the first snapshot as already known; alert only on later arrivals.
    SeedSilently,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub first_snapshot: FirstSnapshotPolicy,

    #[serde(default)]
    pub alert: AlertOptions,

    /// Show "Marked as read" / "Error marking notification" alerts after a
    /// mark-read request completes.
    #[serde(default = "default_true")]
    pub confirm_mark_read: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            first_snapshot: FirstSnapshotPolicy::default(),
            alert: AlertOptions::default(),
            confirm_mark_read: default_true(),
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn with_first_snapshot(mut self, policy: FirstSnapshotPolicy) -> Self {
        self.first_snapshot = policy;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertOptions {
    /// Milliseconds before an alert closes itself (default: 5 seconds)
    #[serde(default = "default_auto_close_ms")]
    pub auto_close_ms: u64,

    #[serde(default = "default_true")]
    pub hide_progress_bar: bool,
}

impl Default for AlertOptions {
    fn default() -> Self {
        Self {
            auto_close_ms: default_auto_close_ms(),
            hide_progress_bar: default_true(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_auto_close_ms() -> u64 {
    5000
}
