//! AlertSink trait for ephemeral, fire-and-forget UI alerts (toasts).
//!
//! Implementations:
//! - `RecordingAlertSink` - For testing
//! - `TracingAlertSink` (in notify-replay) - Logs alerts through tracing

use crate::config::AlertOptions;
use crate::record::{Category, NotificationRecord};

use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AlertError {
    #[error("Alert surface is not mounted")]
    NotMounted,
}

/// Icon shown next to an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Glyph {
    Info,
    Warning,
    Success,
    Error,
}

/// Glyph for a notification category. Never yields `Glyph::Error`.
pub fn icon_for(category: Category) -> Glyph {
    match category {
        Category::Alert => Glyph::Warning,
        Category::Success => Glyph::Success,
        Category::Info => Glyph::Info,
    }
}

/// A single ephemeral alert handed to an `AlertSink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub message: String,
    pub glyph: Glyph,
    /// How long the alert stays on screen before closing itself.
    pub auto_close: Duration,
    pub hide_progress_bar: bool,
}

impl Alert {
    pub fn new(message: impl Into<String>, glyph: Glyph, options: &AlertOptions) -> Self {
        Self {
            message: message.into(),
            glyph,
            auto_close: Duration::from_millis(options.auto_close_ms),
            hide_progress_bar: options.hide_progress_bar,
        }
    }

    /// The alert announcing a newly-arrived notification.
    pub fn for_record(record: &NotificationRecord, options: &AlertOptions) -> Self {
        Self::new(record.message.clone(), icon_for(record.category), options)
    }
}

/// Fire-and-forget alert channel.
///
/// The returned error is only ever logged; callers never retry or change
/// their bookkeeping because of it. Implementations must not call back into
/// the session that is showing the alert.
pub trait AlertSink: Send + Sync {
    fn show(&self, alert: Alert) -> Result<(), AlertError>;
}

/// Alert sink that keeps every alert it was asked to show. For testing.
#[derive(Default)]
pub struct RecordingAlertSink {
    alerts: Mutex<Vec<Alert>>,
    unmounted: AtomicBool,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `show` calls fail as if the UI were gone.
    pub fn set_unmounted(&self, unmounted: bool) {
        self.unmounted.store(unmounted, Ordering::Relaxed);
    }

    /// Alerts successfully shown so far, in order.
    pub fn alerts(&self) -> Vec<Alert> {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.alerts().into_iter().map(|a| a.message).collect()
    }

    pub fn clear(&self) {
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl AlertSink for RecordingAlertSink {
    fn show(&self, alert: Alert) -> Result<(), AlertError> {
        if self.unmounted.load(Ordering::Relaxed) {
            return Err(AlertError::NotMounted);
        }
        self.alerts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(alert);
        Ok(())
    }
}
