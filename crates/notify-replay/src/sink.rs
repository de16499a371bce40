//! Alert sink that writes alerts to the log instead of a toast container.

use notify_core::{Alert, AlertError, AlertSink, Glyph};
use serde::Serialize;
use std::sync::Mutex;
use tracing::info;

/// An alert as it appears in the replay summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShownAlert {
    pub message: String,
    pub glyph: Glyph,
}

#[derive(Default)]
pub struct TracingAlertSink {
    shown: Mutex<Vec<ShownAlert>>,
}

impl TracingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> Vec<ShownAlert> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl AlertSink for TracingAlertSink {
    fn show(&self, alert: Alert) -> Result<(), AlertError> {
        info!(
            glyph = ?alert.glyph,
            auto_close_ms = alert.auto_close.as_millis() as u64,
            "[alert] {}",
            alert.message
        );
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ShownAlert {
                message: alert.message,
                glyph: alert.glyph,
            });
        Ok(())
    }
}
