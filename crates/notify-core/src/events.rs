//! Event infrastructure for notify-core.
//!
//! Provides `SessionEvent` for monitoring a notification session and
//! `EventBus` for subscriptions. Feed failures and mark-read outcomes are
//! surfaced here rather than returned from the snapshot callback.

use crate::alert::Glyph;
use crate::record::{NotificationId, UserId, now_millis};

use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

/// Events emitted by a `NotificationSession`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A snapshot was reconciled against the known ids.
    SnapshotReconciled {
        user: UserId,
        /// Number of records in the snapshot.
        records: usize,
        /// Number of records that were new and unread.
        #[serde(rename = "newlyUnread")]
        newly_unread: usize,
        /// When the snapshot was reconciled, in milliseconds since Unix epoch.
        timestamp: f64,
    },
    /// The unread badge value changed.
    UnreadCountChanged {
        user: UserId,
        #[serde(rename = "unreadCount")]
        unread_count: usize,
        timestamp: f64,
    },
    /// An alert for a newly-arrived notification was shown.
    AlertDispatched {
        id: NotificationId,
        glyph: Glyph,
        timestamp: f64,
    },
    /// The alert sink refused an alert. The notification stays known.
    AlertFailed {
        id: NotificationId,
        reason: String,
        timestamp: f64,
    },
    /// The feed subscription failed or was terminated. No retry happens.
    FeedFailed { reason: String, timestamp: f64 },
    MarkReadSucceeded {
        id: NotificationId,
        user: UserId,
        timestamp: f64,
    },
    MarkReadFailed {
        id: NotificationId,
        user: UserId,
        reason: String,
        timestamp: f64,
    },
    /// The session was torn down; no further events follow for it.
    SessionClosed { user: UserId, timestamp: f64 },
}

/// Current time as an event timestamp.
pub(crate) fn event_timestamp() -> f64 {
    now_millis() as f64
}

/// Subscription handle that unsubscribes automatically when dropped.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus for publishing session events to subscribers.
///
/// Wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Arc<dyn Fn(SessionEvent) + Send + Sync>)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to events. Returns `Subscription` that unsubscribes on drop.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(SessionEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    fn unsubscribe(&self, id: usize) {
        // try_write: Drop may run during unwinding while emit holds a read lock.
        if let Ok(mut guard) = self.callbacks.try_write() {
            guard.retain(|(i, _)| *i != id);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Emit an event to all subscribers.
    pub fn emit(&self, event: SessionEvent) {
        // Clone the list so a callback may subscribe without deadlocking.
        let callbacks: Vec<_> = self
            .callbacks
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();

        for callback in callbacks {
            callback(event.clone());
        }
    }

    /// Emit several events in order.
    pub fn emit_all(&self, events: impl IntoIterator<Item = SessionEvent>) {
        for event in events {
            self.emit(event);
        }
    }
}
