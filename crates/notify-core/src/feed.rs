//! NotificationFeed trait: a subscribable source of full snapshots.
//!
//! A feed delivers the complete, currently-live collection (newest first)
//! once on subscribe and again after every change. It never sends deltas.
//!
//! Implementations:
//! - `InMemoryNotificationStore` - For testing and the replay tool

use crate::record::NotificationRecord;

use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FeedError {
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The store ended the subscription without a specific cause.
    #[error("Subscription closed by the store")]
    Closed,

    #[error("Feed transport error: {0}")]
    Transport(String),
}

/// Called with every snapshot, in delivery order.
pub type SnapshotCallback = Arc<dyn Fn(&[NotificationRecord]) + Send + Sync>;

/// Called once if the subscription fails or is terminated by the store.
pub type ErrorCallback = Arc<dyn Fn(FeedError) + Send + Sync>;

/// Subscribable feed of notification snapshots.
///
/// Callbacks must not mutate the feed they are subscribed to.
pub trait NotificationFeed: Send + Sync {
    fn subscribe(&self, on_snapshot: SnapshotCallback, on_error: ErrorCallback) -> FeedSubscription;
}

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Follows the disposer pattern: hold this value to keep receiving
/// snapshots, drop it (or call `unsubscribe`) to stop.
pub struct FeedSubscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl FeedSubscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for FeedSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedSubscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_subscription_cancels_once_on_drop() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        {
            let _sub = FeedSubscription::new(move || {
                count_clone.fetch_add(1, Ordering::Relaxed);
            });
            assert_eq!(count.load(Ordering::Relaxed), 0);
        }

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_explicit_unsubscribe() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);

        let sub = FeedSubscription::new(move || {
            count_clone.fetch_add(1, Ordering::Relaxed);
        });
        sub.unsubscribe();

        assert_eq!(count.load(Ordering::Relaxed), 1);
    }
}
