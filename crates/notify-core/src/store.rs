//! In-memory notification store implementing both `NotificationFeed` and
//! `ReadReceiptService`. Used by tests and the replay tool.
//!
//! Records are kept newest first. Every change re-delivers the full snapshot
//! to every subscriber; deliveries are serialized so subscribers observe
//! snapshots in the order the changes were made.

use crate::feed::{ErrorCallback, FeedError, FeedSubscription, NotificationFeed, SnapshotCallback};
use crate::receipts::{self, ReadReceiptService, ReceiptError};
use crate::record::{Category, NotificationId, NotificationRecord, UserId, now_millis};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Notification id already used: {0}")]
    DuplicateId(NotificationId),

    #[error("Notification not found: {0}")]
    NotFound(NotificationId),
}

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Clone)]
struct Subscriber {
    on_snapshot: SnapshotCallback,
    on_error: ErrorCallback,
}

#[derive(Default)]
struct StoreInner {
    records: RwLock<Vec<NotificationRecord>>,
    /// Every id ever inserted; ids are never reused, even after removal.
    issued_ids: RwLock<std::collections::HashSet<NotificationId>>,
    subscribers: RwLock<Vec<(usize, Subscriber)>>,
    next_subscriber: AtomicUsize,
    /// Held for the whole of a delivery so snapshots go out in change order.
    delivery: Mutex<()>,
}

impl StoreInner {
    fn unsubscribe(&self, id: usize) {
        self.subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .retain(|(i, _)| *i != id);
    }
}

/// Shared handle to an in-memory notification collection.
///
/// Clones refer to the same collection.
#[derive(Clone, Default)]
pub struct InMemoryNotificationStore {
    inner: Arc<StoreInner>,
}

impl InMemoryNotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `records`, as if loaded before anyone subscribed.
    pub fn with_records(records: impl IntoIterator<Item = NotificationRecord>) -> Result<Self> {
        let store = Self::new();
        for record in records {
            store.insert_quiet(record)?;
        }
        Ok(store)
    }

    /// Publish a new notification: fresh id, current time, nobody has read it.
    pub fn create_notification(
        &self,
        message: impl Into<String>,
        category: Category,
    ) -> Result<NotificationRecord> {
        let record = NotificationRecord::new(
            NotificationId::generate(),
            message,
            category,
            now_millis(),
        );
        self.insert(record.clone())?;
        Ok(record)
    }

    /// Insert a fully-specified record and notify subscribers.
    pub fn insert(&self, record: NotificationRecord) -> Result<()> {
        let id = record.id.clone();
        self.insert_quiet(record)?;
        info!("Published notification {}", id);
        self.publish();
        Ok(())
    }

    fn insert_quiet(&self, record: NotificationRecord) -> Result<()> {
        let mut issued = self.inner.issued_ids.write().unwrap_or_else(|e| e.into_inner());
        if !issued.insert(record.id.clone()) {
            return Err(StoreError::DuplicateId(record.id));
        }
        let mut records = self.inner.records.write().unwrap_or_else(|e| e.into_inner());
        // Newest first; a record sharing a timestamp goes ahead of older inserts.
        let pos = records.partition_point(|r| r.timestamp > record.timestamp);
        records.insert(pos, record);
        Ok(())
    }

    /// Delete a record and notify subscribers. Its id stays retired.
    pub fn remove(&self, id: &NotificationId) -> Result<NotificationRecord> {
        let removed = {
            let mut records = self.inner.records.write().unwrap_or_else(|e| e.into_inner());
            let pos = records
                .iter()
                .position(|r| &r.id == id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            records.remove(pos)
        };
        info!("Removed notification {}", id);
        self.publish();
        Ok(removed)
    }

    pub fn get(&self, id: &NotificationId) -> Option<NotificationRecord> {
        self.inner
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|r| &r.id == id)
            .cloned()
    }

    /// The current ordered collection.
    pub fn snapshot(&self) -> Vec<NotificationRecord> {
        self.inner
            .records
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.records.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    /// Terminate every subscription with `error`, as a revoked permission would.
    pub fn fail_subscribers(&self, error: FeedError) {
        let _delivery = self.inner.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let dropped: Vec<_> = self
            .inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();

        info!("Terminating {} subscription(s): {}", dropped.len(), error);
        for (_, subscriber) in dropped {
            (subscriber.on_error)(error.clone());
        }
    }

    /// Deliver the current snapshot to every subscriber.
    fn publish(&self) {
        let _delivery = self.inner.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let snapshot = self.snapshot();
        // Clone the list so callbacks run without the subscriber lock held.
        let subscribers: Vec<_> = self
            .inner
            .subscribers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        debug!(
            "publish: {} records to {} subscriber(s)",
            snapshot.len(),
            subscribers.len()
        );
        for subscriber in subscribers {
            (subscriber.on_snapshot)(snapshot.as_slice());
        }
    }
}

impl NotificationFeed for InMemoryNotificationStore {
    fn subscribe(&self, on_snapshot: SnapshotCallback, on_error: ErrorCallback) -> FeedSubscription {
        let _delivery = self.inner.delivery.lock().unwrap_or_else(|e| e.into_inner());
        let id = self.inner.next_subscriber.fetch_add(1, Ordering::Relaxed);
        self.inner
            .subscribers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((
                id,
                Subscriber {
                    on_snapshot: Arc::clone(&on_snapshot),
                    on_error,
                },
            ));

        // Initial delivery of the live collection.
        let snapshot = self.snapshot();
        on_snapshot(snapshot.as_slice());

        let store: Weak<StoreInner> = Arc::downgrade(&self.inner);
        FeedSubscription::new(move || {
            if let Some(store) = store.upgrade() {
                store.unsubscribe(id);
            }
        })
    }
}

#[async_trait]
impl ReadReceiptService for InMemoryNotificationStore {
    async fn union_read_by(&self, id: &NotificationId, user: &UserId) -> receipts::Result<()> {
        let changed = {
            let mut records = self.inner.records.write().unwrap_or_else(|e| e.into_inner());
            let record = records
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| ReceiptError::NotFound(id.clone()))?;
            record.mark_read_by(user.clone())
        };

        if changed {
            debug!("union_read_by: {} read by {}", id, user);
            self.publish();
        }
        Ok(())
    }
}
