//! notify-core: Client-side synchronization of a real-time notification feed.
//!
//! This crate provides the core functionality for:
//! - Reconciling full feed snapshots against the ids a session has already seen
//! - Computing a per-user unread count from shared read receipts
//! - Dispatching exactly one ephemeral alert per newly-arrived unread notification
//! - NotificationFeed, ReadReceiptService and AlertSink trait abstractions

pub mod alert;
pub mod config;
pub mod engine;
pub mod events;
pub mod feed;
pub mod receipts;
pub mod record;
pub mod session;
pub mod store;

pub use alert::{Alert, AlertError, AlertSink, Glyph, RecordingAlertSink, icon_for};
pub use config::{AlertOptions, ConfigError, EngineConfig, FirstSnapshotPolicy};
pub use engine::{DispatchOutcome, MarkReadError, Reconciliation, SyncEngine};
pub use events::{EventBus, SessionEvent, Subscription};
pub use feed::{FeedError, FeedSubscription, NotificationFeed};
pub use receipts::{ReadReceiptService, ReceiptError};
pub use record::{Category, NotificationId, NotificationRecord, UserId};
pub use session::{Collaborators, MarkReadOutcome, NotificationSession, NotificationView};
pub use store::{InMemoryNotificationStore, StoreError};
