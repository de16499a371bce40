//! NotificationSession: the reactive pipeline around one `SyncEngine`.
//!
//! feed snapshot → `SyncEngine::reconcile` → {unread badge, alert dispatch}
//!
//! A session is opened for one viewing user and owns the engine for the
//! lifetime of its feed subscription. Closing (or dropping) the session
//! unsubscribes, forgets every known id, and guarantees the alert sink is not
//! called again for it. Switching users means opening a new session.
//!
//! Each snapshot callback runs to completion under the session lock, so
//! snapshots are reconciled one at a time, in delivery order. Events are
//! emitted after the lock is released. Alerts are shown with the lock held,
//! so an `AlertSink` must not call back into a session; debug builds panic
//! if one does.

use crate::alert::{Alert, AlertSink, Glyph};
use crate::config::EngineConfig;
use crate::engine::{MarkReadError, Reconciliation, SyncEngine};
use crate::events::{EventBus, SessionEvent, event_timestamp};
use crate::feed::{FeedError, FeedSubscription, NotificationFeed};
use crate::receipts::ReadReceiptService;
use crate::record::{NotificationId, NotificationRecord, UserId};

use std::cell::Cell;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tracing::{debug, info, warn};

const MARKED_AS_READ: &str = "Marked as read";
const MARK_READ_FAILED: &str = "Error marking notification";

thread_local! {
    static SHOWING_ALERT: Cell<bool> = const { Cell::new(false) };
}

/// Marks the current thread as inside `AlertSink::show` until dropped.
struct ShowingAlert;

impl ShowingAlert {
    fn enter() -> Self {
        SHOWING_ALERT.with(|flag| flag.set(true));
        Self
    }
}

impl Drop for ShowingAlert {
    fn drop(&mut self) {
        SHOWING_ALERT.with(|flag| flag.set(false));
    }
}

/// External collaborators a session talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub feed: Arc<dyn NotificationFeed>,
    pub receipts: Arc<dyn ReadReceiptService>,
    pub sink: Arc<dyn AlertSink>,
}

/// A notification as shown in the dropdown list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationView {
    pub record: NotificationRecord,
    /// Whether the session's user has read it.
    pub is_read: bool,
}

/// What became of a mark-read request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkReadOutcome {
    /// The receipt service accepted the union.
    Applied,
    /// The session closed while the request was in flight; its result was dropped.
    Discarded,
}

struct SessionState {
    engine: SyncEngine,
    unread_count: usize,
    last_snapshot: Vec<NotificationRecord>,
}

struct Shared {
    user: UserId,
    config: EngineConfig,
    sink: Arc<dyn AlertSink>,
    events: Arc<EventBus>,
    state: Mutex<SessionState>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SessionState> {
        debug_assert!(
            !SHOWING_ALERT.with(|flag| flag.get()),
            "AlertSink::show called back into a notification session"
        );
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_closed(&self) -> bool {
        self.lock().engine.is_closed()
    }

    fn on_snapshot(&self, snapshot: &[NotificationRecord]) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if state.engine.is_closed() {
                debug!("Snapshot for {} arrived after close, ignoring", self.user);
                return;
            }

            let Reconciliation {
                unread_count,
                newly_unread,
            } = state.engine.reconcile(snapshot);

            events.push(SessionEvent::SnapshotReconciled {
                user: self.user.clone(),
                records: snapshot.len(),
                newly_unread: newly_unread.len(),
                timestamp: event_timestamp(),
            });
            if let Some(event) = self.set_unread(&mut state, unread_count) {
                events.push(event);
            }
            state.last_snapshot = snapshot.to_vec();

            let outcomes = {
                let _showing = ShowingAlert::enter();
                state
                    .engine
                    .dispatch_alerts(&newly_unread, self.sink.as_ref(), &self.config.alert)
            };
            for outcome in outcomes {
                events.push(match outcome.result {
                    Ok(()) => SessionEvent::AlertDispatched {
                        id: outcome.id,
                        glyph: outcome.alert.glyph,
                        timestamp: event_timestamp(),
                    },
                    Err(e) => SessionEvent::AlertFailed {
                        id: outcome.id,
                        reason: e.to_string(),
                        timestamp: event_timestamp(),
                    },
                });
            }
        }
        self.events.emit_all(events);
    }

    fn on_error(&self, error: FeedError) {
        let mut events = Vec::new();
        {
            let mut state = self.lock();
            if state.engine.is_closed() {
                return;
            }

            let reset = state.engine.fail(&error);
            state.last_snapshot.clear();
            events.push(SessionEvent::FeedFailed {
                reason: error.to_string(),
                timestamp: event_timestamp(),
            });
            if let Some(event) = self.set_unread(&mut state, reset.unread_count) {
                events.push(event);
            }
        }
        self.events.emit_all(events);
    }

    fn set_unread(&self, state: &mut SessionState, unread_count: usize) -> Option<SessionEvent> {
        if state.unread_count == unread_count {
            return None;
        }
        state.unread_count = unread_count;
        Some(SessionEvent::UnreadCountChanged {
            user: self.user.clone(),
            unread_count,
            timestamp: event_timestamp(),
        })
    }

    /// Show a mark-read confirmation unless the session has closed meanwhile.
    fn confirm(&self, message: &str, glyph: Glyph) {
        if !self.config.confirm_mark_read {
            return;
        }
        let state = self.lock();
        if state.engine.is_closed() {
            return;
        }
        let _showing = ShowingAlert::enter();
        if let Err(e) = self.sink.show(Alert::new(message, glyph, &self.config.alert)) {
            warn!("Mark-read confirmation not shown: {}", e);
        }
    }
}

/// One user's live view of the notification feed.
pub struct NotificationSession {
    shared: Arc<Shared>,
    receipts: Arc<dyn ReadReceiptService>,
    subscription: Option<FeedSubscription>,
}

impl NotificationSession {
    /// Create a fresh engine for `user` and subscribe it to the feed.
    ///
    /// The feed's initial snapshot is reconciled before this returns if the
    /// feed delivers it synchronously.
    pub fn open(
        user: UserId,
        config: EngineConfig,
        collaborators: Collaborators,
        events: Arc<EventBus>,
    ) -> Self {
        info!(
            "Opening notification session for {} (first snapshot: {:?})",
            user, config.first_snapshot
        );

        let shared = Arc::new(Shared {
            user: user.clone(),
            state: Mutex::new(SessionState {
                engine: SyncEngine::new(user, config.first_snapshot),
                unread_count: 0,
                last_snapshot: Vec::new(),
            }),
            config,
            sink: collaborators.sink,
            events,
        });

        let on_snapshot = {
            let shared: Weak<Shared> = Arc::downgrade(&shared);
            Arc::new(move |snapshot: &[NotificationRecord]| {
                if let Some(shared) = shared.upgrade() {
                    shared.on_snapshot(snapshot);
                }
            })
        };
        let on_error = {
            let shared: Weak<Shared> = Arc::downgrade(&shared);
            Arc::new(move |error: FeedError| {
                if let Some(shared) = shared.upgrade() {
                    shared.on_error(error);
                }
            })
        };
        let subscription = collaborators.feed.subscribe(on_snapshot, on_error);

        Self {
            shared,
            receipts: collaborators.receipts,
            subscription: Some(subscription),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.shared.user
    }

    /// Current unread badge value.
    pub fn unread_count(&self) -> usize {
        self.shared.lock().unread_count
    }

    /// The last reconciled snapshot, for rendering the notification list.
    pub fn notifications(&self) -> Vec<NotificationView> {
        let state = self.shared.lock();
        state
            .last_snapshot
            .iter()
            .map(|record| NotificationView {
                is_read: record.is_read_by(&self.shared.user),
                record: record.clone(),
            })
            .collect()
    }

    pub fn is_known(&self, id: &NotificationId) -> bool {
        self.shared.lock().engine.is_known(id)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }

    /// Mark `id` read for this session's user.
    ///
    /// The returned future owns everything it needs, so it may be spawned and
    /// outlive the session. If the session closes before the request
    /// completes, the request still runs but its result is discarded. The
    /// badge only changes once the feed re-delivers the record.
    pub fn mark_read(
        &self,
        id: NotificationId,
    ) -> impl Future<Output = Result<MarkReadOutcome, MarkReadError>> + Send + use<> {
        let shared = Arc::clone(&self.shared);
        let receipts = Arc::clone(&self.receipts);

        async move {
            let result = SyncEngine::request_mark_read(receipts.as_ref(), &id, &shared.user).await;

            if shared.is_closed() {
                debug!("Mark-read for {} finished after close, discarding", id);
                return Ok(MarkReadOutcome::Discarded);
            }

            match result {
                Ok(()) => {
                    shared.confirm(MARKED_AS_READ, Glyph::Success);
                    shared.events.emit(SessionEvent::MarkReadSucceeded {
                        id,
                        user: shared.user.clone(),
                        timestamp: event_timestamp(),
                    });
                    Ok(MarkReadOutcome::Applied)
                }
                Err(e) => {
                    warn!("{}", e);
                    shared.confirm(MARK_READ_FAILED, Glyph::Error);
                    shared.events.emit(SessionEvent::MarkReadFailed {
                        id,
                        user: shared.user.clone(),
                        reason: e.source.to_string(),
                        timestamp: event_timestamp(),
                    });
                    Err(e)
                }
            }
        }
    }

    /// Tear the session down. Idempotent.
    pub fn close(&mut self) {
        let Some(subscription) = self.subscription.take() else {
            return;
        };
        // Unsubscribe before locking so an in-progress delivery can finish.
        subscription.unsubscribe();

        {
            let mut state = self.shared.lock();
            state.engine.close();
            state.unread_count = 0;
            state.last_snapshot.clear();
        }

        info!("Closed notification session for {}", self.shared.user);
        self.shared.events.emit(SessionEvent::SessionClosed {
            user: self.shared.user.clone(),
            timestamp: event_timestamp(),
        });
    }
}

impl Drop for NotificationSession {
    fn drop(&mut self) {
        self.close();
    }
}
