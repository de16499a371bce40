//! Drives a `NotificationSession` through a replay script.
//!
//! The store plays the hosted document database; the session stands in for
//! the header component that shows the badge and toasts.

use crate::script::{ReplayScript, ScriptStep};
use crate::sink::{ShownAlert, TracingAlertSink};

use notify_core::{
    Collaborators, EngineConfig, EventBus, InMemoryNotificationStore,
    NotificationSession, ReadReceiptService, SessionEvent, StoreError, UserId,
};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("Invalid initial records: {0}")]
    Initial(#[source] StoreError),

    #[error("Step {step} failed: {source}")]
    Step {
        step: usize,
        #[source]
        source: StoreError,
    },
}

/// What the session showed by the end of the script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub user: UserId,
    pub unread_count: usize,
    /// Records in the last reconciled snapshot.
    pub notifications: usize,
    /// Every alert shown, in order, including mark-read confirmations.
    pub alerts: Vec<ShownAlert>,
    pub mark_read_failures: usize,
    pub feed_failed: bool,
}

pub async fn run(
    script: ReplayScript,
    user: UserId,
    config: EngineConfig,
) -> Result<ReplaySummary, ReplayError> {
    let store =
        InMemoryNotificationStore::with_records(script.initial).map_err(ReplayError::Initial)?;
    let sink = Arc::new(TracingAlertSink::new());
    let events = Arc::new(EventBus::new());

    let feed_failed = Arc::new(AtomicBool::new(false));
    let _event_log = {
        let feed_failed = Arc::clone(&feed_failed);
        events.subscribe(move |event| {
            if let SessionEvent::FeedFailed { reason, .. } = &event {
                warn!("Feed failed: {}", reason);
                feed_failed.store(true, Ordering::Relaxed);
            }
            debug!("{:?}", event);
        })
    };

    let mut session = NotificationSession::open(
        user.clone(),
        config,
        Collaborators {
            feed: Arc::new(store.clone()),
            receipts: Arc::new(store.clone()),
            sink: sink.clone(),
        },
        Arc::clone(&events),
    );
    info!(
        "Session open for {}: {} unread of {}",
        user,
        session.unread_count(),
        store.len()
    );

    let mut mark_read_failures = 0;
    for (index, step) in script.steps.into_iter().enumerate() {
        let step_no = index + 1;
        debug!("Step {}: {:?}", step_no, step);

        match step {
            ScriptStep::Publish { message, category } => {
                store
                    .create_notification(message, category)
                    .map_err(|source| ReplayError::Step {
                        step: step_no,
                        source,
                    })?;
            }
            ScriptStep::Insert(record) => {
                store.insert(record).map_err(|source| ReplayError::Step {
                    step: step_no,
                    source,
                })?;
            }
            ScriptStep::MarkRead { id, user: reader } => match reader {
                // Someone else reading it only changes the shared record.
                Some(reader) if reader != user => {
                    if let Err(e) = store.union_read_by(&id, &reader).await {
                        warn!("Step {}: {}", step_no, e);
                        mark_read_failures += 1;
                    }
                }
                _ => {
                    if let Err(e) = session.mark_read(id).await {
                        warn!("Step {}: {}", step_no, e);
                        mark_read_failures += 1;
                    }
                }
            },
            ScriptStep::Remove { id } => {
                store.remove(&id).map_err(|source| ReplayError::Step {
                    step: step_no,
                    source,
                })?;
            }
            ScriptStep::Fail { kind, reason } => {
                store.fail_subscribers(kind.into_error(reason));
            }
        }

        debug!("Step {}: unread badge = {}", step_no, session.unread_count());
    }

    let summary = ReplaySummary {
        user,
        unread_count: session.unread_count(),
        notifications: session.notifications().len(),
        alerts: sink.shown(),
        mark_read_failures,
        feed_failed: feed_failed.load(Ordering::Relaxed),
    };
    session.close();

    Ok(summary)
}
