//! SyncEngine: reconciles full feed snapshots against what this session has seen.
//!
//! The feed re-delivers the whole collection on every change, so "new" can
//! not be read off queue position. Instead the engine keeps the set of ids it
//! has observed and reconciles every snapshot as follows:
//!
//! 1. `newly_unread` = records (in snapshot order) whose id was not known
//!    before this snapshot and which the current user has not read
//! 2. `unread_count` = all unread records in the snapshot, recomputed from
//!    scratch each time
//! 3. every id in the snapshot becomes known
//!
//! Reconciling the same snapshot twice therefore alerts at most once.
//!
//! The engine never writes read state itself. `request_mark_read` forwards to
//! the `ReadReceiptService` and the effect shows up in a later snapshot.

use crate::alert::{Alert, AlertError, AlertSink};
use crate::config::{AlertOptions, FirstSnapshotPolicy};
use crate::feed::FeedError;
use crate::receipts::{ReadReceiptService, ReceiptError};
use crate::record::{NotificationId, NotificationRecord, UserId, unread_count};

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Failed to mark {id} as read for {user}: {source}")]
pub struct MarkReadError {
    pub id: NotificationId,
    pub user: UserId,
    #[source]
    pub source: ReceiptError,
}

/// Result of reconciling one snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub unread_count: usize,
    /// Records seen for the first time and still unread, in snapshot order.
    pub newly_unread: Vec<NotificationRecord>,
}

/// Outcome of showing one alert. Failures are reported, never retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchOutcome {
    pub id: NotificationId,
    pub alert: Alert,
    pub result: Result<(), AlertError>,
}

/// Per-subscription reconciliation cache.
///
/// Created when a session subscribes and discarded when it closes. It owns
/// the known ids exclusively; everything else sees only `reconcile` results.
#[derive(Debug)]
pub struct SyncEngine {
    current_user: UserId,
    known_ids: HashSet<NotificationId>,
    first_snapshot: FirstSnapshotPolicy,
    reconciled_any: bool,
    closed: bool,
}

impl SyncEngine {
    pub fn new(current_user: UserId, first_snapshot: FirstSnapshotPolicy) -> Self {
        Self {
            current_user,
            known_ids: HashSet::new(),
            first_snapshot,
            reconciled_any: false,
            closed: false,
        }
    }

    pub fn current_user(&self) -> &UserId {
        &self.current_user
    }

    pub fn is_known(&self, id: &NotificationId) -> bool {
        self.known_ids.contains(id)
    }

    pub fn known_count(&self) -> usize {
        self.known_ids.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reconcile a full snapshot.
    ///
    /// Total over its input: every record is processed, whatever its fields
    /// hold. A closed engine returns an empty result and learns nothing.
    pub fn reconcile(&mut self, snapshot: &[NotificationRecord]) -> Reconciliation {
        if self.closed {
            debug!("reconcile: engine closed, ignoring {} records", snapshot.len());
            return Reconciliation::default();
        }

        let unread_count = unread_count(snapshot, &self.current_user);
        let seeding =
            !self.reconciled_any && self.first_snapshot == FirstSnapshotPolicy::SeedSilently;

        let mut newly_unread = Vec::new();
        for record in snapshot {
            // insert() doubles as the membership test against the prior known set;
            // a duplicated id inside one snapshot can only count as new once.
            let first_sighting = self.known_ids.insert(record.id.clone());
            if first_sighting && !seeding && !record.is_read_by(&self.current_user) {
                newly_unread.push(record.clone());
            }
        }
        self.reconciled_any = true;

        debug!(
            "reconcile: {} records, {} unread, {} newly unread{}",
            snapshot.len(),
            unread_count,
            newly_unread.len(),
            if seeding { " (seeded)" } else { "" }
        );

        Reconciliation {
            unread_count,
            newly_unread,
        }
    }

    /// The feed failed or terminated. Reports an empty, zero-count result.
    ///
    /// Known ids are kept so that a transport reconnecting under the same
    /// session does not re-alert on records already shown.
    pub fn fail(&mut self, error: &FeedError) -> Reconciliation {
        warn!("Notification feed failed for {}: {}", self.current_user, error);
        Reconciliation::default()
    }

    /// Show one alert per record, in order. Sink failures are swallowed.
    pub fn dispatch_alerts(
        &self,
        newly_unread: &[NotificationRecord],
        sink: &dyn AlertSink,
        options: &AlertOptions,
    ) -> Vec<DispatchOutcome> {
        if self.closed {
            return Vec::new();
        }

        newly_unread
            .iter()
            .map(|record| {
                let alert = Alert::for_record(record, options);
                let result = sink.show(alert.clone());
                if let Err(e) = &result {
                    warn!("Alert for notification {} not shown: {}", record.id, e);
                }
                DispatchOutcome {
                    id: record.id.clone(),
                    alert,
                    result,
                }
            })
            .collect()
    }

    /// Ask the receipt service to add `user` to `id`'s read set.
    ///
    /// Touches no engine state: the unread count changes when the feed
    /// re-delivers the updated record.
    pub async fn request_mark_read(
        service: &dyn ReadReceiptService,
        id: &NotificationId,
        user: &UserId,
    ) -> Result<(), MarkReadError> {
        debug!("request_mark_read: {} by {}", id, user);
        service
            .union_read_by(id, user)
            .await
            .map_err(|source| MarkReadError {
                id: id.clone(),
                user: user.clone(),
                source,
            })
    }

    /// Tear down: forget every known id and ignore all further snapshots.
    pub fn close(&mut self) {
        self.known_ids.clear();
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{Glyph, RecordingAlertSink};
    use crate::record::Category;
    use async_trait::async_trait;
    use std::sync::Mutex;

    const USER: &str = "staff@office.io";

    fn engine() -> SyncEngine {
        SyncEngine::new(UserId::from(USER), FirstSnapshotPolicy::AlertBacklog)
    }

    fn record(id: &str, timestamp: u64) -> NotificationRecord {
        NotificationRecord::new(id, format!("message {}", id), Category::Info, timestamp)
    }

    fn ids(records: &[NotificationRecord]) -> Vec<&str> {
        records.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let mut engine = engine();
        let snapshot = vec![record("b", 2), record("a", 1)];

        let first = engine.reconcile(&snapshot);
        assert_eq!(ids(&first.newly_unread), ["b", "a"]);
        assert_eq!(first.unread_count, 2);

        let second = engine.reconcile(&snapshot);
        assert!(second.newly_unread.is_empty());
        assert_eq!(second.unread_count, 2);
    }

    #[test]
    fn test_new_arrival_detected_once() {
        let mut engine = engine();
        engine.reconcile(&[record("a", 2), record("b", 1)]);

        let result = engine.reconcile(&[record("a", 2), record("b", 1), record("c", 0)]);
        assert_eq!(ids(&result.newly_unread), ["c"]);
        assert_eq!(result.unread_count, 3);
    }

    #[test]
    fn test_newly_unread_preserves_snapshot_order() {
        let mut engine = engine();
        engine.reconcile(&[record("a", 9), record("b", 8)]);

        let result = engine.reconcile(&[
            record("a", 9),
            record("b", 8),
            record("c", 7),
            record("d", 6),
        ]);
        assert_eq!(ids(&result.newly_unread), ["c", "d"]);
    }

    #[test]
    fn test_read_records_never_alert_but_become_known() {
        let mut engine = engine();
        let read = record("a", 1).with_read_by([USER]);

        let result = engine.reconcile(&[read.clone()]);
        assert!(result.newly_unread.is_empty());
        assert_eq!(result.unread_count, 0);
        assert!(engine.is_known(&read.id));
    }

    #[test]
    fn test_read_by_other_user_still_unread() {
        let mut engine = engine();
        let result = engine.reconcile(&[record("a", 1).with_read_by(["boss@office.io"])]);
        assert_eq!(ids(&result.newly_unread), ["a"]);
        assert_eq!(result.unread_count, 1);
    }

    #[test]
    fn test_unread_count_is_pure_function_of_snapshot() {
        let mut engine = engine();
        engine.reconcile(&[record("a", 3), record("b", 2), record("c", 1)]);

        // Records vanish and one becomes read; the count follows the snapshot only.
        let result = engine.reconcile(&[record("b", 2).with_read_by([USER])]);
        assert_eq!(result.unread_count, 0);

        let result = engine.reconcile(&[record("a", 3), record("c", 1)]);
        assert_eq!(result.unread_count, 2);
        assert!(result.newly_unread.is_empty());
    }

    #[test]
    fn test_no_realert_after_read() {
        let mut engine = engine();
        let s1 = vec![record("r", 2), record("other", 1)];
        let before = engine.reconcile(&s1);
        assert_eq!(ids(&before.newly_unread), ["r", "other"]);

        let s2 = vec![record("r", 2).with_read_by([USER]), record("other", 1)];
        let after = engine.reconcile(&s2);
        assert!(after.newly_unread.is_empty());
        assert_eq!(after.unread_count, before.unread_count - 1);
    }

    #[test]
    fn test_duplicate_id_within_snapshot_counts_as_new_once() {
        let mut engine = engine();
        let result = engine.reconcile(&[record("a", 1), record("a", 1)]);
        assert_eq!(ids(&result.newly_unread), ["a"]);
    }

    #[test]
    fn test_seed_silently_skips_first_snapshot_only() {
        let mut engine = SyncEngine::new(UserId::from(USER), FirstSnapshotPolicy::SeedSilently);

        let first = engine.reconcile(&[record("a", 2), record("b", 1)]);
        assert!(first.newly_unread.is_empty());
        assert_eq!(first.unread_count, 2);
        assert_eq!(engine.known_count(), 2);

        let second = engine.reconcile(&[record("c", 3), record("a", 2), record("b", 1)]);
        assert_eq!(ids(&second.newly_unread), ["c"]);
    }

    #[test]
    fn test_seed_silently_with_empty_first_snapshot() {
        let mut engine = SyncEngine::new(UserId::from(USER), FirstSnapshotPolicy::SeedSilently);
        engine.reconcile(&[]);

        let result = engine.reconcile(&[record("a", 1)]);
        assert_eq!(ids(&result.newly_unread), ["a"]);
    }

    #[test]
    fn test_fail_reports_empty_and_keeps_known_ids() {
        let mut engine = engine();
        engine.reconcile(&[record("a", 1)]);

        let result = engine.fail(&FeedError::PermissionDenied("revoked".into()));
        assert_eq!(result, Reconciliation::default());
        assert!(engine.is_known(&NotificationId::from("a")));
    }

    #[test]
    fn test_closed_engine_ignores_snapshots() {
        let mut engine = engine();
        engine.reconcile(&[record("a", 1)]);
        engine.close();

        assert_eq!(engine.known_count(), 0);
        let result = engine.reconcile(&[record("b", 2)]);
        assert_eq!(result, Reconciliation::default());
        assert_eq!(engine.known_count(), 0);
    }

    #[test]
    fn test_dispatch_alerts_in_order_with_glyphs() {
        let engine = engine();
        let sink = RecordingAlertSink::new();
        let records = vec![
            NotificationRecord::new("1", "Low stock", Category::Alert, 3),
            NotificationRecord::new("2", "Salary paid", Category::Success, 2),
            NotificationRecord::new("3", "Office closed", Category::parse("holiday"), 1),
        ];

        let outcomes = engine.dispatch_alerts(&records, &sink, &AlertOptions::default());

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.result.is_ok()));
        let glyphs: Vec<_> = sink.alerts().iter().map(|a| a.glyph).collect();
        assert_eq!(glyphs, [Glyph::Warning, Glyph::Success, Glyph::Info]);
        assert_eq!(sink.messages(), ["Low stock", "Salary paid", "Office closed"]);
    }

    #[test]
    fn test_failed_alert_is_not_redelivered() {
        let mut engine = engine();
        let sink = RecordingAlertSink::new();
        sink.set_unmounted(true);

        let snapshot = vec![record("a", 1)];
        let result = engine.reconcile(&snapshot);
        let outcomes = engine.dispatch_alerts(&result.newly_unread, &sink, &AlertOptions::default());
        assert_eq!(outcomes[0].result, Err(AlertError::NotMounted));

        sink.set_unmounted(false);
        let result = engine.reconcile(&snapshot);
        assert!(result.newly_unread.is_empty());
        engine.dispatch_alerts(&result.newly_unread, &sink, &AlertOptions::default());
        assert!(sink.alerts().is_empty());
    }

    #[test]
    fn test_closed_engine_dispatches_nothing() {
        let mut engine = engine();
        let sink = RecordingAlertSink::new();
        engine.close();

        let outcomes = engine.dispatch_alerts(&[record("a", 1)], &sink, &AlertOptions::default());
        assert!(outcomes.is_empty());
        assert!(sink.alerts().is_empty());
    }

    /// Receipt service double that records calls and can be told to fail.
    #[derive(Default)]
    struct FakeReceipts {
        calls: Mutex<Vec<(NotificationId, UserId)>>,
        fail_with: Option<ReceiptError>,
    }

    #[async_trait]
    impl ReadReceiptService for FakeReceipts {
        async fn union_read_by(
            &self,
            id: &NotificationId,
            user: &UserId,
        ) -> crate::receipts::Result<()> {
            self.calls.lock().unwrap().push((id.clone(), user.clone()));
            match &self.fail_with {
                Some(e) => Err(e.clone()),
                None => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn test_request_mark_read_forwards_to_service() {
        let service = FakeReceipts::default();
        let id = NotificationId::from("a");
        let user = UserId::from(USER);

        SyncEngine::request_mark_read(&service, &id, &user).await.unwrap();
        SyncEngine::request_mark_read(&service, &id, &user).await.unwrap();

        assert_eq!(service.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_request_mark_read_reports_failure() {
        let service = FakeReceipts {
            fail_with: Some(ReceiptError::NotFound(NotificationId::from("gone"))),
            ..Default::default()
        };

        let err = SyncEngine::request_mark_read(
            &service,
            &NotificationId::from("gone"),
            &UserId::from(USER),
        )
        .await
        .unwrap_err();

        assert_eq!(err.id.as_str(), "gone");
        assert_eq!(err.source, ReceiptError::NotFound(NotificationId::from("gone")));
        assert!(err.to_string().contains("Notification not found: gone"));
    }
}
