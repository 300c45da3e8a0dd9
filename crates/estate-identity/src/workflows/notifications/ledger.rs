use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::domain::{
    NewNotification, Notification, NotificationCounts, NotificationId, NotificationType,
};
use super::repository::{NotificationRepository, RepositoryError};
use crate::workflows::access::UserId;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("notification {0} not found")]
    NotFound(NotificationId),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Append-only notification ledger with read/unread bookkeeping.
///
/// Counts are aggregated from the rows on every call. There is no cached
/// counter that could drift from the ledger.
pub struct NotificationLedger<R> {
    repository: Arc<R>,
}

impl<R> NotificationLedger<R>
where
    R: NotificationRepository + 'static,
{
    pub fn new(repository: Arc<R>) -> Self {
        Self { repository }
    }

    pub fn append(
        &self,
        user_id: &UserId,
        kind: NotificationType,
        title: impl Into<String>,
        message: impl Into<String>,
        related_id: Option<String>,
    ) -> Result<Notification, LedgerError> {
        let row = self.repository.insert(NewNotification {
            user_id: user_id.clone(),
            kind,
            title: title.into(),
            message: message.into(),
            related_id,
            created_at: Utc::now(),
        })?;
        debug!(
            notification_id = %row.id,
            %user_id,
            kind = kind.label(),
            "notification appended"
        );
        Ok(row)
    }

    pub fn get(&self, id: &NotificationId) -> Result<Notification, LedgerError> {
        self.repository
            .get(id)?
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    pub fn list(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, LedgerError> {
        Ok(self.repository.list_for_user(user_id, unread_only)?)
    }

    pub fn counts(&self, user_id: &UserId) -> Result<NotificationCounts, LedgerError> {
        Ok(self.repository.counts_for_user(user_id)?)
    }

    /// System-wide tally backing dashboard badges.
    pub fn global_counts(&self) -> Result<NotificationCounts, LedgerError> {
        Ok(self.repository.counts_all()?)
    }

    /// Idempotent: an already-read row keeps its original `read_at`.
    pub fn mark_read(&self, id: &NotificationId) -> Result<Notification, LedgerError> {
        self.repository
            .mark_read(id, Utc::now())?
            .ok_or_else(|| LedgerError::NotFound(id.clone()))
    }

    pub fn mark_all_read(&self, user_id: &UserId) -> Result<u64, LedgerError> {
        let changed = self.repository.mark_all_read(user_id, Utc::now())?;
        debug!(%user_id, changed, "notifications marked read");
        Ok(changed)
    }

    /// Retention sweep: drops read rows older than `older_than_days`.
    pub fn cleanup(&self, older_than_days: u32) -> Result<u64, LedgerError> {
        let cutoff = Utc::now() - chrono::Duration::days(i64::from(older_than_days));
        self.cleanup_before(cutoff)
    }

    pub fn cleanup_before(&self, cutoff: DateTime<Utc>) -> Result<u64, LedgerError> {
        let removed = self.repository.delete_read_before(cutoff)?;
        if removed > 0 {
            info!(removed, %cutoff, "purged read notifications");
        }
        Ok(removed)
    }
}

/// Periodically runs `cleanup` until the ledger is dropped.
pub async fn run_retention<R>(
    ledger: Weak<NotificationLedger<R>>,
    retention_days: u32,
    every: Duration,
) where
    R: NotificationRepository + 'static,
{
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(ledger) = ledger.upgrade() else {
            debug!("notification ledger dropped, stopping retention sweep");
            return;
        };
        if let Err(err) = ledger.cleanup(retention_days) {
            warn!(error = %err, "notification retention sweep failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::notifications::repository::InMemoryNotificationRepository;

    type Ledger = NotificationLedger<InMemoryNotificationRepository>;

    fn ledger() -> Ledger {
        NotificationLedger::new(Arc::new(InMemoryNotificationRepository::default()))
    }

    fn append(ledger: &Ledger, user: &str) -> Notification {
        ledger
            .append(
                &UserId::new(user),
                NotificationType::System,
                "Heads up",
                "Something happened",
                None,
            )
            .expect("append succeeds")
    }

    fn unread_rows(ledger: &Ledger, user: &str) -> u64 {
        ledger
            .list(&UserId::new(user), false)
            .expect("list")
            .iter()
            .filter(|row| !row.is_read)
            .count() as u64
    }

    #[test]
    fn counts_track_rows_across_reads() {
        let ledger = ledger();
        let user = UserId::new("u-1");
        let rows: Vec<_> = (0..4).map(|_| append(&ledger, "u-1")).collect();
        append(&ledger, "u-2");

        assert_eq!(
            ledger.counts(&user).unwrap(),
            NotificationCounts {
                unread: 4,
                read: 0,
                total: 4
            }
        );

        ledger.mark_read(&rows[1].id).expect("mark read");
        let counts = ledger.counts(&user).unwrap();
        assert_eq!(counts.unread, unread_rows(&ledger, "u-1"));
        assert_eq!(counts.read, 1);

        ledger.mark_all_read(&user).expect("mark all");
        assert_eq!(
            ledger.counts(&user).unwrap(),
            NotificationCounts {
                unread: 0,
                read: 4,
                total: 4
            }
        );
        assert_eq!(ledger.global_counts().unwrap().unread, 1);
    }

    #[test]
    fn mark_read_is_idempotent() {
        let ledger = ledger();
        let row = append(&ledger, "u-1");

        let first = ledger.mark_read(&row.id).expect("first read");
        let second = ledger.mark_read(&row.id).expect("second read");

        assert!(first.is_read);
        assert_eq!(first, second);
        assert_eq!(ledger.counts(&UserId::new("u-1")).unwrap().read, 1);
    }

    #[test]
    fn mark_read_on_unknown_id_is_not_found() {
        let ledger = ledger();
        match ledger.mark_read(&NotificationId("ntf-404".to_string())) {
            Err(LedgerError::NotFound(id)) => assert_eq!(id.0, "ntf-404"),
            other => panic!("expected not found, got {other:?}"),
        }
    }

    #[test]
    fn mark_all_read_reports_only_changed_rows() {
        let ledger = ledger();
        let user = UserId::new("u-1");
        let row = append(&ledger, "u-1");
        append(&ledger, "u-1");
        ledger.mark_read(&row.id).unwrap();

        assert_eq!(ledger.mark_all_read(&user).unwrap(), 1);
        assert_eq!(ledger.mark_all_read(&user).unwrap(), 0);
    }

    #[test]
    fn cleanup_keeps_unread_and_recent_rows() {
        let ledger = ledger();
        let user = UserId::new("u-1");
        let read = append(&ledger, "u-1");
        append(&ledger, "u-1");
        ledger.mark_read(&read.id).unwrap();

        assert_eq!(ledger.cleanup(30).unwrap(), 0, "read row is too recent");

        let removed = ledger
            .cleanup_before(Utc::now() + chrono::Duration::days(1))
            .unwrap();
        assert_eq!(removed, 1);
        assert_eq!(
            ledger.counts(&user).unwrap(),
            NotificationCounts {
                unread: 1,
                read: 0,
                total: 1
            }
        );
    }

    #[test]
    fn list_is_newest_first_and_filters_unread() {
        let ledger = ledger();
        let user = UserId::new("u-1");
        let older = append(&ledger, "u-1");
        let newer = append(&ledger, "u-1");
        ledger.mark_read(&older.id).unwrap();

        let all = ledger.list(&user, false).unwrap();
        assert_eq!(all[0].id, newer.id);
        let unread = ledger.list(&user, true).unwrap();
        assert_eq!(unread.len(), 1);
        assert_eq!(unread[0].id, newer.id);
    }

    #[tokio::test(start_paused = true)]
    async fn retention_sweep_stops_when_ledger_is_dropped() {
        let ledger = Arc::new(ledger());
        let task = tokio::spawn(run_retention(
            Arc::downgrade(&ledger),
            30,
            Duration::from_secs(60),
        ));

        tokio::time::sleep(Duration::from_secs(61)).await;
        drop(ledger);
        tokio::time::sleep(Duration::from_secs(61)).await;

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("sweep exits")
            .expect("sweep task did not panic");
    }
}
