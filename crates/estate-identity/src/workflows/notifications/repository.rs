use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use super::domain::{NewNotification, Notification, NotificationCounts, NotificationId};
use crate::workflows::access::UserId;

/// Row storage behind the notification ledger.
///
/// Rows are only ever appended, flipped to read, or purged by retention.
pub trait NotificationRepository: Send + Sync {
    fn insert(&self, notification: NewNotification) -> Result<Notification, RepositoryError>;
    fn get(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError>;
    /// Newest first.
    fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError>;
    /// Flips a single row to read if it is unread; `None` when the id is unknown.
    fn mark_read(
        &self,
        id: &NotificationId,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>, RepositoryError>;
    /// Returns the number of rows that changed.
    fn mark_all_read(&self, user_id: &UserId, read_at: DateTime<Utc>)
        -> Result<u64, RepositoryError>;
    fn counts_for_user(&self, user_id: &UserId) -> Result<NotificationCounts, RepositoryError>;
    fn counts_all(&self) -> Result<NotificationCounts, RepositoryError>;
    /// Deletes read rows created before `cutoff`; unread rows are never touched.
    fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("notification repository unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default)]
struct LedgerRows {
    rows: Vec<Notification>,
    issued: u64,
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    state: Mutex<LedgerRows>,
}

impl InMemoryNotificationRepository {
    fn rows(&self) -> Result<MutexGuard<'_, LedgerRows>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("notification lock poisoned".to_string()))
    }
}

impl NotificationRepository for InMemoryNotificationRepository {
    fn insert(&self, notification: NewNotification) -> Result<Notification, RepositoryError> {
        let mut state = self.rows()?;
        state.issued += 1;

        let row = Notification {
            id: NotificationId(format!("ntf-{:06}", state.issued)),
            user_id: notification.user_id,
            kind: notification.kind,
            title: notification.title,
            message: notification.message,
            related_id: notification.related_id,
            is_read: false,
            created_at: notification.created_at,
            read_at: None,
        };
        state.rows.push(row.clone());
        Ok(row)
    }

    fn get(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError> {
        let state = self.rows()?;
        Ok(state.rows.iter().find(|row| &row.id == id).cloned())
    }

    fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        let state = self.rows()?;
        Ok(state
            .rows
            .iter()
            .rev()
            .filter(|row| &row.user_id == user_id && (!unread_only || !row.is_read))
            .cloned()
            .collect())
    }

    fn mark_read(
        &self,
        id: &NotificationId,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>, RepositoryError> {
        let mut state = self.rows()?;
        let Some(row) = state.rows.iter_mut().find(|row| &row.id == id) else {
            return Ok(None);
        };
        if !row.is_read {
            row.is_read = true;
            row.read_at = Some(read_at);
        }
        Ok(Some(row.clone()))
    }

    fn mark_all_read(
        &self,
        user_id: &UserId,
        read_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut state = self.rows()?;
        let mut changed = 0;
        for row in state
            .rows
            .iter_mut()
            .filter(|row| &row.user_id == user_id && !row.is_read)
        {
            row.is_read = true;
            row.read_at = Some(read_at);
            changed += 1;
        }
        Ok(changed)
    }

    fn counts_for_user(&self, user_id: &UserId) -> Result<NotificationCounts, RepositoryError> {
        let state = self.rows()?;
        Ok(NotificationCounts::tally(
            state.rows.iter().filter(|row| &row.user_id == user_id),
        ))
    }

    fn counts_all(&self) -> Result<NotificationCounts, RepositoryError> {
        let state = self.rows()?;
        Ok(NotificationCounts::tally(state.rows.iter()))
    }

    fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        let mut state = self.rows()?;
        let before = state.rows.len();
        state
            .rows
            .retain(|row| !(row.is_read && row.created_at < cutoff));
        Ok((before - state.rows.len()) as u64)
    }
}
