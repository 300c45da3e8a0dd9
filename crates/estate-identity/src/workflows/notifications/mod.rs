//! Per-user notification ledger.

pub mod domain;
pub mod ledger;
pub mod repository;

pub use domain::{
    NewNotification, Notification, NotificationCounts, NotificationId, NotificationType,
};
pub use ledger::{run_retention, LedgerError, NotificationLedger};
pub use repository::{InMemoryNotificationRepository, NotificationRepository, RepositoryError};
