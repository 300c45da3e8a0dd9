use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::access::UserId;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Business events that produce a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    VerificationSubmitted,
    VerificationApproved,
    VerificationRejected,
    System,
}

impl NotificationType {
    pub const fn label(self) -> &'static str {
        match self {
            NotificationType::VerificationSubmitted => "verification_submitted",
            NotificationType::VerificationApproved => "verification_approved",
            NotificationType::VerificationRejected => "verification_rejected",
            NotificationType::System => "system",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub user_id: UserId,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_id: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub user_id: UserId,
    pub kind: NotificationType,
    pub title: String,
    pub message: String,
    pub related_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Read/unread tally, always aggregated from ledger rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationCounts {
    pub unread: u64,
    pub read: u64,
    pub total: u64,
}

impl NotificationCounts {
    pub fn tally<'a>(rows: impl IntoIterator<Item = &'a Notification>) -> Self {
        rows.into_iter().fold(Self::default(), |mut counts, row| {
            if row.is_read {
                counts.read += 1;
            } else {
                counts.unread += 1;
            }
            counts.total += 1;
            counts
        })
    }
}
