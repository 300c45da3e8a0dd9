use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::access::UserId;
use crate::workflows::notifications::{Notification, NotificationId};
use crate::workflows::verification::domain::{RecordId, VerificationRecord, VerificationStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// First message on every subscription; nothing before it is replayed.
    Connected,
    Heartbeat,
    Submitted,
    Resolved,
}

impl EventKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Submitted => "submitted",
            EventKind::Resolved => "resolved",
        }
    }
}

/// Small summary of the notification written alongside a resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationSummary {
    pub id: NotificationId,
    pub title: String,
    /// Recipient's unread count right after the append.
    pub unread: u64,
}

impl NotificationSummary {
    pub fn new(notification: &Notification, unread: u64) -> Self {
        Self {
            id: notification.id.clone(),
            title: notification.title.clone(),
            unread,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record_id: Option<RecordId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<VerificationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification: Option<NotificationSummary>,
}

/// Ephemeral message pushed to live listeners. Never stored.
///
/// Payloads are hints: clients re-query the API for authoritative state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventMessage {
    #[serde(rename = "type")]
    pub kind: EventKind,
    pub payload: EventPayload,
    pub emitted_at: DateTime<Utc>,
}

impl EventMessage {
    fn new(kind: EventKind, payload: EventPayload) -> Self {
        Self {
            kind,
            payload,
            emitted_at: Utc::now(),
        }
    }

    pub fn connected(user_id: Option<UserId>) -> Self {
        Self::new(
            EventKind::Connected,
            EventPayload {
                user_id,
                ..EventPayload::default()
            },
        )
    }

    pub fn heartbeat() -> Self {
        Self::new(EventKind::Heartbeat, EventPayload::default())
    }

    pub fn submitted(record: &VerificationRecord) -> Self {
        Self::new(
            EventKind::Submitted,
            EventPayload {
                record_id: Some(record.id.clone()),
                user_id: Some(record.user_id.clone()),
                status: Some(record.status),
                ..EventPayload::default()
            },
        )
    }

    pub fn resolved(
        record: &VerificationRecord,
        notification: Option<NotificationSummary>,
    ) -> Self {
        Self::new(
            EventKind::Resolved,
            EventPayload {
                record_id: Some(record.id.clone()),
                user_id: Some(record.user_id.clone()),
                status: Some(record.status),
                reason: record.notes.clone(),
                notification,
            },
        )
    }

    pub fn user_id(&self) -> Option<&UserId> {
        self.payload.user_id.as_ref()
    }
}
