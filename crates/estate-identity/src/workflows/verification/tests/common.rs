use std::sync::{Arc, Mutex};

use axum::response::Response;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::workflows::access::{Actor, UserId};
use crate::workflows::events::{EventBroadcastHub, HubConfig};
use crate::workflows::notifications::{
    InMemoryNotificationRepository, NewNotification, Notification, NotificationCounts,
    NotificationId, NotificationLedger, NotificationRepository, NotificationType,
    RepositoryError,
};
use crate::workflows::verification::domain::{
    DocumentSide, EvidenceRef, NewVerificationRecord, RecordId, TransitionFields,
    VerificationRecord, VerificationStatus,
};
use crate::workflows::verification::store::{
    InMemoryVerificationStore, StoreError, VerificationRecordStore,
};
use crate::workflows::verification::{
    verification_router, DocumentSubmission, EvidencePolicy, VerificationService,
};

pub(super) type MemoryService =
    VerificationService<InMemoryVerificationStore, InMemoryNotificationRepository>;

pub(super) const MAX_IMAGE_BYTES: u64 = 1024 * 1024;

pub(super) fn image(side: DocumentSide) -> EvidenceRef {
    EvidenceRef {
        side,
        storage_key: format!("uploads/identity/{}.jpg", side.label()),
        content_type: "image/jpeg".to_string(),
        size_bytes: 120_000,
    }
}

pub(super) fn evidence() -> Vec<EvidenceRef> {
    vec![image(DocumentSide::Front), image(DocumentSide::Back)]
}

pub(super) fn submission(user: &str) -> DocumentSubmission {
    DocumentSubmission {
        user_id: UserId::new(user),
        evidence_refs: evidence(),
    }
}

pub(super) fn hub() -> EventBroadcastHub {
    EventBroadcastHub::new(HubConfig {
        buffer: 16,
        ..HubConfig::default()
    })
}

pub(super) fn build_service() -> Arc<MemoryService> {
    Arc::new(VerificationService::new(
        Arc::new(InMemoryVerificationStore::default()),
        Arc::new(NotificationLedger::new(Arc::new(
            InMemoryNotificationRepository::default(),
        ))),
        hub(),
        EvidencePolicy::new(MAX_IMAGE_BYTES),
    ))
}

pub(super) fn build_service_with<S, N>(store: S, notifications: N) -> VerificationService<S, N>
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    VerificationService::new(
        Arc::new(store),
        Arc::new(NotificationLedger::new(Arc::new(notifications))),
        hub(),
        EvidencePolicy::new(MAX_IMAGE_BYTES),
    )
}

pub(super) fn admin() -> Actor {
    Actor::admin("admin-1")
}

pub(super) fn submit_pending(service: &MemoryService, user: &str) -> VerificationRecord {
    service
        .submit_document(&Actor::user(user), submission(user))
        .expect("submission accepted")
}

/// Ledger rows of the given type for `user`.
pub(super) fn notifications_of(
    service: &MemoryService,
    user: &str,
    kind: NotificationType,
) -> Vec<Notification> {
    service
        .ledger()
        .list(&UserId::new(user), false)
        .expect("ledger readable")
        .into_iter()
        .filter(|row| row.kind == kind)
        .collect()
}

pub(super) fn resolution_notifications(service: &MemoryService, user: &str) -> usize {
    notifications_of(service, user, NotificationType::VerificationApproved).len()
        + notifications_of(service, user, NotificationType::VerificationRejected).len()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) fn router_with_service(service: Arc<MemoryService>) -> axum::Router {
    verification_router(service)
}

pub(super) struct UnavailableStore;

impl VerificationRecordStore for UnavailableStore {
    fn create(&self, _record: NewVerificationRecord) -> Result<VerificationRecord, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn get_by_id(&self, _id: &RecordId) -> Result<Option<VerificationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn get_active_for_user(
        &self,
        _user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn latest_for_user(&self, _user_id: &UserId) -> Result<Option<VerificationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn list_by_status(
        &self,
        _status: VerificationStatus,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }

    fn conditional_transition(
        &self,
        _id: &RecordId,
        _from: VerificationStatus,
        _to: VerificationStatus,
        _fields: TransitionFields,
    ) -> Result<bool, StoreError> {
        Err(StoreError::Unavailable("database offline".to_string()))
    }
}

/// Notification repository whose writes always fail.
pub(super) struct OfflineNotifications;

impl NotificationRepository for OfflineNotifications {
    fn insert(&self, _notification: NewNotification) -> Result<Notification, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn get(&self, _id: &NotificationId) -> Result<Option<Notification>, RepositoryError> {
        Ok(None)
    }

    fn list_for_user(
        &self,
        _user_id: &UserId,
        _unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        Ok(Vec::new())
    }

    fn mark_read(
        &self,
        _id: &NotificationId,
        _read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>, RepositoryError> {
        Ok(None)
    }

    fn mark_all_read(
        &self,
        _user_id: &UserId,
        _read_at: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        Ok(0)
    }

    fn counts_for_user(&self, _user_id: &UserId) -> Result<NotificationCounts, RepositoryError> {
        Ok(NotificationCounts::default())
    }

    fn counts_all(&self) -> Result<NotificationCounts, RepositoryError> {
        Ok(NotificationCounts::default())
    }

    fn delete_read_before(&self, _cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        Ok(0)
    }
}

/// Notification repository that remembers how many events the hub had
/// published when each row was appended.
pub(super) struct PublishedAtAppend {
    rows: InMemoryNotificationRepository,
    hub: EventBroadcastHub,
    pub(super) published: Mutex<Vec<u64>>,
}

impl PublishedAtAppend {
    pub(super) fn new(hub: EventBroadcastHub) -> Self {
        Self {
            rows: InMemoryNotificationRepository::default(),
            hub,
            published: Mutex::new(Vec::new()),
        }
    }
}

impl NotificationRepository for PublishedAtAppend {
    fn insert(&self, notification: NewNotification) -> Result<Notification, RepositoryError> {
        self.published
            .lock()
            .unwrap()
            .push(self.hub.stats().published);
        self.rows.insert(notification)
    }

    fn get(&self, id: &NotificationId) -> Result<Option<Notification>, RepositoryError> {
        self.rows.get(id)
    }

    fn list_for_user(
        &self,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, RepositoryError> {
        self.rows.list_for_user(user_id, unread_only)
    }

    fn mark_read(
        &self,
        id: &NotificationId,
        read_at: DateTime<Utc>,
    ) -> Result<Option<Notification>, RepositoryError> {
        self.rows.mark_read(id, read_at)
    }

    fn mark_all_read(&self, user_id: &UserId, read_at: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.rows.mark_all_read(user_id, read_at)
    }

    fn counts_for_user(&self, user_id: &UserId) -> Result<NotificationCounts, RepositoryError> {
        self.rows.counts_for_user(user_id)
    }

    fn counts_all(&self) -> Result<NotificationCounts, RepositoryError> {
        self.rows.counts_all()
    }

    fn delete_read_before(&self, cutoff: DateTime<Utc>) -> Result<u64, RepositoryError> {
        self.rows.delete_read_before(cutoff)
    }
}
