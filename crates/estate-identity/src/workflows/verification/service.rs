use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::domain::{
    CurrentVerification, Decision, EvidenceRef, RecordId, VerificationRecord, VerificationStatus,
};
use super::evidence::{EvidenceError, EvidencePolicy};
use super::state_machine::{TransitionError, VerificationStateMachine};
use super::store::{StoreError, VerificationRecordStore};
use crate::workflows::access::{Actor, UserId};
use crate::workflows::events::{
    EventBroadcastHub, EventMessage, HubStats, ListenerKind, NotificationSummary, Subscription,
};
use crate::workflows::notifications::{
    LedgerError, Notification, NotificationCounts, NotificationId, NotificationLedger,
    NotificationRepository, NotificationType,
};

/// Request body for a new document submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSubmission {
    #[serde(alias = "userId")]
    pub user_id: UserId,
    #[serde(alias = "evidenceRefs")]
    pub evidence_refs: Vec<EvidenceRef>,
}

/// Request body for an administrator decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub decision: Decision,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Snapshot served on the admin diagnostics endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceDiagnostics {
    pub events: HubStats,
    pub notifications: NotificationCounts,
}

/// Orchestrates submissions and decisions across the record store, the
/// notification ledger, and the event hub.
///
/// Every mutation is persisted before its notification is written, and the
/// notification before the event is published.
pub struct VerificationService<S, N> {
    machine: VerificationStateMachine<S>,
    ledger: Arc<NotificationLedger<N>>,
    hub: EventBroadcastHub,
    evidence: EvidencePolicy,
}

impl<S, N> VerificationService<S, N>
where
    S: VerificationRecordStore + 'static,
    N: NotificationRepository + 'static,
{
    pub fn new(
        store: Arc<S>,
        ledger: Arc<NotificationLedger<N>>,
        hub: EventBroadcastHub,
        evidence: EvidencePolicy,
    ) -> Self {
        Self {
            machine: VerificationStateMachine::new(store),
            ledger,
            hub,
            evidence,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        self.machine.store()
    }

    pub fn ledger(&self) -> &Arc<NotificationLedger<N>> {
        &self.ledger
    }

    pub fn hub(&self) -> &EventBroadcastHub {
        &self.hub
    }

    /// Files a new identity document for the acting user.
    pub fn submit_document(
        &self,
        actor: &Actor,
        submission: DocumentSubmission,
    ) -> Result<VerificationRecord, VerificationServiceError> {
        if !actor.is_owner_of(&submission.user_id) {
            return Err(VerificationServiceError::Forbidden(
                "documents can only be submitted for your own account".to_string(),
            ));
        }

        self.machine.ensure_no_active(&submission.user_id)?;
        self.evidence.validate(&submission.evidence_refs)?;

        let record = self
            .machine
            .submit(submission.user_id, submission.evidence_refs)?;

        if let Err(err) = self.ledger.append(
            &record.user_id,
            NotificationType::VerificationSubmitted,
            "Verification submitted",
            "We received your identity documents and will review them shortly.",
            Some(record.id.0.clone()),
        ) {
            warn!(record_id = %record.id, error = %err, "failed to record submission notification");
        }

        self.hub.publish(EventMessage::submitted(&record));
        Ok(record)
    }

    /// Approves or rejects a pending record. Administrators only.
    pub fn resolve(
        &self,
        actor: &Actor,
        record_id: &RecordId,
        decision: Decision,
        reason: Option<&str>,
    ) -> Result<VerificationRecord, VerificationServiceError> {
        if !actor.is_admin() {
            return Err(VerificationServiceError::Forbidden(
                "only administrators can resolve verifications".to_string(),
            ));
        }

        let record = match decision {
            Decision::Approve => self.machine.approve(record_id, &actor.user_id)?,
            Decision::Reject => {
                self.machine
                    .reject(record_id, &actor.user_id, reason.unwrap_or_default())?
            }
        };

        let summary = self.notify_resolution(&record);
        self.hub.publish(EventMessage::resolved(&record, summary));

        Ok(record)
    }

    // A failed append after a committed transition is logged, never surfaced:
    // the decision stands and clients re-query the ledger.
    fn notify_resolution(&self, record: &VerificationRecord) -> Option<NotificationSummary> {
        let (kind, title, message) = match record.status {
            VerificationStatus::Approved => (
                NotificationType::VerificationApproved,
                "Identity verified",
                "Your identity documents were approved. You can now publish listings.".to_string(),
            ),
            VerificationStatus::Rejected => (
                NotificationType::VerificationRejected,
                "Identity verification rejected",
                format!(
                    "Your identity documents were rejected: {}. You can submit new documents at any time.",
                    record.notes.as_deref().unwrap_or("no reason given")
                ),
            ),
            VerificationStatus::Pending => return None,
        };

        let appended = self
            .ledger
            .append(&record.user_id, kind, title, message, Some(record.id.0.clone()))
            .and_then(|notification| {
                let unread = self.ledger.counts(&record.user_id)?.unread;
                Ok(NotificationSummary::new(&notification, unread))
            });

        match appended {
            Ok(summary) => Some(summary),
            Err(err) => {
                warn!(record_id = %record.id, error = %err, "failed to record resolution notification");
                None
            }
        }
    }

    /// Review queue for administrators, oldest first.
    pub fn list_by_status(
        &self,
        actor: &Actor,
        status: VerificationStatus,
    ) -> Result<Vec<VerificationRecord>, VerificationServiceError> {
        if !actor.is_admin() {
            return Err(VerificationServiceError::Forbidden(
                "only administrators can list verifications".to_string(),
            ));
        }
        Ok(self.store().list_by_status(status)?)
    }

    pub fn current(
        &self,
        actor: &Actor,
        user_id: &UserId,
    ) -> Result<CurrentVerification, VerificationServiceError> {
        ensure_can_view(actor, user_id)?;
        let latest = self.store().latest_for_user(user_id)?;
        Ok(CurrentVerification::from_latest(user_id.clone(), latest))
    }

    pub fn notifications(
        &self,
        actor: &Actor,
        user_id: &UserId,
        unread_only: bool,
    ) -> Result<Vec<Notification>, VerificationServiceError> {
        ensure_can_view(actor, user_id)?;
        Ok(self.ledger.list(user_id, unread_only)?)
    }

    pub fn counts(
        &self,
        actor: &Actor,
        user_id: &UserId,
    ) -> Result<NotificationCounts, VerificationServiceError> {
        ensure_can_view(actor, user_id)?;
        Ok(self.ledger.counts(user_id)?)
    }

    /// Marks one notification read. Only its recipient or an administrator may.
    pub fn mark_read(
        &self,
        actor: &Actor,
        id: &NotificationId,
    ) -> Result<Notification, VerificationServiceError> {
        let notification = self.ledger.get(id)?;
        ensure_can_view(actor, &notification.user_id)?;
        Ok(self.ledger.mark_read(id)?)
    }

    pub fn mark_all_read(
        &self,
        actor: &Actor,
        user_id: &UserId,
    ) -> Result<u64, VerificationServiceError> {
        ensure_can_view(actor, user_id)?;
        Ok(self.ledger.mark_all_read(user_id)?)
    }

    pub fn subscribe_admin(&self, actor: &Actor) -> Result<Subscription, VerificationServiceError> {
        if !actor.is_admin() {
            return Err(VerificationServiceError::Forbidden(
                "the admin stream is restricted to administrators".to_string(),
            ));
        }
        info!(user_id = %actor.user_id, "admin listener connected");
        Ok(self.hub.subscribe(ListenerKind::Admin))
    }

    /// Owner-only: administrators follow every user through the admin stream.
    pub fn subscribe_user(
        &self,
        actor: &Actor,
        user_id: &UserId,
    ) -> Result<Subscription, VerificationServiceError> {
        if !actor.is_owner_of(user_id) {
            return Err(VerificationServiceError::Forbidden(
                "user streams are only available to their owner".to_string(),
            ));
        }
        Ok(self.hub.subscribe(ListenerKind::User(user_id.clone())))
    }

    pub fn diagnostics(
        &self,
        actor: &Actor,
    ) -> Result<ServiceDiagnostics, VerificationServiceError> {
        if !actor.is_admin() {
            return Err(VerificationServiceError::Forbidden(
                "diagnostics are restricted to administrators".to_string(),
            ));
        }
        Ok(ServiceDiagnostics {
            events: self.hub.stats(),
            notifications: self.ledger.global_counts()?,
        })
    }
}

fn ensure_can_view(actor: &Actor, user_id: &UserId) -> Result<(), VerificationServiceError> {
    if actor.can_view(user_id) {
        Ok(())
    } else {
        Err(VerificationServiceError::Forbidden(format!(
            "not allowed to access data for user {user_id}"
        )))
    }
}

/// Error raised by the verification service.
#[derive(Debug, thiserror::Error)]
pub enum VerificationServiceError {
    #[error(transparent)]
    Evidence(#[from] EvidenceError),
    #[error("a rejection reason is required")]
    MissingReason,
    #[error("invalid request body: {0}")]
    MalformedBody(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("user {0} already has an active verification record")]
    AlreadyActive(UserId),
    #[error("verification record {record_id} was already resolved as {current}")]
    Conflict {
        record_id: RecordId,
        current: VerificationStatus,
    },
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Internal(String),
}

impl VerificationServiceError {
    /// Stable machine-readable code used in error bodies.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Evidence(_) | Self::MissingReason | Self::MalformedBody(_) => {
                "validation_error"
            }
            Self::Forbidden(_) => "forbidden",
            Self::AlreadyActive(_) => "already_active",
            Self::Conflict { .. } => "conflict",
            Self::NotFound(_) => "not_found",
            Self::Internal(_) => "internal",
        }
    }
}

impl From<TransitionError> for VerificationServiceError {
    fn from(value: TransitionError) -> Self {
        match value {
            TransitionError::AlreadyActive(user_id) => Self::AlreadyActive(user_id),
            TransitionError::Conflict { record_id, current } => {
                Self::Conflict { record_id, current }
            }
            TransitionError::NotFound(id) => {
                Self::NotFound(format!("verification record {id} not found"))
            }
            TransitionError::MissingReason => Self::MissingReason,
            TransitionError::Store(err) => Self::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for VerificationServiceError {
    fn from(value: StoreError) -> Self {
        TransitionError::from(value).into()
    }
}

impl From<LedgerError> for VerificationServiceError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::NotFound(id) => Self::NotFound(format!("notification {id} not found")),
            LedgerError::Repository(err) => Self::Internal(err.to_string()),
        }
    }
}
