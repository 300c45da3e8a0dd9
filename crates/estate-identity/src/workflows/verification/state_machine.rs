use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use super::domain::{
    Decision, EvidenceRef, NewVerificationRecord, RecordId, TransitionFields, VerificationRecord,
    VerificationStatus,
};
use super::store::{StoreError, VerificationRecordStore};
use crate::workflows::access::UserId;

#[derive(Debug, thiserror::Error)]
pub enum TransitionError {
    #[error("user {0} already has an active verification record")]
    AlreadyActive(UserId),
    #[error("verification record {record_id} was already resolved as {current}")]
    Conflict {
        record_id: RecordId,
        current: VerificationStatus,
    },
    #[error("verification record {0} not found")]
    NotFound(RecordId),
    #[error("a rejection reason is required")]
    MissingReason,
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for TransitionError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::ActiveRecordExists(user_id) => Self::AlreadyActive(user_id),
            other => Self::Store(other),
        }
    }
}

/// Guards the `Pending -> Approved | Rejected` lifecycle on top of a store.
pub struct VerificationStateMachine<S> {
    store: Arc<S>,
}

impl<S> VerificationStateMachine<S>
where
    S: VerificationRecordStore + 'static,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Fails with `AlreadyActive` when the user still holds a pending or approved record.
    pub fn ensure_no_active(&self, user_id: &UserId) -> Result<(), TransitionError> {
        match self.store.get_active_for_user(user_id)? {
            Some(_) => Err(TransitionError::AlreadyActive(user_id.clone())),
            None => Ok(()),
        }
    }

    pub fn submit(
        &self,
        user_id: UserId,
        evidence_refs: Vec<EvidenceRef>,
    ) -> Result<VerificationRecord, TransitionError> {
        self.ensure_no_active(&user_id)?;

        let record = self.store.create(NewVerificationRecord {
            user_id,
            submitted_at: Utc::now(),
            evidence_refs,
        })?;

        info!(record_id = %record.id, user_id = %record.user_id, "verification submitted");
        Ok(record)
    }

    pub fn approve(
        &self,
        record_id: &RecordId,
        admin_id: &UserId,
    ) -> Result<VerificationRecord, TransitionError> {
        self.decide(record_id, admin_id, Decision::Approve, None)
    }

    pub fn reject(
        &self,
        record_id: &RecordId,
        admin_id: &UserId,
        reason: &str,
    ) -> Result<VerificationRecord, TransitionError> {
        self.decide(record_id, admin_id, Decision::Reject, Some(reason))
    }

    fn decide(
        &self,
        record_id: &RecordId,
        admin_id: &UserId,
        decision: Decision,
        reason: Option<&str>,
    ) -> Result<VerificationRecord, TransitionError> {
        let notes = match decision {
            Decision::Approve => None,
            Decision::Reject => {
                let reason = reason.map(str::trim).unwrap_or_default();
                if reason.is_empty() {
                    return Err(TransitionError::MissingReason);
                }
                Some(reason.to_string())
            }
        };
        self.transition(record_id, admin_id, decision.target_status(), notes)
    }

    fn transition(
        &self,
        record_id: &RecordId,
        admin_id: &UserId,
        target: VerificationStatus,
        notes: Option<String>,
    ) -> Result<VerificationRecord, TransitionError> {
        let observed = self.load(record_id)?;
        if !observed.status.can_transition_to(target) {
            return Err(self.conflict(record_id, observed.status, target));
        }

        let fields = TransitionFields {
            reviewed_by: admin_id.clone(),
            reviewed_at: Utc::now(),
            notes,
        };
        let applied =
            self.store
                .conditional_transition(record_id, observed.status, target, fields)?;

        let current = self.load(record_id)?;
        if !applied {
            return Err(self.conflict(record_id, current.status, target));
        }

        info!(%record_id, status = %target, reviewed_by = %admin_id, "verification resolved");
        Ok(current)
    }

    fn load(&self, record_id: &RecordId) -> Result<VerificationRecord, TransitionError> {
        self.store
            .get_by_id(record_id)?
            .ok_or_else(|| TransitionError::NotFound(record_id.clone()))
    }

    fn conflict(
        &self,
        record_id: &RecordId,
        current: VerificationStatus,
        attempted: VerificationStatus,
    ) -> TransitionError {
        debug!(%record_id, %current, %attempted, "record already resolved");
        TransitionError::Conflict {
            record_id: record_id.clone(),
            current,
        }
    }
}
