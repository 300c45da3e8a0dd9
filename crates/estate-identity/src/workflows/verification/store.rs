use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::domain::{
    NewVerificationRecord, RecordId, TransitionFields, VerificationRecord, VerificationStatus,
};
use crate::workflows::access::UserId;

/// Storage abstraction for verification records.
///
/// Implementations own no business rules beyond atomicity: `create` refuses a
/// second active record for a user, and `conditional_transition` is the only
/// way a status ever changes.
pub trait VerificationRecordStore: Send + Sync {
    fn create(&self, record: NewVerificationRecord) -> Result<VerificationRecord, StoreError>;
    fn get_by_id(&self, id: &RecordId) -> Result<Option<VerificationRecord>, StoreError>;
    fn get_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, StoreError>;
    /// Most recent record by `submitted_at`, later inserts winning ties.
    fn latest_for_user(&self, user_id: &UserId) -> Result<Option<VerificationRecord>, StoreError>;
    /// Oldest first.
    fn list_by_status(
        &self,
        status: VerificationStatus,
    ) -> Result<Vec<VerificationRecord>, StoreError>;
    /// Applies `to` only while the record is still in `from`.
    ///
    /// Returns `false` when the record is missing or its status no longer
    /// matches `from`.
    fn conditional_transition(
        &self,
        id: &RecordId,
        from: VerificationStatus,
        to: VerificationStatus,
        fields: TransitionFields,
    ) -> Result<bool, StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("user {0} already has an active verification record")]
    ActiveRecordExists(UserId),
    #[error("verification store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Default)]
struct StoreState {
    records: Vec<VerificationRecord>,
    index: HashMap<RecordId, usize>,
}

/// Mutex-guarded store used by the service binary and the test suites.
#[derive(Default)]
pub struct InMemoryVerificationStore {
    state: Mutex<StoreState>,
}

impl InMemoryVerificationStore {
    fn state(&self) -> Result<MutexGuard<'_, StoreState>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("verification store lock poisoned".to_string()))
    }

    /// Number of stored records across every status.
    pub fn record_count(&self) -> Result<usize, StoreError> {
        Ok(self.state()?.records.len())
    }
}

impl VerificationRecordStore for InMemoryVerificationStore {
    fn create(&self, record: NewVerificationRecord) -> Result<VerificationRecord, StoreError> {
        let mut state = self.state()?;

        if state
            .records
            .iter()
            .any(|existing| existing.user_id == record.user_id && existing.is_active())
        {
            return Err(StoreError::ActiveRecordExists(record.user_id));
        }

        let position = state.records.len();
        let stored = VerificationRecord {
            id: RecordId(format!("ver-{:06}", position + 1)),
            user_id: record.user_id,
            status: VerificationStatus::Pending,
            submitted_at: record.submitted_at,
            reviewed_at: None,
            reviewed_by: None,
            notes: None,
            evidence_refs: record.evidence_refs,
        };

        state.index.insert(stored.id.clone(), position);
        state.records.push(stored.clone());
        Ok(stored)
    }

    fn get_by_id(&self, id: &RecordId) -> Result<Option<VerificationRecord>, StoreError> {
        let state = self.state()?;
        Ok(state
            .index
            .get(id)
            .and_then(|position| state.records.get(*position))
            .cloned())
    }

    fn get_active_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Option<VerificationRecord>, StoreError> {
        let state = self.state()?;
        Ok(state
            .records
            .iter()
            .find(|record| &record.user_id == user_id && record.is_active())
            .cloned())
    }

    fn latest_for_user(&self, user_id: &UserId) -> Result<Option<VerificationRecord>, StoreError> {
        let state = self.state()?;
        Ok(state
            .records
            .iter()
            .filter(|record| &record.user_id == user_id)
            .max_by(|left, right| left.submitted_at.cmp(&right.submitted_at))
            .cloned())
    }

    fn list_by_status(
        &self,
        status: VerificationStatus,
    ) -> Result<Vec<VerificationRecord>, StoreError> {
        let state = self.state()?;
        Ok(state
            .records
            .iter()
            .filter(|record| record.status == status)
            .cloned()
            .collect())
    }

    fn conditional_transition(
        &self,
        id: &RecordId,
        from: VerificationStatus,
        to: VerificationStatus,
        fields: TransitionFields,
    ) -> Result<bool, StoreError> {
        let mut state = self.state()?;
        let Some(position) = state.index.get(id).copied() else {
            return Ok(false);
        };
        let Some(record) = state.records.get_mut(position) else {
            return Ok(false);
        };
        if record.status != from {
            return Ok(false);
        }

        record.status = to;
        record.reviewed_by = Some(fields.reviewed_by);
        record.reviewed_at = Some(fields.reviewed_at);
        record.notes = fields.notes;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn new_record(user: &str, offset_minutes: i64) -> NewVerificationRecord {
        let base = Utc
            .with_ymd_and_hms(2025, 10, 1, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        NewVerificationRecord {
            user_id: UserId::new(user),
            submitted_at: base + Duration::minutes(offset_minutes),
            evidence_refs: Vec::new(),
        }
    }

    fn review(admin: &str) -> TransitionFields {
        TransitionFields {
            reviewed_by: UserId::new(admin),
            reviewed_at: Utc::now(),
            notes: None,
        }
    }

    #[test]
    fn create_assigns_sequential_ids_and_pending_status() {
        let store = InMemoryVerificationStore::default();
        let first = store.create(new_record("u-1", 0)).expect("created");
        let second = store.create(new_record("u-2", 0)).expect("created");

        assert_eq!(first.id, RecordId("ver-000001".to_string()));
        assert_eq!(second.id, RecordId("ver-000002".to_string()));
        assert_eq!(first.status, VerificationStatus::Pending);
        assert_eq!(store.record_count().unwrap(), 2);
    }

    #[test]
    fn create_refuses_second_active_record() {
        let store = InMemoryVerificationStore::default();
        store.create(new_record("u-1", 0)).expect("created");

        match store.create(new_record("u-1", 5)) {
            Err(StoreError::ActiveRecordExists(user)) => assert_eq!(user.as_str(), "u-1"),
            other => panic!("expected active record error, got {other:?}"),
        }
    }

    #[test]
    fn conditional_transition_applies_once() {
        let store = InMemoryVerificationStore::default();
        let record = store.create(new_record("u-1", 0)).expect("created");

        let applied = store
            .conditional_transition(
                &record.id,
                VerificationStatus::Pending,
                VerificationStatus::Approved,
                review("a-1"),
            )
            .expect("store available");
        let replayed = store
            .conditional_transition(
                &record.id,
                VerificationStatus::Pending,
                VerificationStatus::Rejected,
                review("a-2"),
            )
            .expect("store available");

        assert!(applied);
        assert!(!replayed);
        let stored = store.get_by_id(&record.id).unwrap().expect("present");
        assert_eq!(stored.status, VerificationStatus::Approved);
        assert_eq!(stored.reviewed_by, Some(UserId::new("a-1")));
    }

    #[test]
    fn conditional_transition_on_unknown_id_is_not_applied() {
        let store = InMemoryVerificationStore::default();
        let applied = store
            .conditional_transition(
                &RecordId("ver-404".to_string()),
                VerificationStatus::Pending,
                VerificationStatus::Approved,
                review("a-1"),
            )
            .expect("store available");
        assert!(!applied);
    }

    #[test]
    fn rejected_records_free_the_user_and_latest_tracks_newest() {
        let store = InMemoryVerificationStore::default();
        let first = store.create(new_record("u-1", 0)).expect("created");
        store
            .conditional_transition(
                &first.id,
                VerificationStatus::Pending,
                VerificationStatus::Rejected,
                review("a-1"),
            )
            .expect("store available");

        assert!(store
            .get_active_for_user(&UserId::new("u-1"))
            .unwrap()
            .is_none());

        let second = store.create(new_record("u-1", 10)).expect("resubmission");
        let latest = store
            .latest_for_user(&UserId::new("u-1"))
            .unwrap()
            .expect("latest present");
        assert_eq!(latest.id, second.id);
        assert_eq!(
            store
                .list_by_status(VerificationStatus::Pending)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn poisoned_lock_reports_unavailable() {
        let store = std::sync::Arc::new(InMemoryVerificationStore::default());
        let holder = std::sync::Arc::clone(&store);
        let _ = std::thread::spawn(move || {
            let _guard = holder.state.lock().unwrap();
            panic!("poisoning the store lock");
        })
        .join();

        assert!(matches!(
            store.record_count(),
            Err(StoreError::Unavailable(_))
        ));
        assert!(matches!(
            store.get_by_id(&RecordId("ver-000001".to_string())),
            Err(StoreError::Unavailable(_))
        ));
    }
}
