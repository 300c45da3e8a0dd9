use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::workflows::access::UserId;

/// Identifier wrapper for verification records.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a submitted identity document.
///
/// `Pending` resolves exactly once, to either terminal status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Pending,
    Approved,
    Rejected,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Approved => "approved",
            VerificationStatus::Rejected => "rejected",
        }
    }

    /// Active records block a new submission for the same user.
    pub const fn is_active(self) -> bool {
        matches!(
            self,
            VerificationStatus::Pending | VerificationStatus::Approved
        )
    }

    pub const fn can_transition_to(self, next: VerificationStatus) -> bool {
        matches!(
            (self, next),
            (VerificationStatus::Pending, VerificationStatus::Approved)
                | (VerificationStatus::Pending, VerificationStatus::Rejected)
        )
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSide {
    Front,
    Back,
}

impl DocumentSide {
    pub const fn label(self) -> &'static str {
        match self {
            DocumentSide::Front => "front",
            DocumentSide::Back => "back",
        }
    }
}

/// Pointer to an uploaded document image held by external storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    pub side: DocumentSide,
    pub storage_key: String,
    pub content_type: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub id: RecordId,
    pub user_id: UserId,
    pub status: VerificationStatus,
    pub submitted_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub evidence_refs: Vec<EvidenceRef>,
}

impl VerificationRecord {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Insert payload; the store assigns the identifier and the `Pending` status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVerificationRecord {
    pub user_id: UserId,
    pub submitted_at: DateTime<Utc>,
    pub evidence_refs: Vec<EvidenceRef>,
}

/// Review metadata written together with a status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionFields {
    pub reviewed_by: UserId,
    pub reviewed_at: DateTime<Utc>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    pub const fn target_status(self) -> VerificationStatus {
        match self {
            Decision::Approve => VerificationStatus::Approved,
            Decision::Reject => VerificationStatus::Rejected,
        }
    }
}

/// A user's verification standing as seen by the rest of the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStanding {
    Unverified,
    Pending,
    Approved,
    Rejected,
}

impl VerificationStanding {
    pub fn from_latest(record: Option<&VerificationRecord>) -> Self {
        match record.map(|record| record.status) {
            None => VerificationStanding::Unverified,
            Some(VerificationStatus::Pending) => VerificationStanding::Pending,
            Some(VerificationStatus::Approved) => VerificationStanding::Approved,
            Some(VerificationStatus::Rejected) => VerificationStanding::Rejected,
        }
    }

    pub const fn can_publish_listings(self) -> bool {
        matches!(self, VerificationStanding::Approved)
    }
}

/// Response body for the "current verification" query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentVerification {
    pub user_id: UserId,
    pub standing: VerificationStanding,
    pub can_publish_listings: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<VerificationRecord>,
}

impl CurrentVerification {
    pub fn from_latest(user_id: UserId, record: Option<VerificationRecord>) -> Self {
        let standing = VerificationStanding::from_latest(record.as_ref());
        Self {
            user_id,
            standing,
            can_publish_listings: standing.can_publish_listings(),
            record,
        }
    }
}
