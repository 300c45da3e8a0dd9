//! Identity document verification workflow.
//!
//! A user submits a front and back document image, an administrator approves
//! or rejects the resulting record, and the outcome is written to the
//! notification ledger and fanned out over the event hub.

pub mod domain;
pub mod evidence;
pub mod router;
pub mod service;
pub mod state_machine;
pub mod store;

#[cfg(test)]
mod tests;

pub use domain::{
    CurrentVerification, Decision, DocumentSide, EvidenceRef, NewVerificationRecord, RecordId,
    TransitionFields, VerificationRecord, VerificationStanding, VerificationStatus,
};
pub use evidence::{EvidenceError, EvidencePolicy};
pub use router::{actor_from_headers, verification_router, Unauthenticated};
pub use service::{
    DocumentSubmission, ResolutionRequest, ServiceDiagnostics, VerificationService,
    VerificationServiceError,
};
pub use state_machine::{TransitionError, VerificationStateMachine};
pub use store::{InMemoryVerificationStore, StoreError, VerificationRecordStore};
