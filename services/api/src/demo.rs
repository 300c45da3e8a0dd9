use crate::infra::{build_service, AppService};
use clap::Args;
use estate_identity::error::AppError;
use estate_identity::workflows::access::{Actor, UserId};
use estate_identity::workflows::events::{EventMessage, HubConfig, Subscription};
use estate_identity::workflows::verification::{
    Decision, DocumentSide, DocumentSubmission, EvidencePolicy, EvidenceRef, VerificationRecord,
};

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Account submitting the identity document.
    #[arg(long, default_value = "tenant-1042")]
    pub(crate) user: String,
    /// Administrator reviewing the submission.
    #[arg(long, default_value = "reviewer-7")]
    pub(crate) admin: String,
    /// Reason used for the first, rejected, submission.
    #[arg(long, default_value = "blurry image")]
    pub(crate) reject_reason: String,
}

impl Default for DemoArgs {
    fn default() -> Self {
        Self {
            user: "tenant-1042".to_string(),
            admin: "reviewer-7".to_string(),
            reject_reason: "blurry image".to_string(),
        }
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        user,
        admin,
        reject_reason,
    } = args;

    let service = build_service(HubConfig::default(), EvidencePolicy::default());
    let owner = Actor::user(user.clone());
    let owner_id = UserId::new(user.clone());
    let reviewer = Actor::admin(admin);

    println!("Identity verification demo");
    let mut admin_stream = match service.subscribe_admin(&reviewer) {
        Ok(stream) => stream,
        Err(err) => {
            println!("  Admin stream unavailable: {}", err);
            return Ok(());
        }
    };
    let mut owner_stream = match service.subscribe_user(&owner, &owner_id) {
        Ok(stream) => stream,
        Err(err) => {
            println!("  User stream unavailable: {}", err);
            return Ok(());
        }
    };

    println!("\nFirst submission for {}", owner_id);
    let Some(first) = submit(&service, &owner, &user) else {
        return Ok(());
    };

    println!(
        "- Duplicate submission while {} is pending: {}",
        first.id,
        match service.submit_document(&owner, documents(&user)) {
            Ok(record) => format!("unexpectedly accepted as {}", record.id),
            Err(err) => format!("refused ({})", err),
        }
    );

    let rejected = service.resolve(
        &reviewer,
        &first.id,
        Decision::Reject,
        Some(reject_reason.as_str()),
    );
    match rejected {
        Ok(record) => println!(
            "- Rejected {} -> {} ({})",
            record.id,
            record.status,
            record.notes.as_deref().unwrap_or("no reason")
        ),
        Err(err) => {
            println!("  Rejection failed: {}", err);
            return Ok(());
        }
    }

    println!("\nResubmission after rejection");
    let Some(second) = submit(&service, &owner, &user) else {
        return Ok(());
    };
    match service.resolve(&reviewer, &second.id, Decision::Approve, None) {
        Ok(record) => println!("- Approved {} -> {}", record.id, record.status),
        Err(err) => println!("  Approval failed: {}", err),
    }
    match service.resolve(&reviewer, &second.id, Decision::Reject, Some("second look")) {
        Ok(_) => println!("- Late rejection unexpectedly applied"),
        Err(err) => println!("- Late rejection refused: {}", err),
    }

    match service.current(&owner, &owner_id) {
        Ok(current) => println!(
            "\nCurrent standing: {:?} (can publish listings: {})",
            current.standing, current.can_publish_listings
        ),
        Err(err) => println!("\nCurrent standing unavailable: {}", err),
    }

    print_stream("Admin stream", &mut admin_stream);
    print_stream("User stream", &mut owner_stream);
    print_ledger(&service, &owner, &owner_id);

    Ok(())
}

fn documents(user: &str) -> DocumentSubmission {
    let image = |side: DocumentSide| EvidenceRef {
        side,
        storage_key: format!("identity/{user}/{}.jpg", side.label()),
        content_type: "image/jpeg".to_string(),
        size_bytes: 412_000,
    };
    DocumentSubmission {
        user_id: UserId::new(user),
        evidence_refs: vec![image(DocumentSide::Front), image(DocumentSide::Back)],
    }
}

fn submit(service: &AppService, owner: &Actor, user: &str) -> Option<VerificationRecord> {
    match service.submit_document(owner, documents(user)) {
        Ok(record) => {
            println!("- Submitted {} -> status {}", record.id, record.status);
            Some(record)
        }
        Err(err) => {
            println!("  Submission rejected: {}", err);
            None
        }
    }
}

fn print_stream(label: &str, stream: &mut Subscription) {
    let events: Vec<EventMessage> = stream.drain();
    println!("\n{} ({} events)", label, events.len());
    for event in events {
        let payload = &event.payload;
        println!(
            "  - {} record={} status={}{}",
            event.kind.as_str(),
            payload
                .record_id
                .as_ref()
                .map(ToString::to_string)
                .unwrap_or_else(|| "-".to_string()),
            payload
                .status
                .map(|status| status.label())
                .unwrap_or("-"),
            payload
                .reason
                .as_deref()
                .map(|reason| format!(" reason=\"{reason}\""))
                .unwrap_or_default()
        );
    }
}

fn print_ledger(service: &AppService, owner: &Actor, owner_id: &UserId) {
    println!("\nNotification ledger for {}", owner_id);
    match service.notifications(owner, owner_id, false) {
        Ok(rows) => {
            for row in rows {
                println!("  - [{}] {}: {}", row.kind.label(), row.title, row.message);
            }
        }
        Err(err) => println!("  Ledger unavailable: {}", err),
    }

    let before = service.counts(owner, owner_id);
    let marked = service.mark_all_read(owner, owner_id);
    let after = service.counts(owner, owner_id);
    match (before, marked, after) {
        (Ok(before), Ok(marked), Ok(after)) => {
            println!(
                "- Counts before read-all: {} unread / {} read / {} total",
                before.unread, before.read, before.total
            );
            println!(
                "- Marked {} read; now {} unread / {} read / {} total",
                marked, after.unread, after.read, after.total
            );
        }
        _ => println!("- Counts unavailable"),
    }

    match serde_json::to_string_pretty(&service.hub().stats()) {
        Ok(json) => println!("\nEvent hub stats:\n{}", json),
        Err(err) => println!("\nEvent hub stats unavailable: {}", err),
    }
}
