//! Live event fan-out for verification activity.
//!
//! Listeners subscribe as admins (everything) or as a single user (events
//! naming that user). Messages are best-effort and never persisted.

pub mod hub;
pub mod message;
pub mod sse;

pub use hub::{
    EventBroadcastHub, HeartbeatReport, HubConfig, HubStats, ListenerKind, Subscription,
    SubscriptionId,
};
pub use message::{EventKind, EventMessage, EventPayload, NotificationSummary};
pub use sse::{into_sse, to_sse_event};
