use axum::response::sse::{Event, Sse};
use futures_util::stream::{self, Stream};

use super::hub::Subscription;
use super::message::EventMessage;

/// Serializes a hub message as one SSE frame named after its kind.
pub fn to_sse_event(message: &EventMessage) -> Result<Event, axum::Error> {
    Event::default()
        .event(message.kind.as_str())
        .json_data(message)
}

/// Streams a subscription to an HTTP client.
///
/// The stream owns the subscription, so a client disconnect drops it and
/// removes the listener from the hub.
pub fn into_sse(
    subscription: Subscription,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let events = stream::unfold(subscription, |mut subscription| async move {
        let message = subscription.recv().await?;
        Some((to_sse_event(&message), subscription))
    });
    Sse::new(events)
}
