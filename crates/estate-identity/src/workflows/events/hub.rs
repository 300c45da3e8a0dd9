use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

use super::message::EventMessage;
use crate::config::EventsConfig;
use crate::workflows::access::UserId;

/// Which events a listener receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ListenerKind {
    /// Every verification event, system-wide.
    Admin,
    /// Only events whose payload names this user.
    User(UserId),
}

impl ListenerKind {
    fn accepts(&self, event: &EventMessage) -> bool {
        match self {
            ListenerKind::Admin => true,
            ListenerKind::User(user_id) => event.user_id() == Some(user_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub buffer: usize,
    pub heartbeat_interval: Duration,
    pub max_missed_heartbeats: u32,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self::from(&EventsConfig::default())
    }
}

impl From<&EventsConfig> for HubConfig {
    fn from(config: &EventsConfig) -> Self {
        Self {
            buffer: config.listener_buffer.max(1),
            heartbeat_interval: config.heartbeat_interval,
            max_missed_heartbeats: config.max_missed_heartbeats.max(1),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub listeners: usize,
    pub admin_listeners: usize,
    pub user_listeners: usize,
    pub published: u64,
    pub dropped: u64,
    pub evicted: u64,
}

/// Outcome of one heartbeat round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    pub delivered: usize,
    pub evicted: usize,
}

struct Listener {
    kind: ListenerKind,
    sender: mpsc::Sender<EventMessage>,
    /// Heartbeats sent since the listener last read anything.
    unacked: Arc<AtomicU32>,
}

struct HubInner {
    config: HubConfig,
    listeners: Mutex<HashMap<SubscriptionId, Listener>>,
    next_id: AtomicU64,
    published: AtomicU64,
    dropped: AtomicU64,
    evicted: AtomicU64,
}

impl HubInner {
    // Every critical section below leaves the map consistent, so a poisoned
    // lock is still safe to reuse.
    fn listeners(&self) -> MutexGuard<'_, HashMap<SubscriptionId, Listener>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn remove(&self, id: SubscriptionId) -> bool {
        self.listeners().remove(&id).is_some()
    }
}

/// In-process publish/subscribe bus for verification events.
///
/// Delivery is at-most-once with no replay. Each listener owns a bounded
/// queue; a full queue drops that listener's copy and `publish` never waits.
#[derive(Clone)]
pub struct EventBroadcastHub {
    inner: Arc<HubInner>,
}

impl EventBroadcastHub {
    pub fn new(config: HubConfig) -> Self {
        Self {
            inner: Arc::new(HubInner {
                config,
                listeners: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                published: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                evicted: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Registers a listener and queues its `connected` greeting.
    pub fn subscribe(&self, kind: ListenerKind) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.inner.config.buffer);
        let id = SubscriptionId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let unacked = Arc::new(AtomicU32::new(0));

        let greeting_scope = match &kind {
            ListenerKind::Admin => None,
            ListenerKind::User(user_id) => Some(user_id.clone()),
        };
        // Fresh channel with capacity >= 1, so the greeting always fits.
        let _ = sender.try_send(EventMessage::connected(greeting_scope));

        debug!(subscription = %id, ?kind, "listener subscribed");
        self.inner.listeners().insert(
            id,
            Listener {
                kind: kind.clone(),
                sender,
                unacked: unacked.clone(),
            },
        );

        Subscription {
            id,
            kind,
            receiver,
            unacked,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Removes the listener and closes its channel.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let removed = self.inner.remove(subscription.id);
        drop(subscription);
        removed
    }

    /// Delivers `event` to every matching listener, returning how many accepted it.
    pub fn publish(&self, event: EventMessage) -> usize {
        self.inner.published.fetch_add(1, Ordering::Relaxed);

        let mut delivered = 0;
        let mut closed = Vec::new();
        let mut listeners = self.inner.listeners();

        for (id, listener) in listeners.iter() {
            if !listener.kind.accepts(&event) {
                continue;
            }
            match listener.sender.try_send(event.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                    debug!(subscription = %id, kind = event.kind.as_str(), "listener buffer full, dropping event");
                }
                Err(TrySendError::Closed(_)) => closed.push(*id),
            }
        }

        for id in closed {
            listeners.remove(&id);
            debug!(subscription = %id, "removed closed listener");
        }

        delivered
    }

    /// Sends one heartbeat to every listener and evicts the ones that have
    /// left `max_missed_heartbeats` of them unread.
    pub fn heartbeat_tick(&self) -> HeartbeatReport {
        let limit = self.inner.config.max_missed_heartbeats;
        let mut report = HeartbeatReport::default();
        let mut listeners = self.inner.listeners();

        listeners.retain(|id, listener| {
            if listener.unacked.load(Ordering::Acquire) >= limit {
                warn!(subscription = %id, missed = limit, "evicting unresponsive listener");
                report.evicted += 1;
                return false;
            }

            listener.unacked.fetch_add(1, Ordering::AcqRel);
            match listener.sender.try_send(EventMessage::heartbeat()) {
                Ok(()) => {
                    report.delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Closed(_)) => false,
            }
        });

        self.inner
            .evicted
            .fetch_add(report.evicted as u64, Ordering::Relaxed);
        report
    }

    /// Spawns the heartbeat driver. It stops once every hub handle is dropped.
    pub fn spawn_heartbeat(&self) -> tokio::task::JoinHandle<()> {
        let hub = Arc::downgrade(&self.inner);
        let period = self.inner.config.heartbeat_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(inner) = hub.upgrade() else {
                    debug!("event hub dropped, stopping heartbeat");
                    return;
                };
                let report = EventBroadcastHub { inner }.heartbeat_tick();
                if report.evicted > 0 {
                    info!(evicted = report.evicted, "heartbeat evicted listeners");
                }
            }
        })
    }

    pub fn stats(&self) -> HubStats {
        let listeners = self.inner.listeners();
        let admin_listeners = listeners
            .values()
            .filter(|listener| listener.kind == ListenerKind::Admin)
            .count();

        HubStats {
            listeners: listeners.len(),
            admin_listeners,
            user_listeners: listeners.len() - admin_listeners,
            published: self.inner.published.load(Ordering::Relaxed),
            dropped: self.inner.dropped.load(Ordering::Relaxed),
            evicted: self.inner.evicted.load(Ordering::Relaxed),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }
}

impl Default for EventBroadcastHub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

/// Live listener handle. Dropping it unsubscribes.
pub struct Subscription {
    id: SubscriptionId,
    kind: ListenerKind,
    receiver: mpsc::Receiver<EventMessage>,
    unacked: Arc<AtomicU32>,
    hub: Weak<HubInner>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn kind(&self) -> &ListenerKind {
        &self.kind
    }

    /// Next event, or `None` once the hub closed the channel (eviction or shutdown).
    ///
    /// Reading any message counts as a heartbeat acknowledgement.
    pub async fn recv(&mut self) -> Option<EventMessage> {
        let message = self.receiver.recv().await?;
        self.acknowledge();
        Some(message)
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<EventMessage> {
        let message = self.receiver.try_recv().ok()?;
        self.acknowledge();
        Some(message)
    }

    /// Drains everything currently queued.
    pub fn drain(&mut self) -> Vec<EventMessage> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    fn acknowledge(&self) {
        self.unacked.store(0, Ordering::Release);
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .finish()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            if hub.remove(self.id) {
                debug!(subscription = %self.id, "listener unsubscribed");
            }
        }
    }
}
