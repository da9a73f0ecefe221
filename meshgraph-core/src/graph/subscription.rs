//! Subscriptions and the alert bus.
//!
//! A node alerts its subscribers whenever its value changes (an external set
//! on a leaf value, or a recomputation) and whenever a scheduler marks it
//! stale. Subscriptions only route alerts; they never hold values.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use super::node::{NodeId, NodeState};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// A change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    /// The node that changed.
    pub source: NodeId,
    /// Its version after the change.
    pub version: u64,
    pub state: NodeState,
}

/// Receives alerts from the nodes it subscribed to.
pub trait Observer: Send + Sync {
    fn alert(&self, alert: &Alert);
}

impl<F> Observer for F
where
    F: Fn(&Alert) + Send + Sync,
{
    fn alert(&self, alert: &Alert) {
        self(alert)
    }
}

/// Binds a dependent to one of its dependency edges.
///
/// The observer is held weakly: once it is dropped the subscription is
/// pruned on the next alert.
#[derive(Clone)]
pub struct Subscription {
    id: SubscriptionId,
    subscriber: NodeId,
    edge: String,
    observer: Weak<dyn Observer>,
}

impl Subscription {
    pub fn new(subscriber: NodeId, edge: impl Into<String>, observer: Weak<dyn Observer>) -> Self {
        Self {
            id: SubscriptionId::new(),
            subscriber,
            edge: edge.into(),
            observer,
        }
    }

    /// Subscribe a shared observer.
    pub fn observe<O: Observer + 'static>(
        subscriber: NodeId,
        edge: impl Into<String>,
        observer: &Arc<O>,
    ) -> Self {
        let observer: Weak<dyn Observer> = Arc::downgrade(observer) as Weak<dyn Observer>;
        Self::new(subscriber, edge, observer)
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// The dependent node this subscription belongs to.
    pub fn subscriber(&self) -> NodeId {
        self.subscriber
    }

    /// The input field of the subscriber that this edge feeds.
    pub fn edge(&self) -> &str {
        &self.edge
    }

    pub fn is_live(&self) -> bool {
        self.observer.strong_count() > 0
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("subscriber", &self.subscriber)
            .field("edge", &self.edge)
            .field("live", &self.is_live())
            .finish()
    }
}

/// Per-node list of subscriptions.
pub struct AlertBus {
    source: NodeId,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl AlertBus {
    pub fn new(source: NodeId) -> Self {
        Self {
            source,
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe(&self, subscription: Subscription) -> SubscriptionId {
        let id = subscription.id();
        self.subscriptions.lock().push(subscription);
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscriptions = self.subscriptions.lock();
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id() != id);
        subscriptions.len() != before
    }

    /// Number of live subscriptions.
    pub fn len(&self) -> usize {
        self.subscriptions.lock().iter().filter(|s| s.is_live()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Notify every live subscriber.
    ///
    /// The subscription list is not locked while observers run, so an
    /// observer may subscribe or alert further nodes.
    pub fn alert(&self, version: u64, state: NodeState) {
        let observers: Vec<Arc<dyn Observer>> = {
            let mut subscriptions = self.subscriptions.lock();
            subscriptions.retain(Subscription::is_live);
            subscriptions
                .iter()
                .filter_map(|s| s.observer.upgrade())
                .collect()
        };

        if observers.is_empty() {
            return;
        }

        let alert = Alert {
            source: self.source,
            version,
            state,
        };
        trace!(source = %self.source, version, ?state, subscribers = observers.len(), "alert");

        for observer in observers {
            observer.alert(&alert);
        }
    }
}

impl fmt::Debug for AlertBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlertBus")
            .field("source", &self.source)
            .field("subscriptions", &self.subscriptions.lock().len())
            .finish()
    }
}
