use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use super::node::{Node, NodeId};

/// A peer announcement that passed token validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announce {
    pub info_hash: [u8; 20],
    pub node_id: NodeId,
    pub peer: SocketAddr,
}

/// Receives routing events. Every method has an empty default, so observers
/// only implement what they care about.
///
/// Callbacks run on the thread handling the message and must not block.
pub trait DhtObserver: Send + Sync {
    fn node_added(&self, _node: &Node) {}

    fn node_updated(&self, _node: &Node) {}

    fn announce_accepted(&self, _announce: &Announce) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Registry of observers.
///
/// Subscriptions stay active until [`unsubscribe`](Self::unsubscribe) is
/// called with the returned id; the registry keeps its observers alive.
#[derive(Default)]
pub struct Subscribers {
    next_id: AtomicU64,
    observers: RwLock<Vec<(SubscriptionId, Arc<dyn DhtObserver>)>>,
}

impl Subscribers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn DhtObserver>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.write().push((id, observer));
        id
    }

    /// Returns `false` if the subscription was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|(sub, _)| *sub != id);
        observers.len() != before
    }

    pub fn len(&self) -> usize {
        self.observers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().is_empty()
    }

    /// Calls `f` for each observer. The list is copied first so observers may
    /// subscribe or unsubscribe from inside a callback.
    pub(crate) fn notify(&self, f: impl Fn(&dyn DhtObserver)) {
        let observers: Vec<_> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            f(observer.as_ref());
        }
    }
}
