//! Live collection subscriptions.
//!
//! Every change to a watched collection delivers the full current snapshot to
//! each subscriber; consumers replace their mirror rather than patching it.
//! Dropping a [`Subscription`] unregisters it.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::Document;

#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    /// Complete, ordered contents of the collection.
    Snapshot(Vec<Document>),
    /// The snapshot could not be produced. The subscription stays open.
    Error(String),
}

struct Watcher {
    collection: String,
    sender: mpsc::Sender<SnapshotEvent>,
}

#[derive(Clone, Default)]
pub struct WatchRegistry {
    next_id: Arc<AtomicU64>,
    watchers: Arc<Mutex<HashMap<u64, Watcher>>>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, Watcher>> {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a subscriber whose first event is `initial`.
    pub fn register(&self, collection: &str, initial: SnapshotEvent) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = mpsc::channel();
        let _ = sender.send(initial);

        self.lock().insert(
            id,
            Watcher {
                collection: collection.to_string(),
                sender,
            },
        );
        tracing::debug!(collection, subscription = id, "Subscription registered");

        Subscription {
            id,
            collection: collection.to_string(),
            receiver,
            registry: self.clone(),
        }
    }

    fn unregister(&self, id: u64) {
        if self.lock().remove(&id).is_some() {
            tracing::debug!(subscription = id, "Subscription closed");
        }
    }

    pub fn is_watched(&self, collection: &str) -> bool {
        self.lock().values().any(|w| w.collection == collection)
    }

    /// Distinct collections with at least one subscriber.
    pub fn watched_collections(&self) -> Vec<String> {
        let mut collections: Vec<String> =
            self.lock().values().map(|w| w.collection.clone()).collect();
        collections.sort();
        collections.dedup();
        collections
    }

    /// Deliver `event` to every subscriber of `collection`, pruning any whose
    /// receiving end is gone.
    pub fn publish(&self, collection: &str, event: SnapshotEvent) {
        let mut watchers = self.lock();
        let mut closed = Vec::new();
        for (id, watcher) in watchers.iter() {
            if watcher.collection == collection && watcher.sender.send(event.clone()).is_err() {
                closed.push(*id);
            }
        }
        for id in closed {
            watchers.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

/// Receiving end of a collection subscription.
pub struct Subscription {
    id: u64,
    collection: String,
    receiver: mpsc::Receiver<SnapshotEvent>,
    registry: WatchRegistry,
}

impl Subscription {
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Next pending event, without blocking.
    pub fn try_next(&self) -> Option<SnapshotEvent> {
        self.receiver.try_recv().ok()
    }

    /// Wait up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: Duration) -> Option<SnapshotEvent> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// All pending events, oldest first.
    pub fn drain(&self) -> Vec<SnapshotEvent> {
        self.receiver.try_iter().collect()
    }

    pub fn close(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
