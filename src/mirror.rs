//! In-memory mirror of a subscribed collection.
//!
//! Each snapshot notification replaces the whole mirror. Failures are routed
//! to the error channel and never end the subscription.

use std::time::Duration;

use crate::context::ErrorChannel;
use crate::db::{Document, SnapshotEvent, Subscription};
use crate::error::Result;

pub struct LiveMirror<T> {
    subscription: Subscription,
    items: Vec<T>,
    errors: ErrorChannel,
    decode: fn(&Document) -> Result<T>,
}

impl<T: Clone> LiveMirror<T> {
    pub fn new(
        subscription: Subscription,
        errors: ErrorChannel,
        decode: fn(&Document) -> Result<T>,
    ) -> Self {
        let mut mirror = Self {
            subscription,
            items: Vec::new(),
            errors,
            decode,
        };
        // The store queues the current snapshot on subscribe.
        mirror.refresh();
        mirror
    }

    /// Apply every pending notification. Returns true if the contents were replaced.
    pub fn refresh(&mut self) -> bool {
        let mut replaced = false;
        for event in self.subscription.drain() {
            replaced |= self.apply(event);
        }
        replaced
    }

    /// Block up to `timeout` for a notification, then apply everything pending.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        match self.subscription.next_timeout(timeout) {
            Some(event) => {
                let replaced = self.apply(event);
                self.refresh() || replaced
            }
            None => false,
        }
    }

    fn apply(&mut self, event: SnapshotEvent) -> bool {
        match event {
            SnapshotEvent::Snapshot(docs) => {
                let mut items = Vec::with_capacity(docs.len());
                for doc in &docs {
                    match (self.decode)(doc) {
                        Ok(item) => items.push(item),
                        Err(e) => {
                            tracing::warn!(id = %doc.id, error = %e, "Skipping undecodable document");
                            self.errors
                                .set(format!("{}/{}: {}", self.subscription.collection(), doc.id, e));
                        }
                    }
                }
                self.items = items;
                true
            }
            SnapshotEvent::Error(message) => {
                self.errors.set(message);
                false
            }
        }
    }

    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Stop receiving notifications.
    pub fn close(self) {}
}
