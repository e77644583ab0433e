//! Document store abstraction.
//!
//! Repositories talk to the store through this trait so the SQLite backend
//! can be swapped for a hosted one without touching relationship logic.

use serde_json::Value;

use super::batch::{SetMode, WriteBatch};
use super::watch::Subscription;
use super::Document;
use crate::error::Result;

/// Trait for document store implementations.
pub trait DocumentStore: Send + Sync {
    // === Reads ===

    /// Fetch one document by collection and id
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>>;

    /// Documents whose string field at `field` (dot-separated path) equals `value`
    fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>>;

    /// All documents of a collection, ordered by id
    fn list(&self, collection: &str) -> Result<Vec<Document>>;

    // === Writes ===

    /// Create a document with a store-generated id and return the id
    fn add(&self, collection: &str, data: &Value) -> Result<String>;

    /// Commit every write of `batch` atomically
    fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Write a single document
    fn set(&self, collection: &str, id: &str, data: &Value, mode: SetMode) -> Result<()> {
        let mut batch = WriteBatch::new();
        match mode {
            SetMode::Overwrite => batch.set(collection, id, data.clone()),
            SetMode::Merge => batch.merge(collection, id, data.clone()),
        };
        self.commit(batch)
    }

    /// Delete a single document; deleting a missing document is not an error
    fn delete(&self, collection: &str, id: &str) -> Result<()> {
        let mut batch = WriteBatch::new();
        batch.delete(collection, id);
        self.commit(batch)
    }

    // === Subscriptions ===

    /// Subscribe to full-snapshot notifications for a collection. The current
    /// snapshot is delivered first.
    fn subscribe(&self, collection: &str) -> Result<Subscription>;
}
