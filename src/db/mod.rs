mod schema;
pub mod backend;
pub mod batch;
pub mod sqlite;
pub mod watch;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

pub use backend::DocumentStore;
pub use batch::{merge_json, SetMode, WriteBatch, WriteOp};
pub use sqlite::SqliteStore;
pub use watch::{SnapshotEvent, Subscription, WatchRegistry};

use crate::config::DatabaseConfig;
use crate::error::Result;

/// A stored record: its id within the collection plus the JSON body.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub data: Value,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.data.clone())?)
    }
}

/// Open and initialize the configured store.
pub fn open(config: &DatabaseConfig) -> Result<Arc<SqliteStore>> {
    let store = SqliteStore::open(&config.path)?;
    store.initialize()?;
    tracing::info!(path = ?config.path, "Document store opened");
    Ok(Arc::new(store))
}
