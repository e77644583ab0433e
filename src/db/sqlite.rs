//! SQLite backend implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::backend::DocumentStore;
use super::batch::{merge_json, SetMode, WriteBatch, WriteOp};
use super::schema::{MIGRATIONS, SCHEMA};
use super::watch::{SnapshotEvent, Subscription, WatchRegistry};
use super::Document;
use crate::error::{DataError, Result};

pub struct SqliteStore {
    conn: Mutex<Connection>,
    watchers: WatchRegistry,
    /// Last seen `PRAGMA data_version`, for noticing commits by other connections.
    data_version: Mutex<Option<i64>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        Ok(Self::with_connection(conn))
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self::with_connection(conn))
    }

    fn with_connection(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            watchers: WatchRegistry::new(),
            data_version: Mutex::new(None),
        }
    }

    pub fn initialize(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch(SCHEMA)?;
        for migration in MIGRATIONS {
            let _ = conn.execute(migration, []);
        }
        let version: i64 = conn.pragma_query_value(None, "data_version", |row| row.get(0))?;
        *self.data_version.lock().unwrap_or_else(|e| e.into_inner()) = Some(version);
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn watchers(&self) -> &WatchRegistry {
        &self.watchers
    }

    /// Re-notify subscribers when another connection (usually another
    /// process) has committed since the last check. Returns whether a change
    /// was seen.
    pub fn poll_external_changes(&self) -> Result<bool> {
        let version: i64 = self
            .lock()
            .pragma_query_value(None, "data_version", |row| row.get(0))?;

        let changed = {
            let mut last = self.data_version.lock().unwrap_or_else(|e| e.into_inner());
            let changed = matches!(*last, Some(previous) if previous != version);
            *last = Some(version);
            changed
        };

        if changed {
            tracing::debug!(version, "External change detected");
            self.notify(self.watchers.watched_collections());
        }
        Ok(changed)
    }

    /// Push a fresh snapshot of each watched collection in `collections`.
    fn notify<I>(&self, collections: I)
    where
        I: IntoIterator<Item = String>,
    {
        for collection in collections {
            if !self.watchers.is_watched(&collection) {
                continue;
            }
            let event = match load_collection(&self.lock(), &collection) {
                Ok(docs) => SnapshotEvent::Snapshot(docs),
                Err(e) => {
                    tracing::error!(collection = %collection, error = %e, "Failed to build snapshot");
                    SnapshotEvent::Error(e.to_string())
                }
            };
            self.watchers.publish(&collection, event);
        }
    }
}

impl DocumentStore for SqliteStore {
    fn get(&self, collection: &str, id: &str) -> Result<Option<Document>> {
        validate_path(collection, id)?;
        let row = self
            .lock()
            .query_row(
                "SELECT id, data, updated_at FROM documents WHERE collection = ? AND id = ?",
                params![collection, id],
                read_row,
            )
            .optional()?;
        row.map(into_document).transpose()
    }

    fn query_eq(&self, collection: &str, field: &str, value: &str) -> Result<Vec<Document>> {
        validate_collection(collection)?;
        if field.is_empty() {
            return Err(DataError::validation("query field cannot be empty"));
        }
        let json_path = format!("$.{}", field);

        let conn = self.lock();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, data, updated_at
            FROM documents
            WHERE collection = ? AND json_extract(data, ?) = ?
            ORDER BY id
            "#,
        )?;
        let rows = stmt
            .query_map(params![collection, json_path, value], read_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter().map(into_document).collect()
    }

    fn list(&self, collection: &str) -> Result<Vec<Document>> {
        validate_collection(collection)?;
        load_collection(&self.lock(), collection)
    }

    fn add(&self, collection: &str, data: &Value) -> Result<String> {
        validate_collection(collection)?;
        let id: String = self
            .lock()
            .query_row("SELECT lower(hex(randomblob(10)))", [], |row| row.get(0))?;
        self.set(collection, &id, data, SetMode::Overwrite)?;
        tracing::debug!(collection, id = %id, "Document created");
        Ok(id)
    }

    fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        for op in batch.ops() {
            validate_path(op.collection(), op.id())?;
        }

        let collections = batch.collections();
        let writes = batch.len();
        {
            let mut conn = self.lock();
            let tx = conn.transaction()?;
            let now = Utc::now().to_rfc3339();

            for op in batch.into_ops() {
                match op {
                    WriteOp::Set {
                        collection,
                        id,
                        data,
                        mode,
                    } => {
                        if !data.is_object() {
                            // Dropping `tx` rolls back the writes already applied.
                            return Err(DataError::validation(format!(
                                "document {}/{} must be a JSON object",
                                collection, id
                            )));
                        }
                        let data = match mode {
                            SetMode::Overwrite => data,
                            SetMode::Merge => match load_data(&tx, &collection, &id)? {
                                Some(mut existing) => {
                                    merge_json(&mut existing, data);
                                    existing
                                }
                                None => data,
                            },
                        };
                        tx.execute(
                            r#"
                            INSERT INTO documents (collection, id, data, created_at, updated_at)
                            VALUES (?1, ?2, ?3, ?4, ?4)
                            ON CONFLICT(collection, id)
                            DO UPDATE SET data = excluded.data, updated_at = excluded.updated_at
                            "#,
                            params![collection, id, serde_json::to_string(&data)?, now],
                        )?;
                    }
                    WriteOp::Delete { collection, id } => {
                        tx.execute(
                            "DELETE FROM documents WHERE collection = ? AND id = ?",
                            params![collection, id],
                        )?;
                    }
                }
            }
            tx.commit()?;
        }

        tracing::debug!(writes, "Batch committed");
        self.notify(collections);
        Ok(())
    }

    fn subscribe(&self, collection: &str) -> Result<Subscription> {
        validate_collection(collection)?;
        // Holding the connection across snapshot and registration means no
        // commit can land in between unnoticed.
        let conn = self.lock();
        let initial = match load_collection(&conn, collection) {
            Ok(docs) => SnapshotEvent::Snapshot(docs),
            Err(e) => SnapshotEvent::Error(e.to_string()),
        };
        Ok(self.watchers.register(collection, initial))
    }
}

type RawRow = (String, String, String);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?))
}

fn into_document((id, data, updated_at): RawRow) -> Result<Document> {
    Ok(Document {
        id,
        data: serde_json::from_str(&data)?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc)),
    })
}

fn load_collection(conn: &Connection, collection: &str) -> Result<Vec<Document>> {
    let mut stmt = conn.prepare(
        "SELECT id, data, updated_at FROM documents WHERE collection = ? ORDER BY id",
    )?;
    let rows = stmt
        .query_map([collection], read_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(into_document).collect()
}

fn load_data(conn: &Connection, collection: &str, id: &str) -> Result<Option<Value>> {
    let data: Option<String> = conn
        .query_row(
            "SELECT data FROM documents WHERE collection = ? AND id = ?",
            params![collection, id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(data.map(|d| serde_json::from_str(&d)).transpose()?)
}

fn validate_collection(collection: &str) -> Result<()> {
    if collection.is_empty() || collection.contains('/') {
        return Err(DataError::validation(format!(
            "invalid collection name {:?}",
            collection
        )));
    }
    Ok(())
}

fn validate_path(collection: &str, id: &str) -> Result<()> {
    validate_collection(collection)?;
    if id.is_empty() || id.contains('/') {
        return Err(DataError::validation(format!("invalid document id {:?}", id)));
    }
    Ok(())
}
