//! Timeline persistence: media upload, group derivation and document writes.

use serde_json::Value;
use std::sync::Arc;

use super::{derive_group, TimelineEvent, TimelineEventData};
use crate::config::TimelineConfig;
use crate::context::AppContext;
use crate::db::{Document, DocumentStore, SetMode};
use crate::error::{DataError, Result};
use crate::mirror::LiveMirror;
use crate::storage::Uploader;

pub type TimelineMirror = LiveMirror<TimelineEvent>;

pub struct TimelineRepository {
    store: Arc<dyn DocumentStore>,
    uploader: Uploader,
    ctx: AppContext,
    collection: String,
    config: TimelineConfig,
}

impl TimelineRepository {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        uploader: Uploader,
        ctx: AppContext,
        collection: &str,
        config: TimelineConfig,
    ) -> Self {
        Self {
            store,
            uploader,
            ctx,
            collection: collection.to_string(),
            config,
        }
    }

    /// Persist `event`.
    ///
    /// Pending local files are uploaded first and their URLs written into
    /// the media fields. New events get the store-generated id written back.
    pub fn save(&self, event: &mut TimelineEvent) -> Result<()> {
        event.data.validate()?;

        if let Some(file) = event.media_file.take() {
            match self.uploader.resolve_media(&file) {
                Ok(url) => event.data.media.url = url,
                Err(e) => {
                    event.media_file = Some(file);
                    return Err(e);
                }
            }
        }
        if let Some(file) = event.thumbnail_file.take() {
            match self.uploader.resolve_media(&file) {
                Ok(url) => event.data.media.thumbnail = url,
                Err(e) => {
                    event.thumbnail_file = Some(file);
                    return Err(e);
                }
            }
        }

        if event.data.group.is_empty() && self.config.auto_group {
            if let Some(group) = derive_group(&event.data.text.headline, &self.config.group_rules) {
                event.data.group = group.to_string();
            }
        }

        let data = serde_json::to_value(&event.data)?;
        match &event.id {
            Some(id) => {
                self.ctx
                    .errors
                    .track(self.store.set(&self.collection, id, &data, SetMode::Merge))?;
                tracing::info!(id = %id, "Timeline event updated");
            }
            None => {
                let id = self.ctx.errors.track(self.store.add(&self.collection, &data))?;
                tracing::info!(id = %id, "Timeline event created");
                event.id = Some(id);
            }
        }
        Ok(())
    }

    pub fn delete(&self, event: &TimelineEvent) -> Result<()> {
        let id = event
            .id
            .as_deref()
            .ok_or_else(|| DataError::validation("cannot delete a timeline event that was never saved"))?;
        self.ctx.errors.track(self.store.delete(&self.collection, id))?;
        tracing::info!(id, "Timeline event deleted");
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<Option<TimelineEvent>> {
        let doc = self.ctx.errors.track(self.store.get(&self.collection, id))?;
        doc.as_ref().map(decode_event).transpose()
    }

    /// One-shot read of every event, skipping documents that fail to decode.
    pub fn list(&self) -> Result<Vec<TimelineEvent>> {
        let docs = self.ctx.errors.track(self.store.list(&self.collection))?;
        let mut events = Vec::with_capacity(docs.len());
        for doc in &docs {
            match decode_event(doc) {
                Ok(event) => events.push(event),
                Err(e) => {
                    tracing::warn!(id = %doc.id, error = %e, "Skipping undecodable timeline event");
                }
            }
        }
        Ok(events)
    }

    /// Live mirror of the collection.
    pub fn subscribe(&self) -> Result<TimelineMirror> {
        let subscription = self.ctx.errors.track(self.store.subscribe(&self.collection))?;
        Ok(LiveMirror::new(subscription, self.ctx.errors.clone(), decode_event))
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

pub fn decode_event(doc: &Document) -> Result<TimelineEvent> {
    let data: TimelineEventData = match &doc.data {
        Value::Object(_) => doc.decode()?,
        other => {
            return Err(DataError::validation(format!(
                "timeline event {} is not an object: {}",
                doc.id, other
            )))
        }
    };
    Ok(TimelineEvent {
        id: Some(doc.id.clone()),
        data,
        media_file: None,
        thumbnail_file: None,
    })
}
