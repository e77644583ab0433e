//! Upload helper: resolve an object's durable URL, uploading only when the
//! object is not stored yet.

use std::path::Path;
use std::sync::Arc;

use super::{media_path, object_name, ObjectStore};
use crate::context::AppContext;
use crate::error::Result;
use crate::progress::Progress;

#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    ctx: AppContext,
    images_prefix: String,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, ctx: AppContext, images_prefix: &str) -> Self {
        Self {
            store,
            ctx,
            images_prefix: images_prefix.to_string(),
        }
    }

    /// Durable URL for `path`.
    ///
    /// Existing content is returned as is. When nothing is stored and `file`
    /// is given, the file is uploaded and the URL resolved again through the
    /// same existence check. Without a file the not-found error is returned.
    /// Errors other than not-found are also published to the error channel.
    pub fn resolve_url(&self, path: &str, file: Option<&Path>) -> Result<String> {
        match self.store.download_url(path) {
            Ok(url) => {
                tracing::debug!(path, "Object already stored");
                Ok(url)
            }
            Err(e) if e.is_not_found() => match file {
                Some(file) => {
                    self.upload_file(path, file)?;
                    self.resolve_url(path, None)
                }
                None => Err(e),
            },
            Err(e) => Err(self.ctx.errors.report(e)),
        }
    }

    /// Upload `file` to `path`, tracking progress under the object's name.
    /// The progress entry is removed when the upload finishes either way.
    pub fn upload_file(&self, path: &str, file: &Path) -> Result<()> {
        let name = object_name(path);
        let progress = &self.ctx.progress;
        tracing::info!(path, file = ?file, backend = self.store.backend_name(), "Uploading");

        let result = self.store.upload(path, file, &mut |transferred, total| {
            progress.update(name, Progress::percent_of(transferred, total))
        });
        progress.remove(name);

        result.map_err(|e| {
            tracing::error!(path, error = %e, "Upload failed");
            self.ctx.errors.report(e)
        })
    }

    /// Object path a local media file is stored under.
    pub fn media_path(&self, file: &Path) -> Result<String> {
        media_path(&self.images_prefix, file)
    }

    /// Durable URL for a local media file, uploading it if needed.
    pub fn resolve_media(&self, file: &Path) -> Result<String> {
        let path = self.media_path(file)?;
        self.resolve_url(&path, Some(file))
    }
}
