//! Object storage for media files.

pub mod firebase;
pub mod local;
pub mod upload;

use std::io::Read;
use std::path::Path;

pub use firebase::FirebaseStorage;
pub use local::LocalObjectStore;
pub use upload::Uploader;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::{DataError, Result};

/// Trait for object storage backends.
pub trait ObjectStore: Send + Sync {
    /// Durable URL for the object at `path`. Fails with `DataError::NotFound`
    /// when nothing is stored there.
    fn download_url(&self, path: &str) -> Result<String>;

    /// Store the contents of `file` at `path`, calling
    /// `on_progress(bytes_transferred, total_bytes)` as data goes out.
    fn upload(&self, path: &str, file: &Path, on_progress: &mut dyn FnMut(u64, u64)) -> Result<()>;

    /// Backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Create the object store selected by configuration.
pub fn create_object_store(config: &StorageConfig) -> Result<Box<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Local => Ok(Box::new(LocalObjectStore::new(
            config.local_root.clone(),
            config.public_base_url.clone(),
        ))),
        StorageBackend::Firebase => {
            let bucket = config
                .bucket
                .as_deref()
                .ok_or_else(|| DataError::validation("storage.bucket is not configured"))?;
            Ok(Box::new(FirebaseStorage::new(
                &config.endpoint,
                bucket,
                config.timeout_secs,
            )?))
        }
    }
}

/// Last segment of an object path; progress entries are keyed by it.
pub fn object_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Object path for a local media file: `<prefix>/<basename>`.
/// Both `/` and `\` count as separators so paths picked on any platform work.
pub fn media_path(prefix: &str, file: &Path) -> Result<String> {
    let raw = file.to_string_lossy();
    let name = raw
        .rsplit(|c| c == '/' || c == '\\')
        .next()
        .filter(|n| !n.is_empty())
        .ok_or_else(|| DataError::validation(format!("no file name in {}", file.display())))?;

    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", prefix, name))
    }
}

/// Reject empty paths and anything that could escape the bucket root.
pub(crate) fn validate_object_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.split('/').any(|segment| segment.is_empty() || segment == "..")
    {
        return Err(DataError::validation(format!("invalid object path {:?}", path)));
    }
    Ok(())
}

/// Reader adapter that reports cumulative bytes read.
pub(crate) struct ProgressReader<'a, R> {
    inner: R,
    transferred: u64,
    total: u64,
    on_progress: &'a mut dyn FnMut(u64, u64),
}

impl<'a, R: Read> ProgressReader<'a, R> {
    pub(crate) fn new(inner: R, total: u64, on_progress: &'a mut dyn FnMut(u64, u64)) -> Self {
        Self {
            inner,
            transferred: 0,
            total,
            on_progress,
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            self.transferred += n as u64;
            (self.on_progress)(self.transferred, self.total);
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_media_path() {
        assert_eq!(
            media_path("images", &PathBuf::from("/home/me/Pictures/oupa.jpg")).unwrap(),
            "images/oupa.jpg"
        );
        assert_eq!(
            media_path("images/", &PathBuf::from(r"C:\Users\me\ouma.png")).unwrap(),
            "images/ouma.png"
        );
        assert_eq!(media_path("", &PathBuf::from("a.jpg")).unwrap(), "a.jpg");
        assert!(media_path("images", &PathBuf::from("dir/")).is_err());
    }

    #[test]
    fn test_object_name() {
        assert_eq!(object_name("images/oupa.jpg"), "oupa.jpg");
        assert_eq!(object_name("oupa.jpg"), "oupa.jpg");
    }

    #[test]
    fn test_validate_object_path() {
        assert!(validate_object_path("images/a.jpg").is_ok());
        assert!(validate_object_path("").is_err());
        assert!(validate_object_path("/etc/passwd").is_err());
        assert!(validate_object_path("images/../../x").is_err());
        assert!(validate_object_path("images//a.jpg").is_err());
    }

    #[test]
    fn test_progress_reader_reports_cumulative_bytes() {
        let data = vec![7u8; 10];
        let mut seen = Vec::new();
        let mut on_progress = |sent: u64, total: u64| seen.push((sent, total));
        {
            let mut reader = ProgressReader::new(&data[..], 10, &mut on_progress);
            let mut buf = [0u8; 4];
            while reader.read(&mut buf).unwrap() > 0 {}
        }
        assert_eq!(seen, vec![(4, 10), (8, 10), (10, 10)]);
    }
}
