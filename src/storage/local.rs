use std::ffi::OsString;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::{validate_object_path, ObjectStore, ProgressReader};
use crate::error::{DataError, Result};

/// Suffix of in-flight uploads. Such paths are never objects.
const STAGING_SUFFIX: &str = ".part";

/// Object store backed by a directory, for offline use and tests.
pub struct LocalObjectStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf, public_base_url: Option<String>) -> Self {
        Self {
            root,
            public_base_url,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_file(&self, path: &str) -> Result<PathBuf> {
        validate_object_path(path)?;
        if path.ends_with(STAGING_SUFFIX) {
            return Err(DataError::validation(format!(
                "object path {} uses the reserved {} suffix",
                path, STAGING_SUFFIX
            )));
        }
        Ok(self.root.join(path))
    }

    fn url_for(&self, path: &str, file: &Path) -> String {
        match &self.public_base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), path),
            None => format!("file://{}", file.display()),
        }
    }
}

impl ObjectStore for LocalObjectStore {
    fn download_url(&self, path: &str) -> Result<String> {
        let file = self.object_file(path)?;
        if file.is_file() {
            Ok(self.url_for(path, &file))
        } else {
            Err(DataError::not_found(format!("object {}", path)))
        }
    }

    fn upload(&self, path: &str, file: &Path, on_progress: &mut dyn FnMut(u64, u64)) -> Result<()> {
        let target = self.object_file(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }

        let source = File::open(file)?;
        let total = source.metadata()?.len();
        let mut reader = ProgressReader::new(BufReader::new(source), total, on_progress);

        // Write next to the target and rename, so a failed copy never leaves
        // a partial object that the existence check would accept.
        let partial = staging_file(&target);
        let result = (|| -> std::io::Result<()> {
            let mut writer = BufWriter::new(File::create(&partial)?);
            let mut buffer = [0u8; 8192];
            loop {
                let bytes_read = reader.read(&mut buffer)?;
                if bytes_read == 0 {
                    break;
                }
                writer.write_all(&buffer[..bytes_read])?;
            }
            writer.flush()?;
            fs::rename(&partial, &target)
        })();

        if let Err(e) = result {
            let _ = fs::remove_file(&partial);
            return Err(e.into());
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "local"
    }
}

/// `images/a.jpg` stages as `images/a.jpg.part`, so objects differing only
/// in extension never share a staging file.
fn staging_file(target: &Path) -> PathBuf {
    let mut name = target.file_name().map(OsString::from).unwrap_or_default();
    name.push(STAGING_SUFFIX);
    target.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_missing_object_is_not_found() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), None);
        let err = store.download_url("images/a.jpg").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_upload_then_resolve() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("portrait.jpg");
        fs::write(&source, vec![1u8; 20_000]).unwrap();

        let store = LocalObjectStore::new(
            dir.path().join("bucket"),
            Some("https://media.example.org/".to_string()),
        );
        let mut last = (0, 0);
        store
            .upload("images/portrait.jpg", &source, &mut |sent, total| last = (sent, total))
            .unwrap();

        assert_eq!(last, (20_000, 20_000));
        assert_eq!(
            store.download_url("images/portrait.jpg").unwrap(),
            "https://media.example.org/images/portrait.jpg"
        );
        assert!(!dir.path().join("bucket/images/portrait.jpg.part").exists());
    }

    #[test]
    fn test_upload_missing_source_fails() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), None);
        let result = store.upload("images/a.jpg", &dir.path().join("nope.jpg"), &mut |_, _| {});
        assert!(matches!(result, Err(DataError::Io(_))));
        assert!(store.download_url("images/a.jpg").is_err());
    }

    #[test]
    fn test_file_urls_without_base() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("a.jpg");
        fs::write(&source, b"jpeg").unwrap();

        let store = LocalObjectStore::new(dir.path().join("bucket"), None);
        store.upload("images/a.jpg", &source, &mut |_, _| {}).unwrap();
        let url = store.download_url("images/a.jpg").unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("images/a.jpg"));
    }

    #[test]
    fn test_staging_file_keeps_extension() {
        assert_eq!(
            staging_file(Path::new("bucket/images/a.jpg")),
            PathBuf::from("bucket/images/a.jpg.part")
        );
        assert_ne!(
            staging_file(Path::new("bucket/images/a.jpg")),
            staging_file(Path::new("bucket/images/a.png"))
        );
    }

    #[test]
    fn test_staging_paths_are_not_objects() {
        let dir = tempdir().unwrap();
        let store = LocalObjectStore::new(dir.path().to_path_buf(), None);
        fs::create_dir_all(dir.path().join("images")).unwrap();
        fs::write(dir.path().join("images/a.jpg.part"), b"half").unwrap();

        let err = store.download_url("images/a.jpg.part").unwrap_err();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(store.download_url("images/a.jpg").unwrap_err().is_not_found());
    }
}
