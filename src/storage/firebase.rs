//! Hosted bucket access over the Firebase Storage REST API.

use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use url::Url;

use super::{validate_object_path, ObjectStore, ProgressReader};
use crate::error::{DataError, Result};

pub struct FirebaseStorage {
    endpoint: Url,
    bucket: String,
    agent: ureq::Agent,
}

/// The subset of object metadata needed to build a download URL.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectMetadata {
    name: String,
    #[serde(default)]
    download_tokens: Option<String>,
}

impl FirebaseStorage {
    pub fn new(endpoint: &str, bucket: &str, timeout_secs: u64) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| DataError::validation(format!("invalid storage endpoint {}: {}", endpoint, e)))?;
        if endpoint.cannot_be_a_base() {
            return Err(DataError::validation(format!("invalid storage endpoint {}", endpoint)));
        }

        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(timeout_secs))
            .build();

        Ok(Self {
            endpoint,
            bucket: bucket.to_string(),
            agent,
        })
    }

    /// `<endpoint>/b/<bucket>/o[/<object>]`. The object path is pushed as a
    /// single segment, so its `/` separators are encoded as `%2F`.
    fn bucket_url(&self, object: Option<&str>) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["b", self.bucket.as_str(), "o"]);
            if let Some(object) = object {
                segments.push(object);
            }
        }
        url
    }

    fn download_url_for(&self, metadata: &ObjectMetadata) -> String {
        let mut url = self.bucket_url(Some(&metadata.name));
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("alt", "media");
            // Several tokens may be listed; any of them grants access.
            if let Some(token) = metadata
                .download_tokens
                .as_deref()
                .and_then(|tokens| tokens.split(',').next())
                .filter(|t| !t.is_empty())
            {
                query.append_pair("token", token);
            }
        }
        url.into()
    }
}

impl ObjectStore for FirebaseStorage {
    fn download_url(&self, path: &str) -> Result<String> {
        validate_object_path(path)?;

        let response = self
            .agent
            .get(self.bucket_url(Some(path)).as_str())
            .call()
            .map_err(|e| map_http_error(e, path))?;

        let metadata: ObjectMetadata = response
            .into_json()
            .map_err(|e| DataError::backend(format!("Failed to parse object metadata: {}", e)))?;

        Ok(self.download_url_for(&metadata))
    }

    fn upload(&self, path: &str, file: &Path, on_progress: &mut dyn FnMut(u64, u64)) -> Result<()> {
        validate_object_path(path)?;

        let source = File::open(file)?;
        let total = source.metadata()?.len();
        let reader = ProgressReader::new(BufReader::new(source), total, on_progress);

        self.agent
            .post(self.bucket_url(None).as_str())
            .query("uploadType", "media")
            .query("name", path)
            .set("Content-Type", content_type(path))
            .set("Content-Length", &total.to_string())
            .send(reader)
            .map_err(|e| map_http_error(e, path))?;

        tracing::info!(path, bytes = total, "Object uploaded");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "firebase"
    }
}

fn map_http_error(err: ureq::Error, path: &str) -> DataError {
    match err {
        ureq::Error::Status(404, _) => DataError::not_found(format!("object {}", path)),
        ureq::Error::Status(code, response) => {
            let body = response.into_string().unwrap_or_default();
            DataError::backend(format!("storage request for {} failed with HTTP {}: {}", path, code, body))
        }
        ureq::Error::Transport(transport) => {
            DataError::backend(format!("storage request for {} failed: {}", path, transport))
        }
    }
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit('.').next().unwrap_or("").to_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "pdf" => "application/pdf",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage() -> FirebaseStorage {
        FirebaseStorage::new("https://firebasestorage.googleapis.com/v0/", "twyfels.appspot.com", 5).unwrap()
    }

    #[test]
    fn test_object_path_is_one_segment() {
        let storage = storage();
        assert_eq!(
            storage.bucket_url(Some("images/oupa 1.jpg")).as_str(),
            "https://firebasestorage.googleapis.com/v0/b/twyfels.appspot.com/o/images%2Foupa%201.jpg"
        );
        assert!(storage.bucket_url(Some("é")).as_str().ends_with("/o/%C3%A9"));
        assert_eq!(
            storage.bucket_url(None).as_str(),
            "https://firebasestorage.googleapis.com/v0/b/twyfels.appspot.com/o"
        );
    }

    #[test]
    fn test_invalid_endpoint_is_rejected() {
        let err = FirebaseStorage::new("not a url", "bucket", 5).err().unwrap();
        assert!(matches!(err, DataError::Validation(_)));
        assert!(FirebaseStorage::new("mailto:someone@example.org", "bucket", 5).is_err());
    }

    #[test]
    fn test_download_url_uses_first_token() {
        let storage = storage();
        let metadata = ObjectMetadata {
            name: "images/a.jpg".to_string(),
            download_tokens: Some("tok1,tok2".to_string()),
        };
        assert_eq!(
            storage.download_url_for(&metadata),
            "https://firebasestorage.googleapis.com/v0/b/twyfels.appspot.com/o/images%2Fa.jpg?alt=media&token=tok1"
        );

        let untokened = ObjectMetadata {
            name: "images/a.jpg".to_string(),
            download_tokens: None,
        };
        assert!(storage.download_url_for(&untokened).ends_with("?alt=media"));
    }

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("images/A.JPG"), "image/jpeg");
        assert_eq!(content_type("docs/letter.pdf"), "application/pdf");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }

    #[test]
    fn test_metadata_parsing() {
        let metadata: ObjectMetadata = serde_json::from_str(
            r#"{"name": "images/a.jpg", "bucket": "b", "downloadTokens": "abc", "size": "12"}"#,
        )
        .unwrap();
        assert_eq!(metadata.name, "images/a.jpg");
        assert_eq!(metadata.download_tokens.as_deref(), Some("abc"));
    }
}
