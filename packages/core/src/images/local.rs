//! Directory-backed image storage
//!
//! Uploaded blobs are written to `{root}/{file}` and referenced as
//! `{public_base}/{bucket}/{file}`. Resolution re-derives the key from the
//! last path segment of a stored reference and issues a URL that carries an
//! `expires` unix timestamp, which [`LocalImageStore::read`] checks.

use super::{ImageError, ImageResolver, ImageUploader};
use async_trait::async_trait;
use chrono::Utc;
use regex::Regex;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

const UNSAFE_CHARS_PATTERN: &str = r"[^A-Za-z0-9._-]";

fn unsafe_chars() -> &'static Regex {
    static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();
    UNSAFE_CHARS.get_or_init(|| Regex::new(UNSAFE_CHARS_PATTERN).expect("valid file name pattern"))
}

/// Reduce a client-supplied file name to `[A-Za-z0-9._-]`
///
/// Leading dots are stripped so the result can never name a hidden file or a
/// parent directory. Returns `None` when nothing usable is left.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned = unsafe_chars().replace_all(base, "");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned.to_string())
    }
}

/// Storage key of a reference: its last path segment, query and fragment removed
fn key_of(reference: &str) -> &str {
    let without_fragment = reference.split('#').next().unwrap_or(reference);
    let without_query = without_fragment.split('?').next().unwrap_or(without_fragment);
    without_query.rsplit('/').next().unwrap_or(without_query)
}

/// Image store writing into a local directory
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root: PathBuf,
    bucket: String,
    public_base: String,
    ttl: Duration,
}

impl LocalImageStore {
    pub fn new(
        root: PathBuf,
        bucket: impl Into<String>,
        public_base: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            root,
            bucket: bucket.into(),
            public_base: public_base.into().trim_end_matches('/').to_string(),
            ttl,
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    fn reference_for(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_base, self.bucket, key)
    }

    /// Build a time-limited URL for a stored reference
    pub fn try_resolve(&self, stored: &str) -> Result<String, ImageError> {
        let key = key_of(stored);
        if sanitize_file_name(key).as_deref() != Some(key) {
            return Err(ImageError::ResolutionFailed {
                reference: stored.to_string(),
                reason: "no usable storage key".to_string(),
            });
        }

        let expires = Utc::now().timestamp() + self.ttl.as_secs() as i64;
        Ok(format!("{}?expires={}", self.reference_for(key), expires))
    }

    /// Read a stored blob through a resolved URL's key and expiry
    pub async fn read(&self, key: &str, expires: i64) -> Result<Vec<u8>, ImageError> {
        if expires < Utc::now().timestamp() {
            return Err(ImageError::Expired {
                key: key.to_string(),
            });
        }
        if sanitize_file_name(key).as_deref() != Some(key) {
            return Err(ImageError::NotFound {
                key: key.to_string(),
            });
        }

        tokio::fs::read(self.root.join(key))
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => ImageError::NotFound {
                    key: key.to_string(),
                },
                _ => ImageError::Io {
                    name: key.to_string(),
                    source: e,
                },
            })
    }
}

#[async_trait]
impl ImageResolver for LocalImageStore {
    async fn resolve(&self, stored: &str) -> String {
        if stored.is_empty() {
            return String::new();
        }
        match self.try_resolve(stored) {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("{}; serving stored reference", e);
                stored.to_string()
            }
        }
    }
}

#[async_trait]
impl ImageUploader for LocalImageStore {
    async fn upload(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        suggested_name: &str,
    ) -> Result<Option<String>, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::EmptyUpload);
        }

        let file_name = sanitize_file_name(suggested_name)
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ImageError::Io {
                name: file_name.clone(),
                source: e,
            })?;
        tokio::fs::write(self.root.join(&file_name), bytes)
            .await
            .map_err(|e| ImageError::Io {
                name: file_name.clone(),
                source: e,
            })?;

        tracing::info!(
            "Stored image '{}' ({} bytes, {})",
            file_name,
            bytes.len(),
            content_type.unwrap_or("application/octet-stream")
        );
        Ok(Some(self.reference_for(&file_name)))
    }

    async fn discard(&self, reference: &str) -> Result<(), ImageError> {
        let key = key_of(reference);
        if sanitize_file_name(key).as_deref() != Some(key) {
            return Err(ImageError::NotFound {
                key: key.to_string(),
            });
        }

        match tokio::fs::remove_file(self.root.join(key)).await {
            Ok(()) => {
                tracing::info!("Removed image '{}'", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ImageError::Io {
                name: key.to_string(),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> LocalImageStore {
        LocalImageStore::new(
            dir.path().join("blobs"),
            "catalog-images",
            "http://localhost:5000/images/",
            Duration::from_secs(3600),
        )
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("lapel wide.jpg").as_deref(), Some("lapelwide.jpg"));
        assert_eq!(sanitize_file_name("../../etc/passwd").as_deref(), Some("passwd"));
        assert_eq!(sanitize_file_name("C:\\photos\\notch.png").as_deref(), Some("notch.png"));
        assert_eq!(sanitize_file_name(".."), None);
        assert_eq!(sanitize_file_name("äöü"), None);
    }

    #[test]
    fn test_key_extraction() {
        assert_eq!(key_of("https://cdn/b/notch.png?sig=1#top"), "notch.png");
        assert_eq!(key_of("notch.png"), "notch.png");
    }

    #[tokio::test]
    async fn test_upload_then_resolve_then_read() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);

        let reference = store
            .upload(b"PNG", Some("image/png"), "peak lapel.png")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            reference,
            "http://localhost:5000/images/catalog-images/peaklapel.png"
        );

        let url = store.resolve(&reference).await;
        assert!(url.starts_with("http://localhost:5000/images/catalog-images/peaklapel.png?expires="));
        let expires: i64 = url.rsplit('=').next().unwrap().parse().unwrap();

        assert_eq!(store.read("peaklapel.png", expires).await.unwrap(), b"PNG");
    }

    #[tokio::test]
    async fn test_unnamed_upload_gets_generated_name() {
        let dir = TempDir::new().unwrap();
        let reference = store(&dir)
            .upload(b"JPG", None, "???")
            .await
            .unwrap()
            .unwrap();
        let key = key_of(&reference);
        assert_eq!(key.len(), 32);
        assert!(dir.path().join("blobs").join(key).exists());
    }

    #[tokio::test]
    async fn test_resolution_failure_falls_back() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.resolve("https://cdn/folder/").await, "https://cdn/folder/");
        assert_eq!(store.resolve("").await, "");
    }

    #[tokio::test]
    async fn test_expired_and_missing_reads() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let past = Utc::now().timestamp() - 10;
        let future = Utc::now().timestamp() + 10;

        assert!(matches!(
            store.read("x.png", past).await,
            Err(ImageError::Expired { .. })
        ));
        assert!(matches!(
            store.read("x.png", future).await,
            Err(ImageError::NotFound { .. })
        ));
        assert!(matches!(
            store.read("../x.png", future).await,
            Err(ImageError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_discard_removes_uploaded_blob() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let reference = store
            .upload(b"JPG", Some("image/jpeg"), "notch.jpg")
            .await
            .unwrap()
            .unwrap();
        let path = dir.path().join("blobs").join("notch.jpg");
        assert!(path.exists());

        store.discard(&reference).await.unwrap();
        assert!(!path.exists());
        // Already gone is fine
        store.discard(&reference).await.unwrap();
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            store(&dir).upload(b"", None, "a.png").await,
            Err(ImageError::EmptyUpload)
        ));
    }
}
