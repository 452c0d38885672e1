//! Image collaborators
//!
//! The tree engine never talks to blob storage directly. Materialization asks
//! an [`ImageResolver`] for a client-facing URL per stored reference, and the
//! CRUD surface hands uploaded bytes to an [`ImageUploader`].
//!
//! - [`PassthroughResolver`] - stored references are already public URLs
//! - [`LocalImageStore`] - directory-backed blobs with expiring URLs

mod local;

pub use local::LocalImageStore;

use async_trait::async_trait;
use thiserror::Error;

/// Image storage errors
#[derive(Error, Debug)]
pub enum ImageError {
    #[error("Image storage I/O failed for '{name}': {source}")]
    Io {
        name: String,
        source: std::io::Error,
    },

    #[error("Image resolution failed for '{reference}': {reason}")]
    ResolutionFailed { reference: String, reason: String },

    #[error("Image not found: {key}")]
    NotFound { key: String },

    #[error("Image link expired: {key}")]
    Expired { key: String },

    #[error("Empty upload")]
    EmptyUpload,
}

/// Turns a stored image reference into a client-facing URL
///
/// Implementations must not fail: when resolution is impossible they return
/// the stored reference unchanged.
#[async_trait]
pub trait ImageResolver: Send + Sync {
    async fn resolve(&self, stored: &str) -> String;

    /// Resolve an optional reference, keeping `None` and empty values as is
    async fn resolve_opt(&self, stored: Option<&str>) -> Option<String> {
        match stored {
            Some(reference) if !reference.is_empty() => Some(self.resolve(reference).await),
            other => other.map(str::to_string),
        }
    }
}

/// Persists uploaded image bytes
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Store `bytes` and return the reference to persist on the record
    ///
    /// Returns `Ok(None)` when no storage backend is configured.
    async fn upload(
        &self,
        bytes: &[u8],
        content_type: Option<&str>,
        suggested_name: &str,
    ) -> Result<Option<String>, ImageError>;

    /// Remove a blob stored by [`upload`](Self::upload) whose record was never written
    async fn discard(&self, _reference: &str) -> Result<(), ImageError> {
        Ok(())
    }
}

/// Resolver for references that are already usable URLs
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughResolver;

#[async_trait]
impl ImageResolver for PassthroughResolver {
    async fn resolve(&self, stored: &str) -> String {
        stored.to_string()
    }
}

/// Uploader used when no storage is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledUploader;

#[async_trait]
impl ImageUploader for DisabledUploader {
    async fn upload(
        &self,
        _bytes: &[u8],
        _content_type: Option<&str>,
        suggested_name: &str,
    ) -> Result<Option<String>, ImageError> {
        tracing::debug!("Image storage disabled, dropping upload '{}'", suggested_name);
        Ok(None)
    }
}
