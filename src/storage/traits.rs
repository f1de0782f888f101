use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Document not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Durable document store shared by every server instance.
///
/// Documents are opaque JSON text addressed by namespaced keys
/// (`player_<id>`). Decoding is the caller's concern, so a corrupted
/// document surfaces as a decode failure rather than a backend error.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Cheap connectivity probe.
    async fn ping(&self) -> Result<(), StorageError>;

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or replace.
    async fn put(&self, key: &str, document: &str) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.get(key).await?.is_some())
    }

    /// All `(key, document)` pairs whose key starts with `prefix`, ordered by key.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError>;

    /// Release connections. The store may not be used afterwards.
    async fn close(&self) {}

    /// Short label used in logs and metrics.
    fn backend_name(&self) -> &'static str;
}
