use async_trait::async_trait;
use super::traits::{DocumentStore, StorageError};

/// Stand-in used when the configured backend could not be reached at
/// startup. Every call fails with [`StorageError::Unavailable`], which the
/// player store turns into cache-only behaviour.
pub struct OfflineDocumentStore {
    reason: String,
}

impl OfflineDocumentStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn unavailable(&self) -> StorageError {
        StorageError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl DocumentStore for OfflineDocumentStore {
    async fn ping(&self) -> Result<(), StorageError> {
        Err(self.unavailable())
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StorageError> {
        Err(self.unavailable())
    }

    async fn put(&self, _key: &str, _document: &str) -> Result<(), StorageError> {
        Err(self.unavailable())
    }

    async fn delete(&self, _key: &str) -> Result<(), StorageError> {
        Err(self.unavailable())
    }

    async fn exists(&self, _key: &str) -> Result<bool, StorageError> {
        Err(self.unavailable())
    }

    async fn scan_prefix(&self, _prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        Err(self.unavailable())
    }

    fn backend_name(&self) -> &'static str {
        "offline"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_call_is_unavailable() {
        let store = OfflineDocumentStore::new("redis refused connection");
        assert!(matches!(store.ping().await, Err(StorageError::Unavailable(_))));
        assert!(matches!(store.get("player_p1").await, Err(StorageError::Unavailable(_))));
        assert!(matches!(store.put("player_p1", "{}").await, Err(StorageError::Unavailable(_))));
        assert!(matches!(store.scan_prefix("player_").await, Err(StorageError::Unavailable(_))));
        assert_eq!(store.backend_name(), "offline");
    }
}
