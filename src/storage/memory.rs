use async_trait::async_trait;
use dashmap::DashMap;
use super::traits::{DocumentStore, StorageError};

/// Process-local document store. Several contexts sharing one `Arc` of this
/// store behave like instances sharing a remote database.
pub struct MemoryDocumentStore {
    data: DashMap<String, String>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Get current document count
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn clear(&self) {
        self.data.clear();
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.data.get(key).map(|r| r.value().clone()))
    }

    async fn put(&self, key: &str, document: &str) -> Result<(), StorageError> {
        self.data.insert(key.to_string(), document.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.data.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.data.contains_key(key))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let mut found: Vec<(String, String)> = self
            .data
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_new_store_is_empty() {
        let store = MemoryDocumentStore::new();
        assert!(store.is_empty());
        assert_eq!(store.len(), 0);
        assert!(store.ping().await.is_ok());
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryDocumentStore::new();
        store.put("player_p1", r#"{"data":{}}"#).await.unwrap();

        let doc = store.get("player_p1").await.unwrap();
        assert_eq!(doc.as_deref(), Some(r#"{"data":{}}"#));
        assert!(store.exists("player_p1").await.unwrap());
    }

    #[tokio::test]
    async fn test_get_nonexistent_returns_none() {
        let store = MemoryDocumentStore::new();
        assert!(store.get("player_missing").await.unwrap().is_none());
        assert!(!store.exists("player_missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_nonexistent_is_ok() {
        let store = MemoryDocumentStore::new();
        assert!(store.delete("player_missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let store = MemoryDocumentStore::new();
        store.put("player_p1", "v1").await.unwrap();
        store.put("player_p1", "v2").await.unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("player_p1").await.unwrap().as_deref(), Some("v2"));
    }

    #[tokio::test]
    async fn test_scan_prefix_is_sorted_and_exact() {
        let store = MemoryDocumentStore::new();
        store.put("player_b", "b").await.unwrap();
        store.put("player_a", "a").await.unwrap();
        store.put("exists_a", "x").await.unwrap();
        store.put("playerless", "y").await.unwrap();

        let found = store.scan_prefix("player_").await.unwrap();
        let keys: Vec<&str> = found.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["player_a", "player_b"]);
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        use std::sync::Arc;

        let store = Arc::new(MemoryDocumentStore::new());
        let mut handles = vec![];

        for batch in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    store.put(&format!("player_{}_{}", batch, i), "{}").await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }
        assert_eq!(store.len(), 100);
    }
}
