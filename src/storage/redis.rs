//! Redis document store.
//!
//! Each player document is a plain Redis STRING holding the JSON text:
//!
//! ```text
//! SET {prefix}player_069a79f4 '{"id":"069a79f4","data":{...},"stamp":{...},"schema":1}'
//! ```
//!
//! Prefix scans walk the keyspace with `SCAN MATCH` and fetch values with
//! `MGET` per page, so no single command blocks the server on large
//! keyspaces.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use super::traits::{DocumentStore, StorageError};
use crate::resilience::retry::{retry, RetryConfig};

/// Keys requested per SCAN page.
const SCAN_PAGE: usize = 200;

pub struct RedisDocumentStore {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "levels:" → "levels:player_abc")
    prefix: String,
}

impl RedisDocumentStore {
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a store with an optional key prefix, for sharing one Redis
    /// between several networks or applications.
    ///
    /// ```rust,no_run
    /// # use progression_sync::storage::redis::RedisDocumentStore;
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let store = RedisDocumentStore::with_prefix("redis://localhost", Some("levels:")).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn with_prefix(connection_string: &str, prefix: Option<&str>) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Unavailable(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    #[inline]
    fn strip_prefix<'a>(&self, key: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            key
        } else {
            key.strip_prefix(&self.prefix).unwrap_or(key)
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// One SCAN page: `(next_cursor, keys)`.
    async fn scan_page(&self, cursor: u64, pattern: &str) -> Result<(u64, Vec<String>), StorageError> {
        let conn = self.connection.clone();
        retry("redis_scan", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            async move {
                let page: (u64, Vec<String>) = cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(SCAN_PAGE)
                    .query_async(&mut conn)
                    .await?;
                Ok(page)
            }
        })
        .await
        .map_err(map_redis_error)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StorageError> {
        let conn = self.connection.clone();
        retry("redis_mget", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            async move {
                let mut mget = cmd("MGET");
                for key in keys {
                    mget.arg(key);
                }
                let values: Vec<Option<String>> = mget.query_async(&mut conn).await?;
                Ok(values)
            }
        })
        .await
        .map_err(map_redis_error)
    }
}

/// Escape glob metacharacters so a prefix matches literally in `SCAN MATCH`.
fn escape_glob(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn map_redis_error(e: redis::RedisError) -> StorageError {
    if e.is_io_error() || e.is_connection_dropped() || e.is_connection_refusal() || e.is_timeout() {
        StorageError::Unavailable(e.to_string())
    } else {
        StorageError::Backend(e.to_string())
    }
}

#[async_trait]
impl DocumentStore for RedisDocumentStore {
    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();
        let _: String = cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let data: Option<String> = conn.get(&key).await?;
                Ok(data)
            }
        })
        .await
        .map_err(map_redis_error)
    }

    async fn put(&self, key: &str, document: &str) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let _: () = conn.set(&key, document).await?;
                Ok(())
            }
        })
        .await
        .map_err(map_redis_error)
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_delete", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let _: () = conn.del(&key).await?;
                Ok(())
            }
        })
        .await
        .map_err(map_redis_error)
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_exists", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let exists: bool = conn.exists(&key).await?;
                Ok(exists)
            }
        })
        .await
        .map_err(map_redis_error)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let pattern = format!("{}*", escape_glob(&self.prefixed_key(prefix)));
        let mut found = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (next, keys) = self.scan_page(cursor, &pattern).await?;
            if !keys.is_empty() {
                let values = self.mget(&keys).await?;
                for (key, value) in keys.into_iter().zip(values) {
                    // Deleted between SCAN and MGET
                    if let Some(value) = value {
                        found.push((self.strip_prefix(&key).to_string(), value));
                    }
                }
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once
        found.sort_by(|a, b| a.0.cmp(&b.0));
        found.dedup_by(|a, b| a.0 == b.0);
        Ok(found)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
