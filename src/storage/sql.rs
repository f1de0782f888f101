// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL document store (MySQL or SQLite through the sqlx `Any` driver).
//!
//! ```sql
//! CREATE TABLE player_documents (
//!   doc_key    VARCHAR(255) PRIMARY KEY,
//!   document   LONGTEXT NOT NULL,   -- JSON as text (sqlx Any driver limitation)
//!   updated_at BIGINT NOT NULL      -- epoch millis of the last write
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! MySQL LONGTEXT comes back as BLOB through `Any`, so text columns are read
//! as `String` first and as UTF-8 bytes second.

use async_trait::async_trait;
use sqlx::{AnyPool, Row, any::AnyPoolOptions, any::AnyRow};
use super::traits::{DocumentStore, StorageError};
use crate::record::now_millis;
use crate::resilience::retry::{retry, RetryConfig};
use std::sync::Once;
use std::time::Duration;
use tracing::warn;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlDocumentStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlDocumentStore {
    /// Connect with startup-mode retry (fails fast if config is wrong) and
    /// create the table if missing.
    pub async fn new(connection_string: &str) -> Result<Self, StorageError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(if is_sqlite { 4 } else { 10 })
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Concurrent readers during writes; one fsync per commit.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {}", e)))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let sql = if self.is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS player_documents (
                doc_key TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#
        } else {
            r#"
            CREATE TABLE IF NOT EXISTS player_documents (
                doc_key VARCHAR(255) PRIMARY KEY,
                document LONGTEXT NOT NULL,
                updated_at BIGINT NOT NULL,
                INDEX idx_updated_at (updated_at)
            )
            "#
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;

        Ok(())
    }

    /// Try `String` first (SQLite TEXT), then bytes (MySQL LONGTEXT).
    fn text_column(row: &AnyRow, column: &str) -> Result<String, StorageError> {
        if let Ok(text) = row.try_get::<String, _>(column) {
            return Ok(text);
        }
        let bytes = row
            .try_get::<Vec<u8>, _>(column)
            .map_err(|e| StorageError::Backend(format!("unreadable column {}: {}", column, e)))?;
        String::from_utf8(bytes)
            .map_err(|e| StorageError::Backend(format!("column {} is not UTF-8: {}", column, e)))
    }

    /// Number of stored documents.
    pub async fn count_all(&self) -> Result<u64, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM player_documents")
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        let count: i64 = row.try_get("cnt").map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count as u64)
    }
}

fn map_sqlx_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            StorageError::Unavailable(e.to_string())
        }
        other => StorageError::Backend(other.to_string()),
    }
}

/// Escape `LIKE` metacharacters (`%`, `_`, and the escape itself).
fn like_pattern(prefix: &str) -> String {
    let mut pattern = String::with_capacity(prefix.len() + 1);
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '!') {
            pattern.push('!');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[async_trait]
impl DocumentStore for SqlDocumentStore {
    async fn ping(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let row = retry("sql_get", &RetryConfig::query(), || async {
            sqlx::query("SELECT document FROM player_documents WHERE doc_key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)
        })
        .await?;
        row.map(|row| Self::text_column(&row, "document")).transpose()
    }

    async fn put(&self, key: &str, document: &str) -> Result<(), StorageError> {
        let updated_at = now_millis();
        let sql = if self.is_sqlite {
            "INSERT INTO player_documents (doc_key, document, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(doc_key) DO UPDATE SET
                document = excluded.document,
                updated_at = excluded.updated_at"
        } else {
            "INSERT INTO player_documents (doc_key, document, updated_at) VALUES (?, ?, ?)
             ON DUPLICATE KEY UPDATE
                document = VALUES(document),
                updated_at = VALUES(updated_at)"
        };

        retry("sql_put", &RetryConfig::query(), || async {
            sqlx::query(sql)
                .bind(key)
                .bind(document)
                .bind(updated_at)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        retry("sql_delete", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM player_documents WHERE doc_key = ?")
                .bind(key)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(())
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        retry("sql_exists", &RetryConfig::query(), || async {
            let row = sqlx::query("SELECT 1 FROM player_documents WHERE doc_key = ? LIMIT 1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx_error)?;
            Ok(row.is_some())
        })
        .await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, StorageError> {
        let pattern = like_pattern(prefix);

        let rows = retry("sql_scan_prefix", &RetryConfig::query(), || async {
            sqlx::query(
                "SELECT doc_key, document FROM player_documents WHERE doc_key LIKE ? ESCAPE '!' ORDER BY doc_key",
            )
            .bind(&pattern)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)
        })
        .await?;

        let mut found = Vec::with_capacity(rows.len());
        for row in rows {
            let (key, document) = match (Self::text_column(&row, "doc_key"), Self::text_column(&row, "document")) {
                (Ok(key), Ok(document)) => (key, document),
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "Skipping unreadable row in prefix scan");
                    continue;
                }
            };
            // LIKE is case-insensitive on some collations
            if key.starts_with(prefix) {
                found.push((key, document));
            }
        }
        Ok(found)
    }

    async fn close(&self) {
        self.pool.close().await;
    }

    fn backend_name(&self) -> &'static str {
        if self.is_sqlite { "sqlite" } else { "mysql" }
    }
}
