// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Explicit wiring of the core components.
//!
//! A [`SyncContext`] owns one of everything and hands out shared references.
//! The host builds it once from a [`CoreConfig`] and passes it to whatever
//! needs player state; nothing is reachable through globals.
//!
//! ```text
//!                      SyncContext
//!   ┌──────────────┬───────┴──────┬───────────────┬────────────────┐
//!   │              │              │               │                │
//! cache ◄── PlayerStore ──► DocumentStore   Synchronizer     DeferredWriter
//!                ▲                            │    ▲               │
//!                └────────────────────────────┘    │               │
//!                └─────────────────────────────────┼───────────────┘
//!                                          SessionRegistry
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use progression_sync::{CoreConfig, SyncContext};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let config = CoreConfig::from_file("progression.toml").expect("valid config");
//! let context = SyncContext::connect(config).await.expect("valid config");
//! context.start().await;
//!
//! let record = context.on_session_start("p1", "Alex").await.expect("valid id");
//! println!("level {}", record.level);
//!
//! context.on_session_end("p1").await.expect("valid id");
//! context.shutdown().await;
//! # }
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::batching::{DeferredWriter, FlushReason};
use crate::cache::{ExpiringCache, PlayerCache};
use crate::config::{CoreConfig, StorageBackend, StorageConfig};
use crate::error::{validate_id, ConfigError, ValidationError};
use crate::player_store::PlayerStore;
use crate::record::PlayerRecord;
use crate::scheduler::PeriodicTask;
use crate::storage::memory::MemoryDocumentStore;
use crate::storage::offline::OfflineDocumentStore;
use crate::storage::redis::RedisDocumentStore;
use crate::storage::sql::SqlDocumentStore;
use crate::storage::traits::{DocumentStore, StorageError};
use crate::synchronizer::{SessionRegistry, Synchronizer};

pub struct SyncContext {
    config: CoreConfig,
    cache: Arc<PlayerCache>,
    documents: Arc<dyn DocumentStore>,
    store: Arc<PlayerStore>,
    sessions: Arc<SessionRegistry>,
    synchronizer: Arc<Synchronizer>,
    writer: Arc<DeferredWriter>,
    /// Cache sweeper and periodic flusher while started
    background: Mutex<Vec<PeriodicTask>>,
}

impl SyncContext {
    /// Open the configured backend and build the context.
    ///
    /// A backend that cannot be reached is replaced by an
    /// [`OfflineDocumentStore`]: the context still works, cache-only.
    pub async fn connect(config: CoreConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let documents = open_documents(&config.storage).await;
        Self::with_documents(config, documents)
    }

    /// Build the context over an already opened document store.
    pub fn with_documents(config: CoreConfig, documents: Arc<dyn DocumentStore>) -> Result<Self, ConfigError> {
        config.validate()?;
        let instance_id = config.resolved_instance_id();

        let cache: Arc<PlayerCache> = Arc::new(ExpiringCache::new(
            Duration::from_secs(config.cache.default_ttl_secs),
            Duration::from_secs(config.cache.short_ttl_secs),
        ));
        let store = Arc::new(PlayerStore::new(
            cache.clone(),
            documents.clone(),
            instance_id.clone(),
            Duration::from_secs(config.cache.exists_ttl_secs),
        ));
        let sessions = Arc::new(SessionRegistry::new());
        let synchronizer = Arc::new(Synchronizer::new(
            config.sync_settings(),
            store.clone(),
            sessions.clone(),
        ));
        let writer = Arc::new(DeferredWriter::new(store.clone(), config.save_policy()));

        info!(
            instance = %instance_id,
            backend = documents.backend_name(),
            save_policy = ?writer.policy(),
            sync_enabled = config.sync.enabled,
            "Progression sync context ready"
        );

        Ok(Self {
            config,
            cache,
            documents,
            store,
            sessions,
            synchronizer,
            writer,
            background: Mutex::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        self.store.instance_id()
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<PlayerCache> {
        &self.cache
    }

    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PlayerStore> {
        &self.store
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    #[must_use]
    pub fn synchronizer(&self) -> &Arc<Synchronizer> {
        &self.synchronizer
    }

    #[must_use]
    pub fn writer(&self) -> &Arc<DeferredWriter> {
        &self.writer
    }

    /// Start background work: the cache sweeper, the periodic flusher if
    /// configured, and the synchronizer if sync is enabled.
    pub async fn start(&self) {
        {
            let mut background = self.background.lock();
            if background.is_empty() {
                background.push(
                    self.cache
                        .spawn_sweeper(Duration::from_secs(self.config.cache.sweep_interval_secs)),
                );
                if self.config.save.flush_interval_secs > 0 {
                    background.push(
                        self.writer
                            .spawn_flusher(Duration::from_secs(self.config.save.flush_interval_secs)),
                    );
                }
            }
        }

        if self.config.sync.enabled {
            self.synchronizer.start().await;
        }
    }

    fn syncing(&self) -> bool {
        self.config.sync.enabled && self.synchronizer.is_running()
    }

    /// Player joined this instance: register presence, create the record on
    /// first contact, and reconcile with the stored copy if configured.
    pub async fn on_session_start(&self, id: &str, display_name: &str) -> Result<PlayerRecord, ValidationError> {
        validate_id(id)?;
        self.sessions.join(id);
        let record = self.store.get_or_create(id, display_name).await?;

        if self.syncing() && self.config.sync.auto_sync_on_join {
            let outcome = self.synchronizer.force_sync(id)?.await;
            debug!(player = %id, outcome = %outcome, "Join sync");
            if let Some(current) = self.store.get(id).await? {
                return Ok(current);
            }
        }
        Ok(record)
    }

    /// Player left this instance: flush pending writes, push if configured,
    /// then drop presence. Returns whether a sync push ran and succeeded.
    pub async fn on_session_end(&self, id: &str) -> Result<bool, ValidationError> {
        validate_id(id)?;
        self.writer.on_session_end(id).await?;

        let synced = if self.syncing() && self.config.sync.auto_sync_on_quit {
            self.synchronizer.sync_player_data(id)?.await
        } else {
            false
        };

        self.sessions.leave(id);
        Ok(synced)
    }

    /// Flush everything pending, stop background work and close the store.
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id()))]
    pub async fn shutdown(&self) {
        let flushed = self.writer.flush_all(FlushReason::Shutdown).await;
        self.synchronizer.stop().await;

        let background = std::mem::take(&mut *self.background.lock());
        for task in background {
            task.shutdown().await;
        }

        self.documents.close().await;
        info!(flushed, "Progression sync context shut down");
    }
}

async fn open_documents(storage: &StorageConfig) -> Arc<dyn DocumentStore> {
    let opened: Result<Arc<dyn DocumentStore>, StorageError> = match storage.backend {
        StorageBackend::Memory => Ok(Arc::new(MemoryDocumentStore::new())),
        StorageBackend::Redis => match storage.redis_url.as_deref() {
            Some(url) => RedisDocumentStore::with_prefix(url, storage.redis_prefix.as_deref())
                .await
                .map(|store| Arc::new(store) as Arc<dyn DocumentStore>),
            None => Err(StorageError::Backend("redis_url not configured".into())),
        },
        StorageBackend::Sql => match storage.sql_url.as_deref() {
            Some(url) => SqlDocumentStore::new(url)
                .await
                .map(|store| Arc::new(store) as Arc<dyn DocumentStore>),
            None => Err(StorageError::Backend("sql_url not configured".into())),
        },
    };

    match opened {
        Ok(documents) => documents,
        Err(e) => {
            warn!(
                backend = ?storage.backend,
                error = %e,
                "Document store unavailable, continuing cache-only"
            );
            Arc::new(OfflineDocumentStore::new(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batching::ApplyOutcome;

    fn config(toml: &str) -> CoreConfig {
        CoreConfig::from_toml_str(toml).unwrap()
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let context = SyncContext::connect(config("instance_id = \"a\"")).await.unwrap();
        assert_eq!(context.documents().backend_name(), "memory");
        assert_eq!(context.instance_id(), "a");
    }

    #[tokio::test]
    async fn test_unreachable_backend_degrades_to_offline() {
        let context = SyncContext::connect(config(
            "[storage]\nbackend = \"sql\"\nsql_url = \"sqlite:///nonexistent-dir/deeper/players.db\"\n",
        ))
        .await
        .unwrap();
        assert_eq!(context.documents().backend_name(), "offline");

        // Still usable from cache
        let record = context.on_session_start("p1", "Alex").await.unwrap();
        assert_eq!(record.level, 0);
        assert!(context.store().cached("p1").is_some());
    }

    #[tokio::test]
    async fn test_session_lifecycle_with_batching() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let context = SyncContext::with_documents(
            config("instance_id = \"a\"\n[save]\nmode = \"batched\"\nbatch_threshold = 50\n"),
            documents.clone(),
        )
        .unwrap();
        context.start().await;

        context.on_session_start("p1", "Alex").await.unwrap();
        assert!(context.sessions().contains("p1"));
        assert_eq!(
            context.writer().add_progress("p1", "mission_1", 4).await.unwrap(),
            ApplyOutcome::Deferred { pending: 1 }
        );

        context.on_session_end("p1").await.unwrap();
        assert!(!context.sessions().contains("p1"));
        assert!(!context.writer().is_pending("p1"));

        let raw = documents.get("player_p1").await.unwrap().unwrap();
        assert_eq!(crate::schema::decode("p1", &raw).unwrap().progress_of("mission_1"), 4);
        context.shutdown().await;
    }

    #[tokio::test]
    async fn test_join_sync_pulls_newer_stored_copy() {
        let documents: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
        let a = SyncContext::with_documents(config("instance_id = \"a\"\n[sync]\nenabled = true\n"), documents.clone()).unwrap();
        let b = SyncContext::with_documents(config("instance_id = \"b\"\n[sync]\nenabled = true\n"), documents).unwrap();
        a.start().await;
        b.start().await;

        // B knew the player from an earlier session
        b.on_session_start("p1", "Alex").await.unwrap();
        b.on_session_end("p1").await.unwrap();

        a.on_session_start("p1", "Alex").await.unwrap();
        a.store().set_level("p1", 12).await.unwrap();
        a.on_session_end("p1").await.unwrap();

        let record = b.on_session_start("p1", "Alex").await.unwrap();
        assert_eq!(record.level, 12);

        a.shutdown().await;
        b.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending() {
        let documents = Arc::new(MemoryDocumentStore::new());
        let context = SyncContext::with_documents(
            config("[save]\nmode = \"batched\"\n"),
            documents.clone(),
        )
        .unwrap();
        context.store().create_player("p1", "Alex").await.unwrap();
        context.writer().set_level("p1", 7).await.unwrap();

        context.shutdown().await;
        let raw = documents.get("player_p1").await.unwrap().unwrap();
        assert_eq!(crate::schema::decode("p1", &raw).unwrap().level, 7);
        assert!(!context.synchronizer().is_running());
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut bad = CoreConfig::default();
        bad.sync.workers = 0;
        assert!(SyncContext::with_documents(bad, Arc::new(MemoryDocumentStore::new())).is_err());
    }
}
