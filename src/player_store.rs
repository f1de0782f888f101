// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read-through / write-through access to player records.
//!
//! ```text
//!            get(id)                         save(id, record)
//!               │                                   │
//!        ┌──────▼──────┐  miss            ┌─────────▼─────────┐
//!        │    cache    │────────┐         │ stamp (instance,  │
//!        └──────┬──────┘        │         │  now, version)    │
//!           hit │          ┌────▼─────┐   └─────────┬─────────┘
//!               │          │ document │             │ cache (short TTL)
//!               │          │  store   │             ▼
//!               │          └────┬─────┘      document store
//!               │        decode │ cache (default TTL)   (failure: logged, cache-only)
//!               ▼               ▼
//! ```
//!
//! Store failures never propagate to callers: reads degrade to "not found"
//! and writes to cache-only, each with a log entry. Typed variants
//! ([`PlayerStore::load`], [`PlayerStore::fetch_remote`], [`SaveOutcome`])
//! expose the failure kind where callers need it.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::cache::{exists_key, player_key, CachedValue, PlayerCache, PLAYER_NAMESPACE};
use crate::error::{validate_id, FailureKind, SyncError, ValidationError};
use crate::record::{now_millis, PlayerRecord, Stamp};
use crate::resilience::health::ConnectivityMonitor;
use crate::schema;
use crate::storage::traits::DocumentStore;

/// Result of [`PlayerStore::save`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Cached and written to the document store
    Persisted(Stamp),
    /// Cached only; the store write failed
    CachedOnly(FailureKind),
}

impl SaveOutcome {
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        matches!(self, Self::Persisted(_))
    }
}

/// Per-player summary exposed to menus and commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PlayerStats {
    pub level: u32,
    /// Missions with recorded progress
    pub tracked_missions: usize,
    /// Millis since last activity
    pub since_last_seen_ms: i64,
}

pub struct PlayerStore {
    cache: Arc<PlayerCache>,
    documents: Arc<dyn DocumentStore>,
    instance_id: String,
    exists_ttl: Duration,
    health: ConnectivityMonitor,
    last_version: AtomicI64,
}

impl PlayerStore {
    pub fn new(
        cache: Arc<PlayerCache>,
        documents: Arc<dyn DocumentStore>,
        instance_id: impl Into<String>,
        exists_ttl: Duration,
    ) -> Self {
        let health = ConnectivityMonitor::new(documents.backend_name());
        Self {
            cache,
            documents,
            instance_id: instance_id.into(),
            exists_ttl,
            health,
            last_version: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
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
    pub fn health(&self) -> &ConnectivityMonitor {
        &self.health
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Reads
    // ═══════════════════════════════════════════════════════════════════════

    /// Read-through lookup. Store failures are logged and read as absent.
    pub async fn get(&self, id: &str) -> Result<Option<PlayerRecord>, ValidationError> {
        validate_id(id)?;
        match self.load(id).await {
            Ok(record) => Ok(record),
            Err(e) => {
                debug!(player = %id, error = %e, "Treating unreadable record as absent");
                Ok(None)
            }
        }
    }

    /// Read-through lookup with the failure kind preserved.
    pub async fn load(&self, id: &str) -> Result<Option<PlayerRecord>, SyncError> {
        validate_id(id)?;
        if let Some(record) = self.cached(id) {
            return Ok(Some(record));
        }

        let record = self.fetch_remote(id).await?;
        if let Some(ref record) = record {
            self.cache.put(player_key(id), CachedValue::Record(record.clone()));
        }
        Ok(record)
    }

    /// Cache-only peek; never touches the store.
    #[must_use]
    pub fn cached(&self, id: &str) -> Option<PlayerRecord> {
        match self.cache.get(&player_key(id)) {
            Some(CachedValue::Record(record)) => Some(record),
            _ => None,
        }
    }

    /// Read the stored version directly, bypassing and not populating the cache.
    pub async fn fetch_remote(&self, id: &str) -> Result<Option<PlayerRecord>, SyncError> {
        validate_id(id)?;
        let key = player_key(id);
        let _timer = crate::metrics::LatencyTimer::new(self.documents.backend_name(), "get");

        let raw = match self.documents.get(&key).await {
            Ok(raw) => {
                self.health.record_success();
                raw
            }
            Err(e) => {
                self.health.record_failure("get", &e);
                crate::metrics::record_store_operation(self.documents.backend_name(), "get", "error");
                return Err(e.into());
            }
        };
        crate::metrics::record_store_operation(self.documents.backend_name(), "get", "success");

        let Some(raw) = raw else {
            return Ok(None);
        };
        match schema::decode(id, &raw) {
            Ok(record) => Ok(Some(record)),
            Err(source) => {
                warn!(
                    player = %id,
                    error = %source,
                    document = schema::preview(&raw),
                    "Stored document does not match any known schema"
                );
                crate::metrics::record_decode_failure();
                Err(SyncError::Deserialization { key, source })
            }
        }
    }

    /// Whether a record exists, cached separately with a medium TTL.
    pub async fn exists(&self, id: &str) -> Result<bool, ValidationError> {
        validate_id(id)?;
        match self.cache.get(&exists_key(id)) {
            Some(CachedValue::Exists(known)) => return Ok(known),
            Some(CachedValue::Record(_)) | None => {}
        }
        if self.cached(id).is_some() {
            return Ok(true);
        }

        match self.documents.exists(&player_key(id)).await {
            Ok(found) => {
                self.health.record_success();
                self.cache
                    .put_with_ttl(exists_key(id), CachedValue::Exists(found), self.exists_ttl);
                Ok(found)
            }
            Err(e) => {
                self.health.record_failure("exists", &e);
                Ok(false)
            }
        }
    }

    pub async fn get_level(&self, id: &str) -> Result<u32, ValidationError> {
        Ok(self.get(id).await?.map(|r| r.level).unwrap_or(0))
    }

    pub async fn player_stats(&self, id: &str) -> Result<PlayerStats, ValidationError> {
        Ok(self
            .get(id)
            .await?
            .map(|record| PlayerStats {
                level: record.level,
                tracked_missions: record.progress.len(),
                since_last_seen_ms: (now_millis() - record.last_seen_at).max(0),
            })
            .unwrap_or_default())
    }

    /// Top `n` stored records by level (descending, ties by id).
    ///
    /// Scans every stored record; keep this out of hot paths.
    pub async fn top_by_level(&self, n: usize) -> Vec<PlayerRecord> {
        if n == 0 {
            return Vec::new();
        }

        let prefix = format!("{}_", PLAYER_NAMESPACE);
        let documents = match self.documents.scan_prefix(&prefix).await {
            Ok(documents) => {
                self.health.record_success();
                documents
            }
            Err(e) => {
                self.health.record_failure("scan_prefix", &e);
                return Vec::new();
            }
        };

        let mut records: Vec<PlayerRecord> = documents
            .into_iter()
            .filter_map(|(key, raw)| {
                let id = key.strip_prefix(prefix.as_str()).unwrap_or(&key).to_string();
                match schema::decode(&id, &raw) {
                    Ok(record) => Some(record),
                    Err(e) => {
                        warn!(key = %key, error = %e, document = schema::preview(&raw), "Skipping undecodable record in scan");
                        crate::metrics::record_decode_failure();
                        None
                    }
                }
            })
            .collect();

        records.sort_by(|a, b| b.level.cmp(&a.level).then_with(|| a.id.cmp(&b.id)));
        records.truncate(n);
        records
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Writes
    // ═══════════════════════════════════════════════════════════════════════

    /// Stamp, cache with the short TTL, then persist.
    pub async fn save(&self, id: &str, mut record: PlayerRecord) -> Result<SaveOutcome, ValidationError> {
        validate_id(id)?;
        if record.id != id {
            record.id = id.to_string();
        }

        let written_at = now_millis();
        record.stamp = Stamp {
            writer_id: self.instance_id.clone(),
            written_at,
            version: self.next_version(written_at, record.stamp.version),
        };
        let stamp = record.stamp.clone();
        let document = schema::encode_string(&record);

        self.cache
            .put_short_lived(player_key(id), CachedValue::Record(record));
        self.cache
            .put_with_ttl(exists_key(id), CachedValue::Exists(true), self.exists_ttl);

        let _timer = crate::metrics::LatencyTimer::new(self.documents.backend_name(), "put");
        match self.documents.put(&player_key(id), &document).await {
            Ok(()) => {
                self.health.record_success();
                crate::metrics::record_store_operation(self.documents.backend_name(), "put", "success");
                Ok(SaveOutcome::Persisted(stamp))
            }
            Err(e) => {
                self.health.record_failure("put", &e);
                crate::metrics::record_store_operation(self.documents.backend_name(), "put", "error");
                Ok(SaveOutcome::CachedOnly(FailureKind::Connectivity))
            }
        }
    }

    /// Cache a locally mutated record without persisting it (deferred writes).
    pub fn stage(&self, record: &PlayerRecord) {
        self.cache
            .put(player_key(&record.id), CachedValue::Record(record.clone()));
    }

    /// Create a first-contact record and persist it.
    pub async fn create_player(&self, id: &str, display_name: &str) -> Result<PlayerRecord, ValidationError> {
        let record = PlayerRecord::new(id, display_name);
        self.save(id, record.clone()).await?;
        Ok(self.cached(id).unwrap_or(record))
    }

    /// Existing record, or a freshly created one.
    pub async fn get_or_create(&self, id: &str, display_name: &str) -> Result<PlayerRecord, ValidationError> {
        match self.get(id).await? {
            Some(record) => Ok(record),
            None => self.create_player(id, display_name).await,
        }
    }

    /// Returns `false` if the player has no record.
    pub async fn set_level(&self, id: &str, level: u32) -> Result<bool, ValidationError> {
        let Some(mut record) = self.get(id).await? else {
            return Ok(false);
        };
        record.level = level;
        self.save(id, record).await?;
        Ok(true)
    }

    /// Returns `false` if the player has no record.
    pub async fn update_last_seen(&self, id: &str) -> Result<bool, ValidationError> {
        let Some(mut record) = self.get(id).await? else {
            return Ok(false);
        };
        record.last_seen_at = now_millis();
        self.save(id, record).await?;
        Ok(true)
    }

    /// Drop every cached entry owned by the player.
    pub fn invalidate(&self, id: &str) -> usize {
        self.cache.invalidate_owner(id)
    }

    /// Strictly increasing per instance and per record.
    fn next_version(&self, now: i64, previous: i64) -> i64 {
        let floor = now.max(previous.saturating_add(1));
        let mut current = self.last_version.load(Ordering::Acquire);
        loop {
            let next = floor.max(current.saturating_add(1));
            match self
                .last_version
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}
