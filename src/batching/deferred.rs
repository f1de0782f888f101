// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Deferred persistence of progress mutations.
//!
//! The [`DeferredWriter`] decides *when* [`PlayerStore::save`] runs, never what
//! it does. Under [`SavePolicy::Immediate`] every mutation is saved on the
//! spot. Under [`SavePolicy::Batched`] mutations update the cached record and
//! only a per-player counter is kept; the player is flushed once its mutation
//! counter reaches the threshold, when its session ends, or on shutdown.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use progression_sync::{DeferredWriter, PlayerStore, SavePolicy};
//!
//! # async fn example(store: Arc<PlayerStore>) {
//! let writer = DeferredWriter::new(store, SavePolicy::Batched { threshold: 50 });
//!
//! writer.add_progress("p1", "mission_4", 1).await.expect("valid id");
//! assert!(writer.is_pending("p1"));
//!
//! writer.on_session_end("p1").await.expect("valid id");
//! assert!(!writer.is_pending("p1"));
//! # }
//! ```

use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::error::{validate_id, ValidationError};
use crate::player_store::{PlayerStore, SaveOutcome};
use crate::record::PlayerRecord;
use crate::scheduler::PeriodicTask;

/// When mutations reach the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SavePolicy {
    /// Save on every mutation
    Immediate,
    /// Save after `threshold` mutations, at session end, or on shutdown
    Batched { threshold: u32 },
}

/// Batch flush trigger reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// Mutation count threshold reached
    Count,
    /// Periodic flush interval elapsed
    Time,
    /// Player's session ended
    SessionEnd,
    /// Manual flush requested
    Manual,
    /// Shutdown flush
    Shutdown,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Count => write!(f, "count"),
            Self::Time => write!(f, "time"),
            Self::SessionEnd => write!(f, "session_end"),
            Self::Manual => write!(f, "manual"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// What [`DeferredWriter::apply`] did with a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Saved right away (immediate policy)
    Saved(SaveOutcome),
    /// Held in memory; `pending` mutations now await a flush
    Deferred { pending: u32 },
    /// The threshold was reached and the player was flushed
    Flushed(SaveOutcome),
    /// The player has no record; nothing was changed
    Missing,
}

pub struct DeferredWriter {
    store: Arc<PlayerStore>,
    policy: SavePolicy,
    /// Unflushed mutation count per player. The mutated record itself lives
    /// in the cache, so a poll invalidation rebases later mutations onto the
    /// reloaded copy.
    pending: DashMap<String, u32>,
}

impl DeferredWriter {
    pub fn new(store: Arc<PlayerStore>, policy: SavePolicy) -> Self {
        let policy = match policy {
            SavePolicy::Batched { threshold } => SavePolicy::Batched {
                threshold: threshold.max(1),
            },
            immediate => immediate,
        };
        Self {
            store,
            policy,
            pending: DashMap::new(),
        }
    }

    #[must_use]
    pub fn policy(&self) -> SavePolicy {
        self.policy
    }

    #[must_use]
    pub fn is_pending(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Unflushed mutations for the player; zero if none.
    #[must_use]
    pub fn pending_mutations(&self, id: &str) -> u32 {
        self.pending.get(id).map_or(0, |p| *p)
    }

    /// Players with unflushed mutations.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Apply one mutation to the player's record.
    ///
    /// Under the batched policy the mutation lands on the current cached
    /// record, which is loaded through the store when absent, and the result
    /// is staged back into the cache.
    pub async fn apply<F>(&self, id: &str, mutate: F) -> Result<ApplyOutcome, ValidationError>
    where
        F: FnOnce(&mut PlayerRecord) + Send,
    {
        validate_id(id)?;

        let threshold = match self.policy {
            SavePolicy::Immediate => {
                let Some(mut record) = self.store.get(id).await? else {
                    return Ok(ApplyOutcome::Missing);
                };
                mutate(&mut record);
                return Ok(ApplyOutcome::Saved(self.store.save(id, record).await?));
            }
            SavePolicy::Batched { threshold } => threshold,
        };

        let mut mutate = Some(mutate);
        let mut loaded: Option<PlayerRecord> = None;
        let mutations = loop {
            // The entry guard serializes mutate-and-stage per player
            let step = {
                let mut entry = self.pending.entry(id.to_string()).or_insert(0);
                match self.store.cached(id).or_else(|| loaded.take()) {
                    Some(mut record) => {
                        if let Some(f) = mutate.take() {
                            f(&mut record);
                        }
                        self.store.stage(&record);
                        *entry += 1;
                        Ok(*entry)
                    }
                    None => Err(*entry == 0),
                }
            };

            match step {
                Ok(mutations) => break mutations,
                Err(fresh) => {
                    if fresh {
                        self.pending.remove_if(id, |_, count| *count == 0);
                    }
                    match self.store.get(id).await? {
                        Some(record) => loaded = Some(record),
                        None => return Ok(ApplyOutcome::Missing),
                    }
                }
            }
        };
        crate::metrics::set_pending_writes(self.pending.len());

        if mutations >= threshold {
            match self.flush(id, FlushReason::Count).await? {
                Some(outcome) => Ok(ApplyOutcome::Flushed(outcome)),
                // A concurrent flush got there first
                None => Ok(ApplyOutcome::Deferred { pending: 0 }),
            }
        } else {
            Ok(ApplyOutcome::Deferred { pending: mutations })
        }
    }

    pub async fn add_progress(&self, id: &str, key: &str, delta: i64) -> Result<ApplyOutcome, ValidationError> {
        self.apply(id, |record| {
            let count = record.progress.entry(key.to_string()).or_insert(0);
            *count = count.saturating_add(delta);
        })
        .await
    }

    pub async fn set_progress(&self, id: &str, key: &str, value: i64) -> Result<ApplyOutcome, ValidationError> {
        self.apply(id, |record| {
            record.progress.insert(key.to_string(), value);
        })
        .await
    }

    /// Drop the mission's progress counter.
    pub async fn complete_mission(&self, id: &str, key: &str) -> Result<ApplyOutcome, ValidationError> {
        self.apply(id, |record| {
            record.progress.remove(key);
        })
        .await
    }

    pub async fn set_level(&self, id: &str, level: u32) -> Result<ApplyOutcome, ValidationError> {
        self.apply(id, |record| record.level = level).await
    }

    /// Persist the player's current record. `None` if nothing was pending.
    pub async fn flush(&self, id: &str, reason: FlushReason) -> Result<Option<SaveOutcome>, ValidationError> {
        validate_id(id)?;
        let Some((_, mutations)) = self.pending.remove(id) else {
            return Ok(None);
        };
        crate::metrics::set_pending_writes(self.pending.len());

        let Some(record) = self.store.get(id).await? else {
            warn!(player = %id, mutations, "Pending player has no record to flush");
            return Ok(None);
        };
        let outcome = self.store.save(id, record).await?;
        crate::metrics::record_flush(&reason.to_string(), 1);
        debug!(
            player = %id,
            reason = %reason,
            mutations,
            persisted = outcome.is_persisted(),
            "Flushed pending writes"
        );
        Ok(Some(outcome))
    }

    /// Flush every pending player. Returns how many were flushed.
    pub async fn flush_all(&self, reason: FlushReason) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|p| p.key().clone()).collect();
        let mut flushed = 0;
        for id in ids {
            if let Ok(Some(_)) = self.flush(&id, reason).await {
                flushed += 1;
            }
        }
        if flushed > 0 {
            debug!(flushed, reason = %reason, "Flushed all pending writes");
        }
        flushed
    }

    /// Flush regardless of the mutation counter.
    pub async fn on_session_end(&self, id: &str) -> Result<Option<SaveOutcome>, ValidationError> {
        self.flush(id, FlushReason::SessionEnd).await
    }

    /// Start a periodic flush of all pending players. The task holds only a
    /// weak reference and exits once the writer is dropped.
    pub fn spawn_flusher(self: &Arc<Self>, every: Duration) -> PeriodicTask {
        let writer: Weak<Self> = Arc::downgrade(self);
        PeriodicTask::spawn("deferred_flush", every, every, move || {
            let writer = writer.clone();
            async move {
                if let Some(writer) = writer.upgrade() {
                    writer.flush_all(FlushReason::Time).await;
                }
            }
        })
    }
}
