//! On-demand synchronization API.
//!
//! - `sync_player_data()` - push one player's local record
//! - `force_sync()` - reconcile the local and stored copies
//! - `notify_data_change()` - fire-and-forget push
//! - `is_data_up_to_date()` - freshness check against the last sync
//! - `set_sync_enabled()` - opt a player in or out of push sync
//! - `get_stats()` - counters and state

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{validate_id, FailureKind, SyncError, ValidationError};
use crate::player_store::SaveOutcome;
use crate::record::now_millis;
use crate::reconcile::reconcile;

use super::{ForceSyncOutcome, SyncHandle, SyncStats, Synchronizer};

impl Synchronizer {
    // ═══════════════════════════════════════════════════════════════════════════
    // API: On-demand sync
    // ═══════════════════════════════════════════════════════════════════════════

    /// Push the player's local record on the worker pool.
    ///
    /// Resolves to `true` if a local record existed and was persisted. Resolves
    /// to `false` straight away when the synchronizer is stopped or the
    /// player opted out of sync.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyId`] for an empty id.
    pub fn sync_player_data(self: &Arc<Self>, id: &str) -> Result<SyncHandle<bool>, ValidationError> {
        validate_id(id)?;
        if !self.is_running() || !self.is_sync_enabled(id) {
            return Ok(SyncHandle::ready(false));
        }

        let id = id.to_string();
        Ok(self.spawn_on_worker(move |sync| async move { sync.push_local(&id).await.persisted() }))
    }

    /// Reconcile the player's local (cached) and stored copies.
    ///
    /// | local | stored | action                                  | outcome            |
    /// |-------|--------|-----------------------------------------|--------------------|
    /// | -     | -      | none                                    | `NoData`           |
    /// | yes   | -      | persist local                           | `Pushed`           |
    /// | -     | yes    | invalidate local cache                  | `Pulled`           |
    /// | yes   | yes    | persist and cache the merge             | `Merged`/`InSync`  |
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyId`] for an empty id.
    pub fn force_sync(self: &Arc<Self>, id: &str) -> Result<SyncHandle<ForceSyncOutcome>, ValidationError> {
        validate_id(id)?;
        if !self.is_running() {
            return Ok(SyncHandle::ready(ForceSyncOutcome::Failed(FailureKind::Stopped)));
        }

        let id = id.to_string();
        Ok(self.spawn_on_worker(move |sync| async move { sync.force_sync_now(&id).await }))
    }

    #[tracing::instrument(skip(self), fields(instance = %self.instance_id()))]
    async fn force_sync_now(&self, id: &str) -> ForceSyncOutcome {
        let local = self.store.cached(id);
        let remote = match self.store.fetch_remote(id).await {
            Ok(remote) => remote,
            // Undecodable stored copy reads as absent
            Err(SyncError::Deserialization { .. }) => None,
            Err(e) => {
                warn!(player = %id, error = %e, "Force sync could not read the stored copy");
                return self.finish_force(id, ForceSyncOutcome::Failed(e.kind()));
            }
        };

        let outcome = match (local, remote) {
            (None, None) => ForceSyncOutcome::NoData,

            (Some(local), None) => match self.store.save(id, local).await {
                Ok(SaveOutcome::Persisted(stamp)) => {
                    self.mark_synced(id, stamp.written_at);
                    ForceSyncOutcome::Pushed
                }
                Ok(SaveOutcome::CachedOnly(kind)) => ForceSyncOutcome::Failed(kind),
                Err(_) => ForceSyncOutcome::Failed(FailureKind::Validation),
            },

            (None, Some(remote)) => {
                self.store.invalidate(id);
                self.mark_synced(id, remote.stamp.written_at);
                ForceSyncOutcome::Pulled
            }

            (Some(local), Some(remote)) => {
                let result = reconcile(&local, &remote);
                if !result.changed && result.merged.same_content(&remote) {
                    self.mark_synced(id, remote.stamp.written_at);
                    ForceSyncOutcome::InSync
                } else {
                    let mut merged = result.merged;
                    merged.stamp.version = local.stamp.version.max(remote.stamp.version);
                    match self.store.save(id, merged).await {
                        Ok(SaveOutcome::Persisted(stamp)) => {
                            if result.changed {
                                self.record_conflict();
                            }
                            self.mark_synced(id, stamp.written_at);
                            ForceSyncOutcome::Merged {
                                changed: result.changed,
                            }
                        }
                        Ok(SaveOutcome::CachedOnly(kind)) => ForceSyncOutcome::Failed(kind),
                        Err(_) => ForceSyncOutcome::Failed(FailureKind::Validation),
                    }
                }
            }
        };

        self.finish_force(id, outcome)
    }

    fn finish_force(&self, id: &str, outcome: ForceSyncOutcome) -> ForceSyncOutcome {
        crate::metrics::record_sync_operation("force", outcome.label());
        match outcome {
            ForceSyncOutcome::Merged { changed: true } => {
                info!(player = %id, "Force sync merged diverging copies");
            }
            ForceSyncOutcome::NoData => info!(player = %id, "Force sync found no data"),
            ForceSyncOutcome::Failed(kind) => warn!(player = %id, kind = %kind, "Force sync failed"),
            other => debug!(player = %id, outcome = %other, "Force sync complete"),
        }
        outcome
    }

    /// Schedule a push without waiting for it.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyId`] for an empty id.
    pub fn notify_data_change(self: &Arc<Self>, id: &str) -> Result<(), ValidationError> {
        // Detached: the job runs to completion without the handle
        drop(self.sync_player_data(id)?);
        Ok(())
    }

    /// Whether the player was synced within the freshness window.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyId`] for an empty id.
    pub fn is_data_up_to_date(&self, id: &str) -> Result<bool, ValidationError> {
        validate_id(id)?;
        let window = i64::try_from(self.settings.freshness_window.as_millis()).unwrap_or(i64::MAX);
        Ok(self
            .last_synced_at(id)
            .is_some_and(|last| now_millis().saturating_sub(last) <= window))
    }

    /// Opt a player in or out of push sync. Opting in pushes once right away;
    /// the returned handle resolves when that push is done.
    ///
    /// # Errors
    ///
    /// [`ValidationError::EmptyId`] for an empty id.
    pub fn set_sync_enabled(
        self: &Arc<Self>,
        id: &str,
        enabled: bool,
    ) -> Result<Option<SyncHandle<bool>>, ValidationError> {
        validate_id(id)?;
        self.bookkeeping
            .entry(id.to_string())
            .or_default()
            .sync_enabled = enabled;

        if enabled {
            Ok(Some(self.sync_player_data(id)?))
        } else {
            Ok(None)
        }
    }

    #[must_use]
    pub fn get_stats(&self) -> SyncStats {
        let last = self.last_sync_at.load(Ordering::Acquire);
        SyncStats {
            total_sync_ops: self.total_sync_ops.load(Ordering::Acquire),
            conflicts_resolved: self.conflicts_resolved.load(Ordering::Acquire),
            last_sync_at: (last > 0).then_some(last),
            instance_id: self.instance_id().to_string(),
            state: self.state(),
        }
    }
}
