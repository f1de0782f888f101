// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Cross-instance synchronizer.
//!
//! Keeps this instance's cached view of its active players consistent with
//! writes made by other instances sharing the same document store. There is
//! no lock service: polling bounds staleness and the reconciler resolves
//! divergent copies.
//!
//! # Lifecycle
//!
//! ```text
//!          start()                      stop()
//! Stopped ─────────► Running ─────────────────► Stopped
//!                      │
//!                      ├── poll task  (every poll_interval, after poll_initial_delay)
//!                      │     foreign write seen → invalidate cache entry
//!                      │
//!                      └── push task  (every push_interval)
//!                            re-save local record, merging a newer foreign copy first
//! ```
//!
//! On-demand calls ([`Synchronizer::sync_player_data`], [`Synchronizer::force_sync`])
//! validate the id synchronously and return a [`SyncHandle`] that resolves
//! on the worker pool.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use progression_sync::{PlayerStore, SessionRegistry, SyncSettings, Synchronizer};
//!
//! # async fn example(store: Arc<PlayerStore>) {
//! let sessions = Arc::new(SessionRegistry::new());
//! let sync = Arc::new(Synchronizer::new(SyncSettings::default(), store, sessions.clone()));
//! sync.start().await;
//!
//! sessions.join("p1");
//! let outcome = sync.force_sync("p1").expect("valid id").await;
//! println!("force sync: {}", outcome);
//!
//! sync.stop().await;
//! # }
//! ```

mod api;
mod lifecycle;
mod presence;
mod types;

pub use presence::{PresenceSource, SessionRegistry};
pub use types::{
    ForceSyncOutcome, PlayerSync, PollReport, PushReport, SyncHandle, SyncSettings, SyncState, SyncStats,
    TaskOutcome,
};

use std::future::Future;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};

use crate::player_store::PlayerStore;
use crate::record::{now_millis, Stamp};
use crate::scheduler::PeriodicTask;

pub struct Synchronizer {
    pub(super) settings: SyncSettings,

    pub(super) store: Arc<PlayerStore>,

    /// Players the periodic tasks iterate over
    pub(super) presence: Arc<dyn PresenceSource>,

    /// State (broadcast to watchers)
    pub(super) state: watch::Sender<SyncState>,
    pub(super) state_rx: watch::Receiver<SyncState>,

    /// Per-player bookkeeping
    pub(super) bookkeeping: DashMap<String, PlayerSync>,

    pub(super) total_sync_ops: AtomicU64,
    pub(super) conflicts_resolved: AtomicU64,
    /// Epoch millis of the latest sync; 0 = never
    pub(super) last_sync_at: AtomicI64,

    /// Bounds concurrent background jobs
    pub(super) workers: Arc<Semaphore>,

    /// Poll and push tasks while running
    pub(super) tasks: Mutex<Vec<PeriodicTask>>,
}

impl Synchronizer {
    /// Create a stopped synchronizer. Call [`start()`](Self::start) to schedule
    /// the periodic tasks.
    pub fn new(settings: SyncSettings, store: Arc<PlayerStore>, presence: Arc<dyn PresenceSource>) -> Self {
        let (state_tx, state_rx) = watch::channel(SyncState::Stopped);
        let workers = Arc::new(Semaphore::new(settings.workers.max(1)));

        Self {
            settings,
            store,
            presence,
            state: state_tx,
            state_rx,
            bookkeeping: DashMap::new(),
            total_sync_ops: AtomicU64::new(0),
            conflicts_resolved: AtomicU64::new(0),
            last_sync_at: AtomicI64::new(0),
            workers,
            tasks: Mutex::new(Vec::new()),
        }
    }

    #[must_use]
    pub fn state(&self) -> SyncState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<SyncState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state() == SyncState::Running
    }

    #[must_use]
    pub fn instance_id(&self) -> &str {
        self.store.instance_id()
    }

    #[must_use]
    pub fn store(&self) -> &Arc<PlayerStore> {
        &self.store
    }

    #[must_use]
    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    /// Players participate in push sync unless they opted out.
    #[must_use]
    pub fn is_sync_enabled(&self, id: &str) -> bool {
        self.bookkeeping.get(id).map_or(true, |b| b.sync_enabled)
    }

    #[must_use]
    pub fn last_synced_at(&self, id: &str) -> Option<i64> {
        self.bookkeeping.get(id).and_then(|b| b.last_synced_at)
    }

    /// A stored stamp is a foreign change if another instance wrote it after
    /// the record this instance last reconciled with.
    pub(super) fn is_foreign_change(&self, id: &str, stamp: &Stamp) -> bool {
        if stamp.is_from(self.instance_id()) {
            return false;
        }
        self.bookkeeping
            .get(id)
            .and_then(|b| b.seen_written_at)
            .map_or(true, |seen| stamp.written_at > seen)
    }

    /// Record a completed sync of `id` against a record written at `written_at`.
    pub(super) fn mark_synced(&self, id: &str, written_at: i64) {
        let now = now_millis();
        {
            let mut entry = self.bookkeeping.entry(id.to_string()).or_default();
            entry.seen_written_at = Some(written_at);
            entry.last_synced_at = Some(now);
        }
        self.total_sync_ops.fetch_add(1, Ordering::AcqRel);
        self.last_sync_at.fetch_max(now, Ordering::AcqRel);
    }

    pub(super) fn record_conflict(&self) {
        self.conflicts_resolved.fetch_add(1, Ordering::AcqRel);
        crate::metrics::record_conflict_resolved();
    }

    /// Run `job` on the worker pool.
    pub(super) fn spawn_on_worker<T, F, Fut>(self: &Arc<Self>, job: F) -> SyncHandle<T>
    where
        T: TaskOutcome + Send + 'static,
        F: FnOnce(Arc<Self>) -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
    {
        let this = Arc::clone(self);
        SyncHandle::Spawned(tokio::spawn(async move {
            let Ok(_permit) = this.workers.clone().acquire_owned().await else {
                return T::interrupted();
            };
            job(this).await
        }))
    }
}
