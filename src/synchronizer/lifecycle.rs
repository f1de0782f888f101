//! Synchronizer lifecycle and the periodic passes.

use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::error::{FailureKind, SyncError};
use crate::player_store::SaveOutcome;
use crate::reconcile::reconcile;
use crate::scheduler::PeriodicTask;

use super::{PollReport, PushReport, SyncState, Synchronizer};

/// What a single push did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PushStep {
    Pushed,
    /// A newer foreign copy was merged in before saving
    Merged,
    NoLocal,
    Failed(FailureKind),
}

impl PushStep {
    pub(super) fn persisted(self) -> bool {
        matches!(self, Self::Pushed | Self::Merged)
    }
}

impl Synchronizer {
    /// Start polling and push sync. A no-op while already running.
    ///
    /// An unreachable store does not prevent starting: every pass degrades to
    /// best effort and the store's outage is logged once.
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id()))]
    pub async fn start(self: &Arc<Self>) {
        let started = self.state.send_if_modified(|state| {
            if *state == SyncState::Stopped {
                *state = SyncState::Running;
                true
            } else {
                false
            }
        });
        if !started {
            debug!("Synchronizer already running");
            return;
        }

        let documents = self.store.documents();
        match documents.ping().await {
            Ok(()) => {
                self.store.health().record_success();
                info!(backend = documents.backend_name(), "Document store reachable");
            }
            Err(e) => {
                self.store.health().record_failure("ping", &e);
                warn!(
                    backend = documents.backend_name(),
                    error = %e,
                    "Document store unreachable at start, sync is best effort until it recovers"
                );
            }
        }

        let poll = Self::spawn_periodic(
            Arc::downgrade(self),
            "sync_poll",
            self.settings.poll_initial_delay,
            self.settings.poll_interval,
            |sync| async move {
                sync.poll_once().await;
            },
        );
        let push = Self::spawn_periodic(
            Arc::downgrade(self),
            "sync_push",
            self.settings.push_interval,
            self.settings.push_interval,
            |sync| async move {
                sync.push_once().await;
            },
        );

        {
            let mut tasks = self.tasks.lock();
            tasks.push(poll);
            tasks.push(push);
        }

        // stop() may have run while we were pinging
        if !self.is_running() {
            let tasks = std::mem::take(&mut *self.tasks.lock());
            for task in &tasks {
                task.cancel();
            }
            return;
        }

        crate::metrics::set_sync_state("running");
        info!(
            poll_interval = ?self.settings.poll_interval,
            push_interval = ?self.settings.push_interval,
            workers = self.settings.workers,
            "Synchronizer started"
        );
    }

    /// Cancel the periodic tasks. Safe to call repeatedly.
    ///
    /// On-demand jobs already handed out run to completion; new ones resolve
    /// to a `Stopped` failure.
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id()))]
    pub async fn stop(&self) {
        let stopped = self.state.send_if_modified(|state| {
            if *state == SyncState::Running {
                *state = SyncState::Stopped;
                true
            } else {
                false
            }
        });

        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            task.shutdown().await;
        }

        if stopped {
            crate::metrics::set_sync_state("stopped");
            info!(
                total_sync_ops = self.total_sync_ops.load(std::sync::atomic::Ordering::Acquire),
                "Synchronizer stopped"
            );
        }
    }

    fn spawn_periodic<F, Fut>(
        sync: Weak<Self>,
        name: &'static str,
        initial_delay: Duration,
        period: Duration,
        pass: F,
    ) -> PeriodicTask
    where
        F: Fn(Arc<Self>) -> Fut + Send + Sync + Clone + 'static,
        Fut: std::future::Future<Output = ()> + Send + 'static,
    {
        PeriodicTask::spawn(name, initial_delay, period, move || {
            let sync = sync.clone();
            let pass = pass.clone();
            async move {
                let Some(sync) = sync.upgrade() else {
                    return;
                };
                let Ok(_permit) = sync.workers.clone().acquire_owned().await else {
                    return;
                };
                pass(sync).await;
            }
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // Periodic passes
    // ═══════════════════════════════════════════════════════════════════════════

    /// One change-detection pass over the active players.
    ///
    /// A stored record written by another instance after this instance last
    /// synced the player invalidates the player's cache entries, so the next
    /// read reloads from the store.
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id()))]
    pub async fn poll_once(&self) -> PollReport {
        let started = Instant::now();
        let mut report = PollReport::default();

        for id in self.presence.active_players() {
            report.checked += 1;
            match self.store.fetch_remote(&id).await {
                Ok(Some(remote)) if self.is_foreign_change(&id, &remote.stamp) => {
                    let removed = self.store.invalidate(&id);
                    self.mark_synced(&id, remote.stamp.written_at);
                    report.foreign += 1;
                    crate::metrics::record_foreign_change();
                    debug!(
                        player = %id,
                        writer = %remote.stamp.writer_id,
                        version = remote.stamp.version,
                        removed,
                        "Foreign change detected"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    report.failed += 1;
                    debug!(player = %id, error = %e, "Poll read failed");
                }
            }
        }

        crate::metrics::record_poll_cycle(started.elapsed(), report.checked);
        crate::metrics::record_sync_operation("poll", if report.failed == 0 { "success" } else { "partial" });
        report
    }

    /// One push pass: re-save every active, sync-enabled player's local record.
    #[tracing::instrument(skip(self), fields(instance = %self.instance_id()))]
    pub async fn push_once(&self) -> PushReport {
        let mut report = PushReport::default();

        for id in self.presence.active_players() {
            if !self.is_sync_enabled(&id) {
                report.skipped += 1;
                continue;
            }
            match self.push_local(&id).await {
                PushStep::Pushed => report.pushed += 1,
                PushStep::Merged => {
                    report.pushed += 1;
                    report.merged += 1;
                }
                PushStep::NoLocal => report.skipped += 1,
                PushStep::Failed(_) => report.failed += 1,
            }
        }

        if report.pushed > 0 || report.failed > 0 {
            debug!(
                pushed = report.pushed,
                merged = report.merged,
                failed = report.failed,
                "Push pass complete"
            );
        }
        report
    }

    /// Re-stamp and persist the local record.
    ///
    /// A stored copy written by another instance with a higher version is
    /// merged in first, so a push never overwrites a newer foreign write.
    pub(super) async fn push_local(&self, id: &str) -> PushStep {
        let mut local = match self.store.load(id).await {
            Ok(Some(record)) => record,
            Ok(None) => return PushStep::NoLocal,
            Err(e) => return PushStep::Failed(e.kind()),
        };

        let mut merged = false;
        match self.store.fetch_remote(id).await {
            Ok(Some(remote))
                if !remote.stamp.is_from(self.instance_id()) && remote.stamp.version > local.stamp.version =>
            {
                let outcome = reconcile(&local, &remote);
                if outcome.changed {
                    self.record_conflict();
                }
                let version = remote.stamp.version.max(local.stamp.version);
                local = outcome.merged;
                local.stamp.version = version;
                merged = true;
            }
            Ok(_) => {}
            // Unreadable stored copy; the local one replaces it
            Err(SyncError::Deserialization { .. }) => {}
            Err(e) => return PushStep::Failed(e.kind()),
        }

        let step = match self.store.save(id, local).await {
            Ok(SaveOutcome::Persisted(stamp)) => {
                self.mark_synced(id, stamp.written_at);
                if merged {
                    PushStep::Merged
                } else {
                    PushStep::Pushed
                }
            }
            Ok(SaveOutcome::CachedOnly(kind)) => PushStep::Failed(kind),
            Err(_) => PushStep::Failed(FailureKind::Validation),
        };
        crate::metrics::record_sync_operation("push", if step.persisted() { "success" } else { "error" });
        step
    }
}
