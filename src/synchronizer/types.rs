//! Public types for the synchronizer.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::task::JoinHandle;

use crate::error::FailureKind;

/// Synchronizer lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Not started, or stopped; on-demand calls resolve to a `Stopped` failure
    Stopped,
    /// Periodic tasks scheduled, on-demand calls accepted
    Running,
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "Stopped"),
            Self::Running => write!(f, "Running"),
        }
    }
}

/// Timing and pool sizing for a [`super::Synchronizer`].
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Delay before the first poll
    pub poll_initial_delay: Duration,
    pub poll_interval: Duration,
    pub push_interval: Duration,
    /// How long after a sync a player counts as up to date
    pub freshness_window: Duration,
    /// Concurrent background jobs (periodic ticks and on-demand calls)
    pub workers: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            poll_initial_delay: Duration::from_secs(5),
            poll_interval: Duration::from_secs(10),
            push_interval: Duration::from_secs(30),
            freshness_window: Duration::from_secs(60),
            workers: 2,
        }
    }
}

/// Snapshot returned by [`super::Synchronizer::get_stats`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncStats {
    pub total_sync_ops: u64,
    pub conflicts_resolved: u64,
    /// Epoch millis of the most recent successful sync, if any
    pub last_sync_at: Option<i64>,
    pub instance_id: String,
    pub state: SyncState,
}

/// Result of a force sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForceSyncOutcome {
    /// Only a local copy existed; it was persisted
    Pushed,
    /// Only the stored copy existed; the local cache was invalidated
    Pulled,
    /// Both existed and the merge was persisted
    Merged {
        /// Whether the merge changed anything relative to the local copy
        changed: bool,
    },
    /// Both existed with identical content; nothing was written
    InSync,
    /// Neither a local nor a stored copy exists
    NoData,
    Failed(FailureKind),
}

impl ForceSyncOutcome {
    #[must_use]
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::NoData | Self::Failed(_))
    }

    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Pushed => "pushed",
            Self::Pulled => "pulled",
            Self::Merged { .. } => "merged",
            Self::InSync => "in_sync",
            Self::NoData => "no_data",
            Self::Failed(_) => "failed",
        }
    }
}

impl std::fmt::Display for ForceSyncOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Merged { changed } => write!(f, "merged(changed={})", changed),
            Self::Failed(kind) => write!(f, "failed({})", kind),
            other => write!(f, "{}", other.label()),
        }
    }
}

/// Result of one [`super::Synchronizer::poll_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// Active players whose stored record was read
    pub checked: usize,
    /// Foreign changes detected (cache entries invalidated)
    pub foreign: usize,
    /// Reads that failed or could not be decoded
    pub failed: usize,
}

/// Result of one [`super::Synchronizer::push_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    pub pushed: usize,
    /// Pushes that merged a newer foreign copy first (subset of `pushed`)
    pub merged: usize,
    /// Opted out, or no local record
    pub skipped: usize,
    pub failed: usize,
}

/// Per-player bookkeeping. Process-local, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlayerSync {
    /// Write time of the stored record this instance last reconciled with.
    /// Foreign writes are detected against it.
    pub seen_written_at: Option<i64>,
    /// When this instance last completed a sync; drives freshness.
    pub last_synced_at: Option<i64>,
    pub sync_enabled: bool,
}

impl Default for PlayerSync {
    fn default() -> Self {
        Self {
            seen_written_at: None,
            last_synced_at: None,
            sync_enabled: true,
        }
    }
}

/// Value a [`SyncHandle`] resolves to when its job never ran to completion.
pub trait TaskOutcome: Sized {
    fn interrupted() -> Self;
}

impl TaskOutcome for bool {
    fn interrupted() -> Self {
        false
    }
}

impl TaskOutcome for ForceSyncOutcome {
    fn interrupted() -> Self {
        Self::Failed(FailureKind::Interrupted)
    }
}

/// Future for an on-demand sync.
///
/// Either already resolved (the synchronizer was stopped, or the call was a
/// no-op) or backed by a task on the worker pool. Dropping a spawned handle
/// detaches the job; it still runs to completion.
#[derive(Debug)]
pub enum SyncHandle<T> {
    Ready(Option<T>),
    Spawned(JoinHandle<T>),
}

impl<T> SyncHandle<T> {
    #[must_use]
    pub fn ready(value: T) -> Self {
        Self::Ready(Some(value))
    }

    /// Whether the job ran on the worker pool.
    #[must_use]
    pub fn is_spawned(&self) -> bool {
        matches!(self, Self::Spawned(_))
    }
}

impl<T: TaskOutcome + Unpin> Future for SyncHandle<T> {
    type Output = T;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<T> {
        match self.get_mut() {
            Self::Ready(value) => Poll::Ready(value.take().unwrap_or_else(T::interrupted)),
            Self::Spawned(handle) => match Pin::new(handle).poll(cx) {
                Poll::Ready(Ok(value)) => Poll::Ready(value),
                // Panicked or aborted
                Poll::Ready(Err(_)) => Poll::Ready(T::interrupted()),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
