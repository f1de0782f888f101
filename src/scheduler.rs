// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Periodic background tasks.
//!
//! A [`PeriodicTask`] runs an async tick on a fixed interval after an initial
//! delay, until cancelled. Cancellation is observed both between ticks and
//! while a tick is in flight, so a cancelled task never starts another pass
//! and abandons the current one at its next await point.
//!
//! ```rust,no_run
//! use progression_sync::scheduler::PeriodicTask;
//! use std::time::Duration;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let task = PeriodicTask::spawn("heartbeat", Duration::ZERO, Duration::from_secs(5), || async {
//!     tracing::info!("tick");
//! });
//! task.cancel();
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Smallest period accepted; `tokio::time::interval` rejects zero.
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Handle to a running periodic task. Dropping the handle cancels the task.
pub struct PeriodicTask {
    name: &'static str,
    cancel_tx: watch::Sender<bool>,
    handle: Option<JoinHandle<()>>,
}

impl PeriodicTask {
    /// Spawn on the current tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, initial_delay: Duration, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (cancel_tx, mut cancel_rx) = watch::channel(false);
        let period = period.max(MIN_PERIOD);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(initial_delay) => {}
                _ = cancel_rx.changed() => {
                    debug!(task = name, "Periodic task cancelled before first run");
                    return;
                }
            }

            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel_rx.changed() => break,
                    _ = interval.tick() => {
                        tokio::select! {
                            biased;
                            _ = cancel_rx.changed() => break,
                            _ = tick() => {}
                        }
                    }
                }
            }
            debug!(task = name, "Periodic task stopped");
        });

        Self {
            name,
            cancel_tx,
            handle: Some(handle),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signal the task to stop. Safe to call repeatedly.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Cancel and wait for the task to exit.
    pub async fn shutdown(mut self) {
        self.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        let _ = self.cancel_tx.send(true);
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_task(initial: Duration, period: Duration) -> (PeriodicTask, Arc<AtomicUsize>) {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = PeriodicTask::spawn("test", initial, period, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        (task, ticks)
    }

    #[tokio::test]
    async fn test_ticks_repeatedly() {
        let (task, ticks) = counting_task(Duration::ZERO, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 3);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_initial_delay_is_honoured() {
        let (task, ticks) = counting_task(Duration::from_millis(200), Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);
        task.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_stops_ticking() {
        let (task, ticks) = counting_task(Duration::ZERO, Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(40)).await;
        task.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let after_cancel = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_cancel);
        assert!(task.is_finished());

        // Second cancel is harmless
        task.cancel();
    }

    #[tokio::test]
    async fn test_cancel_interrupts_in_flight_tick() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = finished.clone();
        let task = PeriodicTask::spawn("slow", Duration::ZERO, Duration::from_millis(10), move || {
            let counter = counter.clone();
            async move {
                tokio::time::sleep(Duration::from_secs(5)).await;
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(Duration::from_secs(1), task.shutdown())
            .await
            .expect("shutdown must not wait for the slow tick");
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_zero_period_is_clamped() {
        let (task, ticks) = counting_task(Duration::ZERO, Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(ticks.load(Ordering::SeqCst) >= 1);
        drop(task);
    }
}
