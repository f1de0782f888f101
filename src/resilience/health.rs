// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store connectivity tracking.
//!
//! An outage is logged at `warn` once, when the first failure is seen.
//! Further failures during the same outage go to `debug`, and the first
//! success afterwards logs the recovery.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::{debug, info, warn};

use crate::storage::traits::StorageError;

/// Consecutive failures before the store is reported unhealthy.
const UNHEALTHY_AFTER: u64 = 3;

pub struct ConnectivityMonitor {
    backend: &'static str,
    /// Last known health state
    healthy: AtomicBool,
    /// Consecutive failure count
    failures: AtomicU64,
    /// Set while an outage is in progress
    in_outage: AtomicBool,
}

impl ConnectivityMonitor {
    pub fn new(backend: &'static str) -> Self {
        Self {
            backend,
            healthy: AtomicBool::new(true),
            failures: AtomicU64::new(0),
            in_outage: AtomicBool::new(false),
        }
    }

    pub fn record_success(&self) {
        self.failures.store(0, Ordering::Release);
        self.healthy.store(true, Ordering::Release);
        if self.in_outage.swap(false, Ordering::AcqRel) {
            info!(backend = self.backend, "Document store reachable again");
            crate::metrics::set_backend_healthy(self.backend, true);
        }
    }

    pub fn record_failure(&self, operation: &str, error: &StorageError) {
        let failures = self.failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= UNHEALTHY_AFTER {
            self.healthy.store(false, Ordering::Release);
        }

        if self.in_outage.swap(true, Ordering::AcqRel) {
            debug!(backend = self.backend, operation, failures, error = %error, "Document store still failing");
        } else {
            warn!(
                backend = self.backend,
                operation,
                error = %error,
                "Document store failure, continuing from cache"
            );
            crate::metrics::set_backend_healthy(self.backend, false);
        }
        crate::metrics::record_connection_error(self.backend);
    }

    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn failure_count(&self) -> u64 {
        self.failures.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn in_outage(&self) -> bool {
        self.in_outage.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn err() -> StorageError {
        StorageError::Unavailable("refused".into())
    }

    #[test]
    fn test_starts_healthy() {
        let monitor = ConnectivityMonitor::new("memory");
        assert!(monitor.is_healthy());
        assert!(!monitor.in_outage());
        assert_eq!(monitor.failure_count(), 0);
    }

    #[test]
    fn test_unhealthy_after_consecutive_failures() {
        let monitor = ConnectivityMonitor::new("redis");
        monitor.record_failure("get", &err());
        monitor.record_failure("get", &err());
        assert!(monitor.is_healthy());
        assert!(monitor.in_outage());

        monitor.record_failure("put", &err());
        assert!(!monitor.is_healthy());
        assert_eq!(monitor.failure_count(), 3);
    }

    #[test]
    fn test_success_resets() {
        let monitor = ConnectivityMonitor::new("redis");
        for _ in 0..5 {
            monitor.record_failure("get", &err());
        }
        monitor.record_success();
        assert!(monitor.is_healthy());
        assert!(!monitor.in_outage());
        assert_eq!(monitor.failure_count(), 0);
    }
}
