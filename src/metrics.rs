// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for progression-sync.
//!
//! Uses the `metrics` crate facade. The host process picks the exporter.
//!
//! # Metric Naming Convention
//! - `progression_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `backend`: memory, redis, sqlite, mysql, offline
//! - `operation`: get, put, exists, scan_prefix
//! - `status`: success, error

use metrics::{counter, gauge, histogram};
use std::time::{Duration, Instant};

// ═══════════════════════════════════════════════════════════════════════════
// CACHE
// ═══════════════════════════════════════════════════════════════════════════

/// Record a cache lookup outcome (hit, miss, expired)
pub fn record_cache_lookup(outcome: &str) {
    counter!(
        "progression_sync_cache_lookups_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record entries removed by one sweep pass
pub fn record_cache_sweep(removed: usize) {
    counter!("progression_sync_cache_swept_total").increment(removed as u64);
}

pub fn set_cache_entries(count: usize) {
    gauge!("progression_sync_cache_entries").set(count as f64);
}

// ═══════════════════════════════════════════════════════════════════════════
// DOCUMENT STORE
// ═══════════════════════════════════════════════════════════════════════════

pub fn record_store_operation(backend: &str, operation: &str, status: &str) {
    counter!(
        "progression_sync_store_operations_total",
        "backend" => backend.to_string(),
        "operation" => operation.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

pub fn record_store_latency(backend: &str, operation: &str, duration: Duration) {
    histogram!(
        "progression_sync_store_operation_seconds",
        "backend" => backend.to_string(),
        "operation" => operation.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Set backend health status (1 = healthy, 0 = unhealthy)
pub fn set_backend_healthy(backend: &str, healthy: bool) {
    gauge!(
        "progression_sync_backend_healthy",
        "backend" => backend.to_string()
    )
    .set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_connection_error(backend: &str) {
    counter!(
        "progression_sync_connection_errors_total",
        "backend" => backend.to_string()
    )
    .increment(1);
}

/// Stored document that no decoder accepted
pub fn record_decode_failure() {
    counter!("progression_sync_decode_failures_total").increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// SYNCHRONIZER
// ═══════════════════════════════════════════════════════════════════════════

/// Record a sync operation (poll, push, sync, force)
pub fn record_sync_operation(kind: &str, status: &str) {
    counter!(
        "progression_sync_sync_operations_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Foreign write detected by polling
pub fn record_foreign_change() {
    counter!("progression_sync_foreign_changes_total").increment(1);
}

pub fn record_conflict_resolved() {
    counter!("progression_sync_conflicts_resolved_total").increment(1);
}

pub fn record_poll_cycle(duration: Duration, checked: usize) {
    histogram!("progression_sync_poll_cycle_seconds").record(duration.as_secs_f64());
    histogram!("progression_sync_poll_cycle_players").record(checked as f64);
}

/// Set synchronizer state (for monitoring state transitions)
pub fn set_sync_state(state: &str) {
    counter!(
        "progression_sync_state_transitions_total",
        "state" => state.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEFERRED WRITES
// ═══════════════════════════════════════════════════════════════════════════

pub fn record_flush(reason: &str, count: usize) {
    counter!(
        "progression_sync_flushes_total",
        "reason" => reason.to_string()
    )
    .increment(count as u64);
}

pub fn set_pending_writes(count: usize) {
    gauge!("progression_sync_pending_writes").set(count as f64);
}

/// Records store latency when dropped.
pub struct LatencyTimer {
    backend: &'static str,
    operation: &'static str,
    start: Instant,
}

impl LatencyTimer {
    pub fn new(backend: &'static str, operation: &'static str) -> Self {
        Self {
            backend,
            operation,
            start: Instant::now(),
        }
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        record_store_latency(self.backend, self.operation, self.start.elapsed());
    }
}
