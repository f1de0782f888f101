// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Two game server instances sharing one player.
//!
//! Demonstrates:
//! 1. Two contexts over one shared document store
//! 2. Batched progress writes and a session-end flush
//! 3. Change detection with a poll pass
//! 4. Force sync merging diverging copies
//! 5. Displaying captured metrics
//!
//! Runs entirely in-process; no external services needed.
//!
//! # Run
//!
//! ```bash
//! RUST_LOG=progression_sync=debug cargo run --example two_instances
//! ```

use std::sync::Arc;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};
use progression_sync::storage::memory::MemoryDocumentStore;
use progression_sync::{CoreConfig, DocumentStore, SyncContext};

fn config(instance: &str) -> Result<CoreConfig, progression_sync::ConfigError> {
    CoreConfig::from_toml_str(&format!(
        r#"
        instance_id = "{instance}"

        [sync]
        enabled = true
        poll_interval_secs = 3600
        push_interval_secs = 3600

        [save]
        mode = "batched"
        batch_threshold = 5
        "#
    ))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder.install().expect("failed to install metrics recorder");

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    println!("\n╔═══════════════════════════════════════════════════════════════╗");
    println!("║           progression-sync: Two Instances Example             ║");
    println!("╚═══════════════════════════════════════════════════════════════╝\n");

    // ─────────────────────────────────────────────────────────────────────────
    // 1. Two instances, one store
    // ─────────────────────────────────────────────────────────────────────────
    let documents: Arc<dyn DocumentStore> = Arc::new(MemoryDocumentStore::new());
    let lobby = SyncContext::with_documents(config("lobby-1")?, documents.clone())?;
    let survival = SyncContext::with_documents(config("survival-1")?, documents.clone())?;
    lobby.start().await;
    survival.start().await;
    println!("📦 Started {} and {}", lobby.instance_id(), survival.instance_id());

    // ─────────────────────────────────────────────────────────────────────────
    // 2. Play a session on the lobby
    // ─────────────────────────────────────────────────────────────────────────
    lobby.on_session_start("p1", "Alex").await?;
    for _ in 0..3 {
        lobby.writer().add_progress("p1", "mission_4", 5).await?;
    }
    println!(
        "\n✍️  Lobby: {} pending mutations for p1",
        lobby.writer().pending_mutations("p1")
    );
    lobby.on_session_end("p1").await?;
    println!("   └─ Session ended, pending writes flushed");

    // ─────────────────────────────────────────────────────────────────────────
    // 3. Join survival; it loads the stored copy
    // ─────────────────────────────────────────────────────────────────────────
    let joined = survival.on_session_start("p1", "Alex").await?;
    println!(
        "\n🔁 Survival: p1 joined with mission_4 = {}",
        joined.progress_of("mission_4")
    );

    // Lobby writes again; survival notices on its next poll
    lobby.store().set_level("p1", 4).await?;
    let report = survival.synchronizer().poll_once().await;
    println!(
        "   └─ Poll: checked={} foreign={} failed={}",
        report.checked, report.foreign, report.failed
    );
    println!("   └─ Survival now sees level {}", survival.store().get_level("p1").await?);

    // ─────────────────────────────────────────────────────────────────────────
    // 4. Diverge and force sync
    // ─────────────────────────────────────────────────────────────────────────
    survival.writer().add_progress("p1", "mission_5", 2).await?;
    let outcome = survival.synchronizer().force_sync("p1")?.await;
    println!("\n🤝 Force sync: {}", outcome);

    let stats = survival.store().player_stats("p1").await?;
    println!(
        "   └─ p1: level={} tracked_missions={}",
        stats.level, stats.tracked_missions
    );
    let sync_stats = survival.synchronizer().get_stats();
    println!(
        "   └─ Sync stats: ops={} conflicts={} state={}",
        sync_stats.total_sync_ops, sync_stats.conflicts_resolved, sync_stats.state
    );

    // ─────────────────────────────────────────────────────────────────────────
    // 5. Metrics and shutdown
    // ─────────────────────────────────────────────────────────────────────────
    println!("\n📈 Metrics:");
    dump_metrics(&snapshotter);

    survival.on_session_end("p1").await?;
    lobby.shutdown().await;
    survival.shutdown().await;
    println!("\n🛑 Both instances shut down\n");

    Ok(())
}

fn dump_metrics(snapshotter: &Snapshotter) {
    let mut lines: Vec<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, value)| {
            let (_, key) = composite_key.into_parts();
            let labels: Vec<String> = key.labels().map(|l| format!("{}={}", l.key(), l.value())).collect();
            let label_str = if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            };
            let rendered = match value {
                DebugValue::Counter(v) => v.to_string(),
                DebugValue::Gauge(v) => format!("{:.2}", v.into_inner()),
                DebugValue::Histogram(samples) => format!("{} samples", samples.len()),
            };
            format!("{}{} = {}", key.name(), label_str, rendered)
        })
        .collect();
    lines.sort();

    if lines.is_empty() {
        println!("   └─ (no metrics recorded)");
    }
    for line in lines {
        println!("   └─ {}", line);
    }
}
