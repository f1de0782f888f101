//! # Progression Sync
//!
//! Player progression state shared by independent game server instances
//! over one document store, with no central coordinator.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  Game logic (host process)                  │
//! │  • Session hooks via SyncContext                            │
//! │  • Progress mutations via DeferredWriter                    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       PlayerStore                           │
//! │  • Read-through / write-through over the expiring cache     │
//! │  • Stamps every write with instance id, time and version    │
//! │  • Degrades to cache-only when the store is unreachable     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               DocumentStore (Redis / SQL / memory)          │
//! │  • One JSON document per player: player_<id>                │
//! │  • Versioned schema with a legacy decoder                   │
//! └─────────────────────────────────────────────────────────────┘
//!                              ▲
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Synchronizer                           │
//! │  • Poll: invalidate cache on foreign writes                 │
//! │  • Push: re-stamp and persist local state                   │
//! │  • Force sync: reconcile local and stored copies            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Consistency
//!
//! Eventual. A write made on one instance becomes visible to another within
//! one poll interval. Diverging copies are combined by [`reconcile::merge`]:
//! monotonic fields (level, progress counters) never go down, `extra` is
//! last-writer-wins.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use progression_sync::{CoreConfig, SyncContext};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CoreConfig::from_toml_str(r#"
//!         [storage]
//!         backend = "redis"
//!         redis_url = "redis://localhost:6379"
//!
//!         [sync]
//!         enabled = true
//!     "#).expect("valid config");
//!
//!     let context = SyncContext::connect(config).await.expect("valid config");
//!     context.start().await;
//!
//!     context.on_session_start("p1", "Alex").await.expect("valid id");
//!     context.writer().add_progress("p1", "mission_4", 1).await.expect("valid id");
//!     context.on_session_end("p1").await.expect("valid id");
//!
//!     context.shutdown().await;
//! }
//! ```
//!
//! ## Modules
//!
//! - [`context`]: [`SyncContext`], the wiring root
//! - [`player_store`]: [`PlayerStore`] read/write facade
//! - [`synchronizer`]: polling, push sync and force sync
//! - [`reconcile`]: the merge algorithm
//! - [`batching`]: deferred writes
//! - [`cache`]: expiring cache
//! - [`storage`]: document store backends
//! - [`schema`]: document encoding and decoding
//! - [`resilience`]: retry and connectivity tracking

pub mod batching;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod metrics;
pub mod player_store;
pub mod reconcile;
pub mod record;
pub mod resilience;
pub mod scheduler;
pub mod schema;
pub mod storage;
pub mod synchronizer;

pub use batching::{ApplyOutcome, DeferredWriter, FlushReason, SavePolicy};
pub use cache::{CachedValue, ExpiringCache, PlayerCache};
pub use config::{CoreConfig, SaveMode, StorageBackend};
pub use context::SyncContext;
pub use error::{ConfigError, DecodeError, FailureKind, SyncError, ValidationError};
pub use metrics::LatencyTimer;
pub use player_store::{PlayerStats, PlayerStore, SaveOutcome};
pub use record::{ExtraValue, PlayerRecord, Stamp};
pub use resilience::retry::RetryConfig;
pub use scheduler::PeriodicTask;
pub use storage::traits::{DocumentStore, StorageError};
pub use synchronizer::{
    ForceSyncOutcome, PollReport, PresenceSource, PushReport, SessionRegistry, SyncHandle, SyncSettings, SyncState,
    SyncStats, Synchronizer,
};
