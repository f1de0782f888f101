//! Deterministic merge of two versions of one player's record.
//!
//! | Field          | Rule                                   |
//! |----------------|----------------------------------------|
//! | `id`, `name`   | local                                  |
//! | `level`        | max                                    |
//! | `last_seen_at` | max                                    |
//! | `progress`     | key union, max per key                 |
//! | `extra`        | key union, remote wins on shared keys  |
//! | `stamp`        | reset; the caller re-stamps on save    |
//!
//! The monotonic fields are commutative and idempotent. `extra` is
//! last-writer-wins, so a concurrent edit on the losing side is dropped.
//!
//! ```
//! use progression_sync::{reconcile::merge, PlayerRecord};
//!
//! let mut local = PlayerRecord::new("p1", "Alex");
//! local.level = 3;
//! local.progress.insert("mission_4".into(), 10);
//!
//! let mut remote = PlayerRecord::new("p1", "Alex");
//! remote.level = 2;
//! remote.progress.insert("mission_4".into(), 15);
//!
//! let merged = merge(&local, &remote);
//! assert_eq!(merged.level, 3);
//! assert_eq!(merged.progress_of("mission_4"), 15);
//! ```

use crate::record::{PlayerRecord, Stamp};

/// Result of [`reconcile`].
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub merged: PlayerRecord,
    /// Whether `merged` differs from the local input in any content field
    pub changed: bool,
}

#[must_use]
pub fn merge(local: &PlayerRecord, remote: &PlayerRecord) -> PlayerRecord {
    let mut progress = local.progress.clone();
    for (key, &count) in &remote.progress {
        progress
            .entry(key.clone())
            .and_modify(|current| *current = (*current).max(count))
            .or_insert(count);
    }

    let mut extra = local.extra.clone();
    for (key, value) in &remote.extra {
        extra.insert(key.clone(), value.clone());
    }

    PlayerRecord {
        id: local.id.clone(),
        display_name: local.display_name.clone(),
        level: local.level.max(remote.level),
        last_seen_at: local.last_seen_at.max(remote.last_seen_at),
        progress,
        extra,
        stamp: Stamp::default(),
    }
}

#[must_use]
pub fn reconcile(local: &PlayerRecord, remote: &PlayerRecord) -> Reconciled {
    let merged = merge(local, remote);
    let changed = !merged.same_content(local);
    Reconciled { merged, changed }
}
