//! Local cache of player state.
//!
//! Keys are namespaced per owner as `<namespace>_<owner>`:
//!
//! | Key             | Value                       | TTL                      |
//! |-----------------|-----------------------------|--------------------------|
//! | `player_<id>`   | [`CachedValue::Record`]     | default, short on write  |
//! | `exists_<id>`   | [`CachedValue::Exists`]     | medium                   |
//!
//! [`ExpiringCache::invalidate_owner`] relies on this layout: it drops every
//! key whose suffix after the first `_` is exactly the owner id.

pub mod expiring;

pub use expiring::{CacheEntry, CacheStats, ExpiringCache};

use crate::record::PlayerRecord;

/// Namespace of player record keys (also the document store key layout).
pub const PLAYER_NAMESPACE: &str = "player";
/// Namespace of cached existence probes.
pub const EXISTS_NAMESPACE: &str = "exists";

/// What the player cache holds.
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Record(PlayerRecord),
    Exists(bool),
}

pub type PlayerCache = ExpiringCache<CachedValue>;

pub fn player_key(id: &str) -> String {
    format!("{}_{}", PLAYER_NAMESPACE, id)
}

pub fn exists_key(id: &str) -> String {
    format!("{}_{}", EXISTS_NAMESPACE, id)
}

/// Owner part of a namespaced key; `None` for keys without a namespace.
pub fn owner_of(key: &str) -> Option<&str> {
    key.split_once('_').map(|(_, owner)| owner)
}
