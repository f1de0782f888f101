//! Which players are active on this instance.

use dashmap::DashSet;

/// Source of the players the periodic tasks iterate over.
///
/// The host's session layer owns presence; [`SessionRegistry`] is the
/// in-process implementation it feeds through join/leave hooks.
pub trait PresenceSource: Send + Sync {
    fn active_players(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct SessionRegistry {
    players: DashSet<String>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the player was already registered.
    pub fn join(&self, id: &str) -> bool {
        self.players.insert(id.to_string())
    }

    /// Returns `false` if the player was not registered.
    pub fn leave(&self, id: &str) -> bool {
        self.players.remove(id).is_some()
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.players.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.players.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl PresenceSource for SessionRegistry {
    fn active_players(&self) -> Vec<String> {
        let mut players: Vec<String> = self.players.iter().map(|p| p.key().clone()).collect();
        players.sort();
        players
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_leave() {
        let registry = SessionRegistry::new();
        assert!(registry.join("p2"));
        assert!(registry.join("p1"));
        assert!(!registry.join("p1"));
        assert_eq!(registry.active_players(), vec!["p1".to_string(), "p2".to_string()]);

        assert!(registry.leave("p1"));
        assert!(!registry.leave("p1"));
        assert!(!registry.contains("p1"));
        assert_eq!(registry.len(), 1);
    }
}
