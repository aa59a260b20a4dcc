use dashmap::DashMap;

/// In-memory map from user id to the client id currently addressable for
/// that user. Keyed by user id: a second login displaces the first as the
/// delivery target (last write wins). Owned by the server instance so tests
/// construct isolated registries; rebuilt empty on restart.
pub struct PresenceRegistry {
    entries: DashMap<String, String>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Overwrites any existing mapping. Returns the displaced client id.
    pub fn register(&self, user_id: &str, client_id: &str) -> Option<String> {
        self.entries
            .insert(user_id.to_string(), client_id.to_string())
    }

    pub fn lookup(&self, user_id: &str) -> Option<String> {
        self.entries.get(user_id).map(|e| e.value().clone())
    }

    /// Removes the mapping only when the stored handle is the caller's own.
    /// A disconnect from a displaced connection must not evict the newer
    /// registration. Returns whether an entry was removed.
    pub fn deregister(&self, user_id: &str, client_id: &str) -> bool {
        self.entries
            .remove_if(user_id, |_, stored| stored == client_id)
            .is_some()
    }

    /// Unconditional removal; used by the stale-connection reaper, which
    /// has already decided the stored handle is dead.
    pub fn remove(&self, user_id: &str) -> Option<String> {
        self.entries.remove(user_id).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
