//! Session-scoped key-value store.
//!
//! Mirrors a browser tab's session storage: string keys and values, no
//! expiry, cleared when the session ends. Readers are responsible for
//! judging staleness of anything they put here.

use std::collections::HashMap;

use parking_lot::RwLock;

/// Ephemeral key-value collaborator. Writes replace whole values.
pub trait EphemeralStore: Send + Sync {
    fn set(&self, key: &str, value: String);
    fn get(&self, key: &str) -> Option<String>;
    fn remove(&self, key: &str);

    /// Write several keys as one record. Stores that can must make the
    /// batch atomic with respect to [`EphemeralStore::get_many`].
    fn set_many(&self, entries: &[(&str, String)]) {
        for (key, value) in entries {
            self.set(key, value.clone());
        }
    }

    /// Read several keys as one snapshot, in the order given.
    fn get_many(&self, keys: &[&str]) -> Vec<Option<String>> {
        keys.iter().map(|key| self.get(key)).collect()
    }
}

/// In-memory store that lives as long as the session object.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drop everything, as when a tab closes.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl EphemeralStore for MemorySessionStore {
    fn set(&self, key: &str, value: String) {
        self.entries.write().insert(key.to_string(), value);
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.read().get(key).cloned()
    }

    fn remove(&self, key: &str) {
        self.entries.write().remove(key);
    }

    fn set_many(&self, entries: &[(&str, String)]) {
        let mut map = self.entries.write();
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
    }

    fn get_many(&self, keys: &[&str]) -> Vec<Option<String>> {
        let map = self.entries.read();
        keys.iter().map(|key| map.get(*key).cloned()).collect()
    }
}
