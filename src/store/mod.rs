// Shared store - the only channel between the spinning player and control invocations
// Every key lives under a namespace prefix so several decks can share one database

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::config::StoreConfig;
use crate::Result;
use std::sync::Arc;

/// Conceptual key names, before namespacing
pub mod keys {
    pub const QUEUE: &str = "queue";
    pub const RECENTLY_PLAYED: &str = "recently_played";
    pub const CURRENT_TRACK: &str = "current_track";
    pub const STATE: &str = "state";
    pub const COMMAND: &str = "command";
    pub const VOLUME: &str = "volume";
    pub const MUTED: &str = "muted";
    pub const SCROBBLE_QUEUE: &str = "scrobble_queue";
}

/// Raw key/value + list primitives. Implementations must make each single call
/// atomic; nothing above this layer takes locks.
///
/// Lists are ordered head to tail. Indices follow the usual list-store
/// convention: negative values count back from the tail, `-1` being the last
/// element, and ranges are inclusive on both ends.
pub trait StoreBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn delete(&self, key: &str) -> Result<bool>;
    /// Read and delete in one step
    fn get_del(&self, key: &str) -> Result<Option<String>>;

    fn push_front(&self, key: &str, value: &str) -> Result<usize>;
    fn push_back(&self, key: &str, value: &str) -> Result<usize>;
    fn pop_front(&self, key: &str) -> Result<Option<String>>;
    fn index(&self, key: &str, index: i64) -> Result<Option<String>>;
    fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>>;
    /// Keep only `start..=stop`; an empty window deletes the list
    fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()>;
    /// Remove up to `count` entries equal to `value`: from the head when
    /// positive, from the tail when negative, all of them when zero
    fn remove(&self, key: &str, count: i64, value: &str) -> Result<usize>;
    fn len(&self, key: &str) -> Result<usize>;
}

/// Resolve an inclusive `start..=stop` window against a list of `len` items.
/// Returns None when the window selects nothing.
pub(crate) fn resolve_range(len: usize, start: i64, stop: i64) -> Option<(usize, usize)> {
    let len = len as i64;
    let start = if start < 0 { (len + start).max(0) } else { start };
    let stop = if stop < 0 { len + stop } else { stop.min(len - 1) };

    if len == 0 || start > stop || start >= len || stop < 0 {
        return None;
    }
    Some((start as usize, stop as usize))
}

pub(crate) fn resolve_index(len: usize, index: i64) -> Option<usize> {
    let len = len as i64;
    let index = if index < 0 { len + index } else { index };
    (0..len).contains(&index).then_some(index as usize)
}

/// Namespaced handle passed to every component. Cheap to clone.
#[derive(Clone)]
pub struct SharedStore {
    backend: Arc<dyn StoreBackend>,
    namespace: Arc<str>,
}

impl SharedStore {
    pub fn new(backend: Arc<dyn StoreBackend>, namespace: &str) -> Self {
        Self {
            backend,
            namespace: Arc::from(namespace),
        }
    }

    pub fn open(config: &StoreConfig) -> Result<Self> {
        let backend = SqliteStore::open(&config.database_path)?;
        Ok(Self::new(Arc::new(backend), &config.namespace))
    }

    pub fn in_memory(namespace: &str) -> Self {
        Self::new(Arc::new(MemoryStore::new()), namespace)
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        self.backend.get(&self.key(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        self.backend.set(&self.key(key), value)
    }

    pub fn delete(&self, key: &str) -> Result<bool> {
        self.backend.delete(&self.key(key))
    }

    pub fn get_del(&self, key: &str) -> Result<Option<String>> {
        self.backend.get_del(&self.key(key))
    }

    pub fn push_front(&self, key: &str, value: &str) -> Result<usize> {
        self.backend.push_front(&self.key(key), value)
    }

    pub fn push_back(&self, key: &str, value: &str) -> Result<usize> {
        self.backend.push_back(&self.key(key), value)
    }

    pub fn pop_front(&self, key: &str) -> Result<Option<String>> {
        self.backend.pop_front(&self.key(key))
    }

    pub fn index(&self, key: &str, index: i64) -> Result<Option<String>> {
        self.backend.index(&self.key(key), index)
    }

    pub fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        self.backend.range(&self.key(key), start, stop)
    }

    pub fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.backend.trim(&self.key(key), start, stop)
    }

    pub fn remove(&self, key: &str, count: i64, value: &str) -> Result<usize> {
        self.backend.remove(&self.key(key), count, value)
    }

    pub fn len(&self, key: &str) -> Result<usize> {
        self.backend.len(&self.key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_resolution_follows_list_conventions() {
        assert_eq!(resolve_range(5, 0, -1), Some((0, 4)));
        assert_eq!(resolve_range(5, 0, 99), Some((0, 4)));
        assert_eq!(resolve_range(5, -2, -1), Some((3, 4)));
        assert_eq!(resolve_range(5, 1, 0), None);
        assert_eq!(resolve_range(0, 0, -1), None);
        assert_eq!(resolve_range(3, 5, 10), None);
        assert_eq!(resolve_range(3, -10, 0), Some((0, 0)));
    }

    #[test]
    fn index_resolution_counts_back_from_tail() {
        assert_eq!(resolve_index(3, 0), Some(0));
        assert_eq!(resolve_index(3, -1), Some(2));
        assert_eq!(resolve_index(3, 3), None);
        assert_eq!(resolve_index(3, -4), None);
    }

    #[test]
    fn namespaces_do_not_leak() {
        let backend: Arc<dyn StoreBackend> = Arc::new(MemoryStore::new());
        let kitchen = SharedStore::new(backend.clone(), "kitchen");
        let lounge = SharedStore::new(backend.clone(), "lounge");

        kitchen.set(keys::VOLUME, "400").unwrap();
        lounge.push_back(keys::QUEUE, "x").unwrap();

        assert_eq!(lounge.get(keys::VOLUME).unwrap(), None);
        assert_eq!(kitchen.len(keys::QUEUE).unwrap(), 0);
        assert_eq!(backend.get("kitchen:volume").unwrap().as_deref(), Some("400"));
    }
}
