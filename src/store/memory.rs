use super::{resolve_index, resolve_range, StoreBackend};
use crate::Result;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Process-local backend with the same semantics as the SQLite one.
/// Used by tests and by `play` when no shared database is wanted.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    values: HashMap<String, String>,
    lists: HashMap<String, VecDeque<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl StoreBackend for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner().values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.inner().values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut inner = self.inner();
        let had_value = inner.values.remove(key).is_some();
        let had_list = inner.lists.remove(key).is_some();
        Ok(had_value || had_list)
    }

    fn get_del(&self, key: &str) -> Result<Option<String>> {
        Ok(self.inner().values.remove(key))
    }

    fn push_front(&self, key: &str, value: &str) -> Result<usize> {
        let mut inner = self.inner();
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_front(value.to_string());
        Ok(list.len())
    }

    fn push_back(&self, key: &str, value: &str) -> Result<usize> {
        let mut inner = self.inner();
        let list = inner.lists.entry(key.to_string()).or_default();
        list.push_back(value.to_string());
        Ok(list.len())
    }

    fn pop_front(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.inner();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(None);
        };
        let value = list.pop_front();
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(value)
    }

    fn index(&self, key: &str, index: i64) -> Result<Option<String>> {
        let inner = self.inner();
        Ok(inner.lists.get(key).and_then(|list| {
            resolve_index(list.len(), index).and_then(|i| list.get(i).cloned())
        }))
    }

    fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let inner = self.inner();
        let Some(list) = inner.lists.get(key) else {
            return Ok(Vec::new());
        };
        Ok(match resolve_range(list.len(), start, stop) {
            Some((from, to)) => list.range(from..=to).cloned().collect(),
            None => Vec::new(),
        })
    }

    fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        let mut inner = self.inner();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(());
        };
        match resolve_range(list.len(), start, stop) {
            Some((from, to)) => {
                list.truncate(to + 1);
                list.drain(..from);
            }
            None => {
                inner.lists.remove(key);
            }
        }
        Ok(())
    }

    fn remove(&self, key: &str, count: i64, value: &str) -> Result<usize> {
        let mut inner = self.inner();
        let Some(list) = inner.lists.get_mut(key) else {
            return Ok(0);
        };

        let limit = if count == 0 { usize::MAX } else { count.unsigned_abs() as usize };
        let mut positions: Vec<usize> = list
            .iter()
            .enumerate()
            .filter(|(_, v)| v.as_str() == value)
            .map(|(i, _)| i)
            .collect();
        if count < 0 {
            positions.reverse();
        }
        positions.truncate(limit);
        positions.sort_unstable_by(|a, b| b.cmp(a));

        for position in &positions {
            list.remove(*position);
        }
        if list.is_empty() {
            inner.lists.remove(key);
        }
        Ok(positions.len())
    }

    fn len(&self, key: &str) -> Result<usize> {
        Ok(self.inner().lists.get(key).map_or(0, VecDeque::len))
    }
}
