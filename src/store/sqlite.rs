use super::{resolve_index, resolve_range, StoreBackend};
use crate::Result;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// SQLite-backed store shared by every deck process on the device.
///
/// Each primitive runs inside its own `IMMEDIATE` transaction, which gives the
/// single-key/single-list atomicity the protocol relies on. Lists are stored as
/// rows ordered by a signed position so pushes at either end never renumber.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!("Opened store {} (journal_mode={})", db_path.display(), mode);

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.initialize_tables()?;
        Ok(store)
    }

    fn initialize_tables(&self) -> Result<()> {
        let conn = self.conn();

        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS list_items (
                key TEXT NOT NULL,
                pos INTEGER NOT NULL,
                value TEXT NOT NULL,
                PRIMARY KEY (key, pos)
            )",
            [],
        )?;

        Ok(())
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> rusqlite::Result<T>) -> Result<T> {
        let mut conn = self.conn();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    fn positions(tx: &Connection, key: &str) -> rusqlite::Result<Vec<(i64, String)>> {
        let mut stmt = tx.prepare("SELECT pos, value FROM list_items WHERE key = ?1 ORDER BY pos")?;
        let rows = stmt
            .query_map(params![key], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    fn count(tx: &Connection, key: &str) -> rusqlite::Result<usize> {
        tx.query_row(
            "SELECT COUNT(*) FROM list_items WHERE key = ?1",
            params![key],
            |row| row.get::<_, i64>(0),
        )
        .map(|n| n as usize)
    }
}

impl StoreBackend for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        self.write(|tx| {
            let values = tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            let items = tx.execute("DELETE FROM list_items WHERE key = ?1", params![key])?;
            Ok(values + items > 0)
        })
    }

    fn get_del(&self, key: &str) -> Result<Option<String>> {
        self.write(|tx| {
            let value: Option<String> = tx
                .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| row.get(0))
                .optional()?;
            if value.is_some() {
                tx.execute("DELETE FROM kv WHERE key = ?1", params![key])?;
            }
            Ok(value)
        })
    }

    fn push_front(&self, key: &str, value: &str) -> Result<usize> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO list_items (key, pos, value)
                 SELECT ?1, COALESCE(MIN(pos), 1) - 1, ?2 FROM list_items WHERE key = ?1",
                params![key, value],
            )?;
            Self::count(tx, key)
        })
    }

    fn push_back(&self, key: &str, value: &str) -> Result<usize> {
        self.write(|tx| {
            tx.execute(
                "INSERT INTO list_items (key, pos, value)
                 SELECT ?1, COALESCE(MAX(pos), -1) + 1, ?2 FROM list_items WHERE key = ?1",
                params![key, value],
            )?;
            Self::count(tx, key)
        })
    }

    fn pop_front(&self, key: &str) -> Result<Option<String>> {
        self.write(|tx| {
            let head: Option<(i64, String)> = tx
                .query_row(
                    "SELECT pos, value FROM list_items WHERE key = ?1 ORDER BY pos LIMIT 1",
                    params![key],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            if let Some((pos, _)) = &head {
                tx.execute(
                    "DELETE FROM list_items WHERE key = ?1 AND pos = ?2",
                    params![key, pos],
                )?;
            }
            Ok(head.map(|(_, value)| value))
        })
    }

    fn index(&self, key: &str, index: i64) -> Result<Option<String>> {
        let conn = self.conn();
        let len = Self::count(&conn, key)?;
        let Some(offset) = resolve_index(len, index) else {
            return Ok(None);
        };
        let value = conn
            .query_row(
                "SELECT value FROM list_items WHERE key = ?1 ORDER BY pos LIMIT 1 OFFSET ?2",
                params![key, offset as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn range(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let conn = self.conn();
        let items = Self::positions(&conn, key)?;
        Ok(match resolve_range(items.len(), start, stop) {
            Some((from, to)) => items[from..=to].iter().map(|(_, v)| v.clone()).collect(),
            None => Vec::new(),
        })
    }

    fn trim(&self, key: &str, start: i64, stop: i64) -> Result<()> {
        self.write(|tx| {
            let items = Self::positions(tx, key)?;
            match resolve_range(items.len(), start, stop) {
                Some((from, to)) => {
                    let (first, last) = (items[from].0, items[to].0);
                    tx.execute(
                        "DELETE FROM list_items WHERE key = ?1 AND (pos < ?2 OR pos > ?3)",
                        params![key, first, last],
                    )?;
                }
                None => {
                    tx.execute("DELETE FROM list_items WHERE key = ?1", params![key])?;
                }
            }
            Ok(())
        })
    }

    fn remove(&self, key: &str, count: i64, value: &str) -> Result<usize> {
        self.write(|tx| {
            let mut matching: Vec<i64> = Self::positions(tx, key)?
                .into_iter()
                .filter(|(_, v)| v == value)
                .map(|(pos, _)| pos)
                .collect();
            if count < 0 {
                matching.reverse();
            }
            if count != 0 {
                matching.truncate(count.unsigned_abs() as usize);
            }

            for pos in &matching {
                tx.execute(
                    "DELETE FROM list_items WHERE key = ?1 AND pos = ?2",
                    params![key, pos],
                )?;
            }
            Ok(matching.len())
        })
    }

    fn len(&self, key: &str) -> Result<usize> {
        Ok(Self::count(&self.conn(), key)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn temp_store() -> (tempfile::TempDir, SqliteStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(dir.path().join("deck.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn lists_keep_order_across_both_ends() {
        let (_dir, store) = temp_store();
        store.push_back("q", "b").unwrap();
        store.push_back("q", "c").unwrap();
        store.push_front("q", "a").unwrap();
        assert_eq!(store.push_front("q", "z").unwrap(), 4);

        assert_eq!(store.range("q", 0, -1).unwrap(), vec!["z", "a", "b", "c"]);
        assert_eq!(store.range("q", 1, 2).unwrap(), vec!["a", "b"]);
        assert_eq!(store.index("q", 0).unwrap().as_deref(), Some("z"));
        assert_eq!(store.index("q", -1).unwrap().as_deref(), Some("c"));
        assert_eq!(store.index("q", 9).unwrap(), None);

        assert_eq!(store.pop_front("q").unwrap().as_deref(), Some("z"));
        assert_eq!(store.len("q").unwrap(), 3);
    }

    #[test]
    fn trim_and_remove() {
        let (_dir, store) = temp_store();
        for v in ["x", "y", "x", "z"] {
            store.push_back("q", v).unwrap();
        }

        assert_eq!(store.remove("q", 0, "x").unwrap(), 2);
        assert_eq!(store.range("q", 0, -1).unwrap(), vec!["y", "z"]);

        store.trim("q", 0, 0).unwrap();
        assert_eq!(store.range("q", 0, -1).unwrap(), vec!["y"]);

        store.trim("q", 1, 0).unwrap();
        assert_eq!(store.len("q").unwrap(), 0);
    }

    #[test]
    fn values_and_get_del() {
        let (_dir, store) = temp_store();
        assert_eq!(store.get("k").unwrap(), None);

        store.set("k", "one").unwrap();
        store.set("k", "two").unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("two"));

        assert_eq!(store.get_del("k").unwrap().as_deref(), Some("two"));
        assert_eq!(store.get_del("k").unwrap(), None);
        assert!(!store.delete("k").unwrap());
    }

    #[test]
    fn separate_connections_see_each_other() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("deck.db");
        let player = SqliteStore::open(&path).unwrap();
        let control = SqliteStore::open(&path).unwrap();

        control.set("deck:command", "pause").unwrap();
        assert_eq!(player.get_del("deck:command").unwrap().as_deref(), Some("pause"));
        assert_eq!(control.get("deck:command").unwrap(), None);
    }

    #[test]
    fn concurrent_pushes_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let path = Arc::new(dir.path().join("deck.db"));
        SqliteStore::open(path.as_ref()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let path = path.clone();
                thread::spawn(move || {
                    let store = SqliteStore::open(path.as_ref()).unwrap();
                    for i in 0..10 {
                        store.push_back("q", &format!("{n}-{i}")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let store = SqliteStore::open(path.as_ref()).unwrap();
        assert_eq!(store.len("q").unwrap(), 40);
    }
}
