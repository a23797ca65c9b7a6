//! RedbStore — the shared state tree persisted in redb.
//!
//! Leaves are stored one row per path with JSON-serialized values. Parent
//! reads are prefix scans. Supports on-disk and in-memory backends (the
//! latter for testing).

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable, WriteTransaction};
use serde_json::Value;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::store::{assemble, flatten, normalize, SharedStore, StoreFuture};
use crate::tables::NODES;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe shared state store backed by redb.
#[derive(Clone)]
pub struct RedbStore {
    db: Arc<Database>,
}

impl RedbStore {
    /// Open (or create) a persistent store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(NODES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Read the value at `path`, assembling an object for parent paths.
    pub fn read(&self, path: &str) -> StoreResult<Option<Value>> {
        let path = normalize(path);
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(NODES).map_err(map_err!(Table))?;

        if !path.is_empty()
            && let Some(guard) = table.get(path.as_str()).map_err(map_err!(Read))?
        {
            let value: Value =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            return Ok(Some(value));
        }

        let prefix = child_prefix(&path);
        let mut leaves = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if let Some(rel) = key.value().strip_prefix(prefix.as_str()) {
                let leaf: Value =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                leaves.push((rel.to_string(), leaf));
            }
        }
        Ok(assemble(leaves))
    }

    /// Replace the subtree at `path` with `value`.
    pub fn write(&self, path: &str, value: &Value) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        replace_subtree(&txn, &normalize(path), value)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%path, "subtree written");
        Ok(())
    }

    /// Remove the subtree at `path`. Returns true if anything existed.
    pub fn remove(&self, path: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let removed = remove_subtree(&txn, &normalize(path))?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%path, removed, "subtree deleted");
        Ok(removed > 0)
    }

    /// Apply several subtree replacements in a single write transaction.
    pub fn write_many(&self, entries: &BTreeMap<String, Value>) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        for (path, value) in entries {
            replace_subtree(&txn, &normalize(path), value)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(count = entries.len(), "multi-path update applied");
        Ok(())
    }
}

impl SharedStore for RedbStore {
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<Value>> {
        Box::pin(async move { self.read(path) })
    }

    fn set<'a>(&'a self, path: &'a str, value: Value) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.write(path, &value) })
    }

    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(async move { self.remove(path) })
    }

    fn update<'a>(&'a self, entries: BTreeMap<String, Value>) -> StoreFuture<'a, ()> {
        Box::pin(async move { self.write_many(&entries) })
    }
}

fn child_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

/// Remove `path` and every descendant. Returns the number of rows removed.
fn remove_subtree(txn: &WriteTransaction, path: &str) -> StoreResult<usize> {
    let prefix = child_prefix(path);
    let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
    // Collect keys first; the table cannot be mutated while iterating.
    let keys: Vec<String> = table
        .iter()
        .map_err(map_err!(Read))?
        .filter_map(|entry| {
            let (key, _) = entry.ok()?;
            let k = key.value().to_string();
            (k == path || k.starts_with(&prefix)).then_some(k)
        })
        .collect();
    for key in &keys {
        table.remove(key.as_str()).map_err(map_err!(Write))?;
    }
    Ok(keys.len())
}

/// Replace the subtree at `path`, also dropping any ancestor leaf that
/// would otherwise shadow the new value.
fn replace_subtree(txn: &WriteTransaction, path: &str, value: &Value) -> StoreResult<()> {
    remove_subtree(txn, path)?;

    let mut table = txn.open_table(NODES).map_err(map_err!(Table))?;
    let mut ancestor = path;
    while let Some((parent, _)) = ancestor.rsplit_once('/') {
        table.remove(parent).map_err(map_err!(Write))?;
        ancestor = parent;
    }

    let mut leaves = Vec::new();
    flatten(path, value, &mut leaves);
    for (key, leaf) in leaves {
        let bytes = serde_json::to_vec(&leaf).map_err(map_err!(Serialize))?;
        table
            .insert(key.as_str(), bytes.as_slice())
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn set_and_get_leaf() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("appliances/B1", json!("1")).await.unwrap();

        assert_eq!(store.get("appliances/B1").await.unwrap(), Some(json!("1")));
        assert_eq!(store.get("/appliances/B1/").await.unwrap(), Some(json!("1")));
    }

    #[tokio::test]
    async fn get_missing_returns_none() {
        let store = RedbStore::open_in_memory().unwrap();
        assert!(store.get("appliances/nope").await.unwrap().is_none());
        assert!(store.get("appliances").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn parent_read_assembles_snapshot() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("appliances/B1", json!("1")).await.unwrap();
        store.set("appliances/B2", json!(0)).await.unwrap();
        store.set("dwell/B1", json!("2024-01-01T00:00:00Z")).await.unwrap();

        let snapshot = store.get("appliances").await.unwrap().unwrap();
        assert_eq!(snapshot, json!({"B1": "1", "B2": 0}));

        let everything = store.get("").await.unwrap().unwrap();
        assert_eq!(everything["dwell"]["B1"], json!("2024-01-01T00:00:00Z"));
    }

    #[tokio::test]
    async fn setting_object_replaces_subtree() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("appliances/B1", json!("1")).await.unwrap();
        store.set("appliances", json!({"B2": "0", "B3": "1"})).await.unwrap();

        let snapshot = store.get("appliances").await.unwrap().unwrap();
        assert_eq!(snapshot, json!({"B2": "0", "B3": "1"}));
    }

    #[tokio::test]
    async fn writing_below_a_leaf_replaces_it() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("a/b", json!(1)).await.unwrap();
        store.set("a/b/c", json!(2)).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(json!({"b": {"c": 2}})));
    }

    #[tokio::test]
    async fn null_set_deletes() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("dwell/B1", json!("x")).await.unwrap();
        store.set("dwell/B1", Value::Null).await.unwrap();
        assert!(store.get("dwell/B1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("dwell/B1", json!("x")).await.unwrap();

        assert!(store.delete("dwell/B1").await.unwrap());
        assert!(!store.delete("dwell/B1").await.unwrap());
    }

    #[tokio::test]
    async fn delete_does_not_touch_siblings_with_shared_prefix() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("appliances/B1", json!("1")).await.unwrap();
        store.set("appliances/B10", json!("1")).await.unwrap();

        store.delete("appliances/B1").await.unwrap();
        assert_eq!(store.get("appliances/B10").await.unwrap(), Some(json!("1")));
    }

    #[tokio::test]
    async fn update_applies_all_paths() {
        let store = RedbStore::open_in_memory().unwrap();
        store.set("appliances/B1", json!("1")).await.unwrap();
        store.set("dwell/B1", json!("2024-01-01T00:00:00Z")).await.unwrap();

        let mut entries = BTreeMap::new();
        entries.insert("appliances/B1".to_string(), json!("0"));
        entries.insert("dwell/B1".to_string(), Value::Null);
        store.update(entries).await.unwrap();

        assert_eq!(store.get("appliances/B1").await.unwrap(), Some(json!("0")));
        assert!(store.get("dwell/B1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("test.redb");

        {
            let store = RedbStore::open(&db_path).unwrap();
            store.set("appliances/B1", json!(1)).await.unwrap();
        }

        // Reopen the same database file.
        let store = RedbStore::open(&db_path).unwrap();
        assert_eq!(store.get("appliances/B1").await.unwrap(), Some(json!(1)));
    }
}
