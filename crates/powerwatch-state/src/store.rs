//! The [`SharedStore`] trait and path helpers shared by all backends.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

use crate::error::StoreResult;

/// Boxed future returned by [`SharedStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = StoreResult<T>> + Send + 'a>>;

/// A remote key/value tree with eventually-read-after-write semantics.
///
/// No transactions are assumed across calls. Injected into the engine as
/// `Arc<dyn SharedStore>` so tests can wrap a backend with delays or faults.
pub trait SharedStore: Send + Sync {
    /// Read the value at `path`. Parent paths return an assembled object;
    /// `None` means nothing is stored at or below `path`.
    fn get<'a>(&'a self, path: &'a str) -> StoreFuture<'a, Option<Value>>;

    /// Replace everything at `path` with `value`. `Value::Null` deletes.
    fn set<'a>(&'a self, path: &'a str, value: Value) -> StoreFuture<'a, ()>;

    /// Remove everything at and below `path`. Returns true if anything was
    /// removed (backends that cannot tell report true).
    fn delete<'a>(&'a self, path: &'a str) -> StoreFuture<'a, bool>;

    /// Apply several `set`s in one request.
    fn update<'a>(&'a self, entries: BTreeMap<String, Value>) -> StoreFuture<'a, ()>;
}

/// Normalize a path: strip leading/trailing slashes and empty segments.
pub fn normalize(path: &str) -> String {
    path.split('/')
        .filter(|seg| !seg.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Join two normalized path fragments.
pub fn join(parent: &str, child: &str) -> String {
    match (parent.is_empty(), child.is_empty()) {
        (true, _) => child.to_string(),
        (_, true) => parent.to_string(),
        _ => format!("{parent}/{child}"),
    }
}

/// Flatten a JSON value into `(path, leaf)` pairs rooted at `prefix`.
/// Nulls and empty objects produce nothing.
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Null => {}
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&join(prefix, &normalize(key)), child, out);
            }
        }
        leaf => out.push((prefix.to_string(), leaf.clone())),
    }
}

/// Rebuild a nested object from leaves whose paths are relative to the
/// requested parent.
pub fn assemble<I>(leaves: I) -> Option<Value>
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut root = Map::new();
    let mut any = false;
    'leaves: for (rel, leaf) in leaves {
        any = true;
        let segments: Vec<&str> = rel.split('/').collect();
        let Some((last, parents)) = segments.split_last() else {
            continue;
        };
        let mut node = &mut root;
        for seg in parents {
            let entry = node
                .entry(seg.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            let Value::Object(map) = entry else {
                continue 'leaves;
            };
            node = map;
        }
        node.insert(last.to_string(), leaf);
    }
    any.then_some(Value::Object(root))
}
