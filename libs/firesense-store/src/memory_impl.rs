//! In-memory sync store implementation
//!
//! Keeps the whole key space as one JSON tree behind a `parking_lot` lock.
//! Used by tests and by the simulator; `set_offline` injects adapter failures.

use crate::error::{Result, StoreError};
use crate::keyspace::segments;
use crate::time::{Clock, SystemClock};
use crate::traits::{StoreEvent, Subscription, SyncStore};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 256;

/// In-memory key-path store
pub struct MemoryStore {
    root: RwLock<Value>,
    events: broadcast::Sender<StoreEvent>,
    clock: Arc<dyn Clock>,
    offline: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock::new()))
    }

    /// Store whose retention pruning reads time from `clock`
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            root: RwLock::new(Value::Object(Map::new())),
            events,
            clock,
            offline: AtomicBool::new(false),
            writes: AtomicU64::new(0),
        }
    }

    /// Make every subsequent call fail with `StoreError::Unavailable`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Relaxed);
    }

    /// Number of successful writes and deletes so far
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Copy of the whole tree
    pub fn snapshot(&self) -> Value {
        self.root.read().clone()
    }

    /// Drop all data
    pub fn clear(&self) {
        *self.root.write() = Value::Object(Map::new());
    }

    fn ensure_online(&self) -> Result<()> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(StoreError::Unavailable("memory store is offline".to_string()));
        }
        Ok(())
    }

    fn notify(&self, path: &str, value: Option<Value>) {
        self.writes.fetch_add(1, Ordering::Relaxed);
        // No subscribers is fine
        let _ = self.events.send(StoreEvent {
            path: path.to_string(),
            value,
        });
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |node, key| node.get(*key))
}

fn insert(root: &mut Value, path: &[&str], value: Value) {
    let mut node = root;
    for key in path {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        let Value::Object(map) = node else {
            return;
        };
        node = map
            .entry((*key).to_string())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    *node = value;
}

/// Remove the subtree at `path`, pruning parents left empty
fn remove(node: &mut Value, path: &[&str]) -> bool {
    let Some((first, rest)) = path.split_first() else {
        return false;
    };
    let Value::Object(map) = node else {
        return false;
    };
    if rest.is_empty() {
        return map.remove(*first).is_some();
    }
    let Some(child) = map.get_mut(*first) else {
        return false;
    };
    let removed = remove(child, rest);
    if removed && child.as_object().is_some_and(Map::is_empty) {
        map.remove(*first);
    }
    removed
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn read(&self, path: &str) -> Result<Option<Value>> {
        self.ensure_online()?;
        let keys = segments(path);
        let root = self.root.read();
        Ok(lookup(&root, &keys).filter(|v| !v.is_null()).cloned())
    }

    async fn write(&self, path: &str, value: Value) -> Result<()> {
        self.ensure_online()?;
        if value.is_null() {
            self.delete(path).await?;
            return Ok(());
        }
        let keys = segments(path);
        if keys.is_empty() {
            if !value.is_object() {
                return Err(StoreError::InvalidPath(
                    "root can only hold an object".to_string(),
                ));
            }
            *self.root.write() = value.clone();
        } else {
            insert(&mut self.root.write(), &keys, value.clone());
        }
        self.notify(path, Some(value));
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<bool> {
        self.ensure_online()?;
        let keys = segments(path);
        if keys.is_empty() {
            return Err(StoreError::InvalidPath("cannot delete root".to_string()));
        }
        let removed = remove(&mut self.root.write(), &keys);
        if removed {
            self.notify(path, None);
        }
        Ok(removed)
    }

    async fn delete_older_than(
        &self,
        path: &str,
        ts_field: &str,
        limit: usize,
        retention_secs: u64,
    ) -> Result<usize> {
        self.ensure_online()?;
        let keys = segments(path);
        let cutoff = self.clock.now_epoch_seconds() - retention_secs as i64;

        let mut expired: Vec<(i64, String)> = {
            let root = self.root.read();
            let Some(Value::Object(children)) = lookup(&root, &keys) else {
                return Ok(0);
            };
            children
                .iter()
                .filter_map(|(key, child)| {
                    let ts = child.get(ts_field)?.as_i64()?;
                    (ts < cutoff).then(|| (ts, key.clone()))
                })
                .collect()
        };
        expired.sort();
        expired.truncate(limit);

        let mut removed = 0;
        for (_, key) in expired {
            let child_path = format!("{}/{}", keys.join("/"), key);
            if self.delete(&child_path).await? {
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::debug!("Pruned {} entries under '{}'", removed, path);
        }
        Ok(removed)
    }

    fn subscribe(&self, path: &str) -> Subscription {
        Subscription::new(path, self.events.subscribe())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::time::ManualClock;
    use serde_json::json;

    #[tokio::test]
    async fn test_memory_store_write_and_read() {
        let store = MemoryStore::new();
        store.write("a/b/c", json!(1)).await.unwrap();
        store.write("a/b/d", json!("x")).await.unwrap();

        assert_eq!(store.read("a/b/c").await.unwrap(), Some(json!(1)));
        assert_eq!(
            store.read("/a/b/").await.unwrap(),
            Some(json!({"c": 1, "d": "x"}))
        );
        assert_eq!(store.read("a/x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_write_over_scalar_parent() {
        let store = MemoryStore::new();
        store.write("a", json!(5)).await.unwrap();
        store.write("a/b", json!(true)).await.unwrap();
        assert_eq!(store.read("a").await.unwrap(), Some(json!({"b": true})));
    }

    #[tokio::test]
    async fn test_null_write_deletes_and_prunes_parents() {
        let store = MemoryStore::new();
        store.write("a/b/c", json!(1)).await.unwrap();
        store.write("a/b/c", Value::Null).await.unwrap();
        assert_eq!(store.read("a").await.unwrap(), None);
        assert!(!store.delete("a/b/c").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_root_is_rejected() {
        let store = MemoryStore::new();
        let err = store.delete("/").await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidPath(_)));
    }

    #[tokio::test]
    async fn test_offline_store_fails() {
        let store = MemoryStore::new();
        store.set_offline(true);
        assert!(matches!(
            store.read("a").await.unwrap_err(),
            StoreError::Unavailable(_)
        ));
        store.set_offline(false);
        assert!(store.read("a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_older_than_respects_limit_and_order() {
        let clock = Arc::new(ManualClock::new(10_000));
        let store = MemoryStore::with_clock(clock);
        for ts in [100, 200, 300, 9_990] {
            store
                .write(&format!("logs/dev/{ts}"), json!({"ts": ts}))
                .await
                .unwrap();
        }

        // Cutoff is 10_000 - 1_000 = 9_000: three entries expired, limit 2
        let removed = store
            .delete_older_than("logs/dev", "ts", 2, 1_000)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert!(store.read("logs/dev/100").await.unwrap().is_none());
        assert!(store.read("logs/dev/200").await.unwrap().is_none());
        assert!(store.read("logs/dev/300").await.unwrap().is_some());

        let removed = store
            .delete_older_than("logs/dev", "ts", 10, 1_000)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.read("logs/dev/9990").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_subscription_filters_by_path() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe("controls/dev");

        store.write("status/dev/x", json!(1)).await.unwrap();
        store.write("controls/dev/cmd", json!("run")).await.unwrap();

        let event = sub.recv().await.unwrap();
        assert_eq!(event.path, "controls/dev/cmd");
        assert_eq!(event.value, Some(json!("run")));
        assert!(sub.try_recv().is_none());
    }
}
