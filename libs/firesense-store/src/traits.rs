//! Trait definitions for the sync store abstraction

use crate::error::Result;
use crate::keyspace::paths_overlap;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

/// Key-path document store used by FireSense devices
///
/// Values are JSON subtrees addressed by `/`-separated paths. Writing
/// `null` removes the subtree.
///
/// Implementations:
/// - `MemoryStore`: in-process tree for tests and simulation
#[async_trait]
pub trait SyncStore: Send + Sync + 'static {
    /// Fetch the subtree at `path`
    async fn read(&self, path: &str) -> Result<Option<Value>>;

    /// Replace the subtree at `path`
    async fn write(&self, path: &str, value: Value) -> Result<()>;

    /// Remove the subtree at `path`, returning whether anything was removed
    async fn delete(&self, path: &str) -> Result<bool>;

    /// Prune children of `path` whose numeric `ts_field` (epoch seconds) is
    /// older than `retention_secs`, oldest first, at most `limit` per call
    ///
    /// Returns the number of removed children.
    async fn delete_older_than(
        &self,
        path: &str,
        ts_field: &str,
        limit: usize,
        retention_secs: u64,
    ) -> Result<usize>;

    /// Best-effort change notifications for `path` and everything below or above it
    fn subscribe(&self, path: &str) -> Subscription;
}

/// Change notification
#[derive(Debug, Clone, PartialEq)]
pub struct StoreEvent {
    /// Path that was written or deleted
    pub path: String,
    /// New subtree, `None` when deleted
    pub value: Option<Value>,
}

/// Filtered view over the store's change stream
#[derive(Debug)]
pub struct Subscription {
    prefix: String,
    rx: broadcast::Receiver<StoreEvent>,
}

impl Subscription {
    pub fn new(prefix: impl Into<String>, rx: broadcast::Receiver<StoreEvent>) -> Self {
        Self {
            prefix: prefix.into(),
            rx,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Wait for the next matching event; `None` once the store is gone
    ///
    /// Lagged receivers skip the missed events and keep going.
    pub async fn recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if paths_overlap(&self.prefix, &event.path) => return Some(event),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!("Subscription '{}' lagged by {} events", self.prefix, skipped);
                    continue;
                },
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant of `recv`
    pub fn try_recv(&mut self) -> Option<StoreEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if paths_overlap(&self.prefix, &event.path) => return Some(event),
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
