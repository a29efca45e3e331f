//! firesense-store - Sync store abstraction for FireSense devices
//!
//! The rule engine persists channel and rule definitions, publishes status
//! and logs, and receives remote commands through a narrow key-path store
//! contract. This crate defines that contract, the device key layout and a
//! clock abstraction, plus an in-memory implementation.
//!
//! # Example
//!
//! ```rust
//! use firesense_store::{MemoryStore, SyncStore};
//! use serde_json::json;
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let store = MemoryStore::new();
//!     store.write("home/status/dev1/terminal", json!("hello")).await.unwrap();
//!     let value = store.read("home/status/dev1/terminal").await.unwrap();
//!     assert_eq!(value, Some(json!("hello")));
//! });
//! ```

pub mod error;
pub mod keyspace;
pub mod memory_impl;
pub mod time;
pub mod traits;

pub use error::{Result, StoreError};
pub use keyspace::DevicePaths;
pub use memory_impl::MemoryStore;
pub use time::{Clock, ManualClock, SystemClock};
pub use traits::{StoreEvent, Subscription, SyncStore};
