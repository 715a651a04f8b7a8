//! durakv - An embeddable, single-node durable key-value store
//!
//! durakv keeps its whole key space in memory and makes it durable with a
//! write-ahead log (WAL) plus a full snapshot rewritten on every mutation.
//!
//! # Key Features
//!
//! - **Versioned entries**: every put bumps a per-key version, starting at 1
//! - **Crash recovery**: the snapshot is loaded and the WAL replayed on open
//! - **Optional TTL**: entries expire lazily, checked when they are read
//! - **Last-write-wins conflict resolution**: merge writes made elsewhere by timestamp
//! - **Simulated eventual consistency**: an optional delay on every read
//!
//! # Quick Start
//!
//! ```rust
//! use durakv::{Store, StoreConfig};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let store = Store::open(StoreConfig::new(dir.path())).unwrap();
//!
//! let entry = store.put("key", "value").unwrap();
//! assert_eq!(entry.version, 1);
//! assert_eq!(store.get("key").unwrap().as_deref(), Some("value"));
//!
//! store.delete("key").unwrap();
//! assert_eq!(store.get("key").unwrap(), None);
//! ```
//!
//! # Non-goals
//!
//! durakv intentionally does NOT provide:
//! - Replication or consensus
//! - Range scans or secondary indexes
//! - Multi-key transactions
//! - Authentication or network access
//! - WAL compaction; the log grows for the lifetime of the data directory

pub mod config;
pub mod conflict;
pub mod ops;
pub mod snapshot;
pub mod store;
pub mod types;
pub mod wal;

pub use config::{Consistency, StoreConfig};
pub use store::Store;
pub use types::Entry;
