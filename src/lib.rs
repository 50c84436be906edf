//! # persistent-list - Memory-Mapped Persistent Lists
//!
//! A persistent, memory-mapped memory pool and the linked lists stored in
//! it. Lists survive process restarts: every item is a record in a bucket
//! file, and the order of the list is the chain of links between records.
//!
//! - **Stable addresses**: a record never moves for its whole lifetime
//! - **Zero-copy reads**: item data is read straight out of the mapping
//! - **Crash-tolerant linking**: a record is written before it is linked and
//!   unlinked before it is freed
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use persistent_list::{ListCatalog, MemoryPool, PersistentList};
//!
//! let pool = Arc::new(
//!     MemoryPool::builder()
//!         .directory("./data")
//!         .object_name("queues")
//!         .open()?,
//! );
//!
//! let list = PersistentList::create(&pool, "jobs")?;
//! list.push_back(b"first")?;
//! list.push_front(b"urgent")?;
//! list.erase(1..)?;
//!
//! // After a restart:
//! let catalog = ListCatalog::load(pool)?;
//! if let Some(jobs) = catalog.get("jobs") {
//!     assert_eq!(jobs.len(), 1);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │  ListCatalog (name -> list)         │
//! ├─────────────────────────────────────┤
//! │  PersistentList / ItemHandle        │
//! ├─────────────────────────────────────┤
//! │  MemoryPool (round-robin buckets)   │
//! ├─────────────────────────────────────┤
//! │  MemoryBucket (records, free space) │
//! ├─────────────────────────────────────┤
//! │  Memory-mapped bucket files         │
//! └─────────────────────────────────────┘
//! ```
//!
//! ## File Layout
//!
//! ```text
//! data/
//! ├── queues_0000000001    # bucket 1 of pool "queues"
//! └── queues_0000000002    # bucket 2
//! ```
//!
//! ## Module Overview
//!
//! - [`config`]: Sizing constants and record layout constants
//! - [`storage`]: Memory-mapped buckets and the `MemoryPool`
//! - [`list`]: `PersistentList`, `ItemHandle` and `ListCatalog`

#[macro_use]
mod macros;

pub mod config;
pub mod list;
pub mod storage;

pub use list::{ItemHandle, ListCatalog, PersistentList};
pub use storage::{Location, MemoryPool, PoolBuilder, RecordType};
