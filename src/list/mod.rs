//! # List Module
//!
//! Persistent singly linked lists built on `MemoryPool` records.
//!
//! ## Module Organization
//!
//! - `item`: On-disk list record layout and `ItemHandle`
//! - `persistent_list`: `PersistentList`, the list itself
//! - `catalog`: `ListCatalog`, name-based discovery of all lists in a pool
//!
//! ## Example
//!
//! ```ignore
//! let pool = Arc::new(MemoryPool::open("./data", "queues", DEFAULT_BUCKET_SIZE)?);
//! let catalog = ListCatalog::load(Arc::clone(&pool))?;
//!
//! let jobs = catalog.get_or_create("jobs")?;
//! jobs.push_back(b"first")?;
//! jobs.push_back(b"second")?;
//!
//! for item in jobs.handles() {
//!     println!("{}: {:?}", item.location(), item.text());
//! }
//! ```

mod catalog;
mod item;
mod persistent_list;

pub use catalog::ListCatalog;
pub use item::{record_data, ItemHandle, ItemRef, ListRecordHeader};
pub use persistent_list::PersistentList;
