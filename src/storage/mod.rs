//! # Storage Module
//!
//! This module provides the persistent memory pool every list is stored in:
//! a directory of fixed-size memory-mapped bucket files carved into
//! variable-length records addressed by stable `Location`s.
//!
//! ## Architecture Overview
//!
//! ```text
//! MemoryPool            directory + object name, round-robin over buckets
//!   └── MemoryBucket    one mmap file, records + free-space index
//!         ├── MmapFile      the mapping itself
//!         ├── FreeBlocks    best-fit, coalescing free-space index
//!         └── RecordHeader  16-byte header in front of every block
//! ```
//!
//! Data is read and written in place through the mapping; `MemoryPool::record`
//! returns a slice into the mapped file, not a copy.
//!
//! ## Durability
//!
//! Writes land in the shared mapping and reach disk whenever the OS flushes
//! it, or at `MemoryPool::sync()`. Every structure the pool keeps in memory
//! (free-space index, bucket set) is rebuilt from the files on open.
//!
//! ## Module Organization
//!
//! - `mmap`: Memory-mapped file (`MmapFile`)
//! - `headers`: On-disk record header (`RecordHeader`, `RecordType`)
//! - `location`: Record addresses (`Location`, `PackedLocation`)
//! - `freelist`: Free-space tracking (`FreeBlocks`)
//! - `bucket`: One bucket file (`MemoryBucket`)
//! - `pool`: The pool (`MemoryPool`)
//! - `builder`: Pool configuration (`PoolBuilder`)
//!
//! ## Thread Safety
//!
//! `MemoryPool` is `Send + Sync`; share it with `Arc`. Everything below it is
//! single-threaded and protected by the pool's lock.

mod bucket;
mod builder;
mod freelist;
mod headers;
mod location;
mod mmap;
mod pool;

pub use bucket::{bucket_file_name, LiveRecord, MemoryBucket};
pub use builder::{PoolBuilder, DEFAULT_OBJECT_NAME};
pub use freelist::FreeBlocks;
pub use headers::{RecordHeader, RecordState, RecordType};
pub use location::{Location, PackedLocation, LOCATION_SIZE};
pub use mmap::{aligned_size, MmapFile};
pub use pool::{sanitize_object_name, MemoryPool, RecordRef};
