//! # Free Block Management
//!
//! This module implements free-space tracking for a single bucket. The free
//! space of a bucket is a set of disjoint byte ranges (blocks); `FreeBlocks`
//! keeps them in two indexes:
//!
//! - `by_offset`: offset -> size, for finding neighbours when coalescing
//! - `by_size`: (size, offset), for best-fit lookup
//!
//! ## Allocation Strategy
//!
//! `take(size)` removes and returns the smallest block that is at least
//! `size` bytes (lowest offset among equals). The caller decides what to do
//! with the surplus and hands any reusable remainder back with `insert()`.
//!
//! ## Release Strategy
//!
//! `release(offset, size)` inserts the block and merges it with the block
//! that ends exactly at `offset` and with the block that starts exactly at
//! `offset + size`. It returns the merged block so the caller can rewrite the
//! on-disk header at the merged start.
//!
//! ## Persistence
//!
//! Nothing here is persisted. The index is rebuilt from the record headers
//! when a bucket is scanned, which is why the bucket keeps a released header
//! at the start of every free block it creates.
//!
//! ## Thread Safety
//!
//! `FreeBlocks` is not thread-safe on its own. The pool's lock serializes
//! every access to a bucket and therefore to its free blocks.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Default)]
pub struct FreeBlocks {
    by_offset: BTreeMap<u32, u32>,
    by_size: BTreeSet<(u32, u32)>,
}

impl FreeBlocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.by_offset.clear();
        self.by_size.clear();
    }

    /// Adds a block and merges it with adjacent free blocks.
    pub fn release(&mut self, offset: u32, size: u32) -> (u32, u32) {
        let mut start = offset;
        let mut len = size;

        let prior = self
            .by_offset
            .range(..offset)
            .next_back()
            .map(|(&o, &s)| (o, s));
        if let Some((prior_offset, prior_size)) = prior {
            if prior_offset + prior_size == offset {
                self.remove(prior_offset, prior_size);
                start = prior_offset;
                len += prior_size;
            }
        }

        let next_offset = offset + size;
        if let Some(&next_size) = self.by_offset.get(&next_offset) {
            self.remove(next_offset, next_size);
            len += next_size;
        }

        self.insert(start, len);
        (start, len)
    }

    /// Adds a block without coalescing.
    pub fn insert(&mut self, offset: u32, size: u32) {
        if self.by_offset.insert(offset, size).is_none() {
            self.by_size.insert((size, offset));
        }
    }

    /// Removes the best-fitting block of at least `size` bytes.
    pub fn take(&mut self, size: u32) -> Option<(u32, u32)> {
        let &(block_size, block_offset) = self.by_size.range((size, 0)..).next()?;
        self.remove(block_offset, block_size);
        Some((block_offset, block_size))
    }

    /// Size of the largest free block.
    pub fn largest(&self) -> u32 {
        self.by_size.last().map_or(0, |&(size, _)| size)
    }

    pub fn total(&self) -> u64 {
        self.by_offset.values().map(|&s| s as u64).sum()
    }

    pub fn count(&self) -> usize {
        self.by_offset.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_offset.is_empty()
    }

    fn remove(&mut self, offset: u32, size: u32) {
        self.by_offset.remove(&offset);
        self.by_size.remove(&(size, offset));
    }
}
