//! # Persistent List
//!
//! `PersistentList` is a sequence of variable-length byte records stored in
//! a `MemoryPool`. The durable state is a singly linked chain:
//!
//! ```text
//! ListHeader("orders") ──next──> item "C" ──next──> item "BB" ──next──> empty
//! ```
//!
//! On top of the chain, each instance keeps an in-memory cache of the item
//! locations in order, which gives O(1) access to both ends (the chain alone
//! only knows its head) and O(1) indexed lookup. The cache is derived state:
//! `load()` rebuilds it from the chain at any time.
//!
//! ## Mutation Protocol
//!
//! Every structural operation runs under the instance mutex and updates
//! the chain and the cache in the same critical section. The chain is
//! updated so that a record is fully written before anything links to it,
//! and unlinked before it is freed. A crash between steps can leak a record
//! but never leaves a link to unwritten or released storage.
//!
//! | Operation    | Chain update                                               |
//! |--------------|------------------------------------------------------------|
//! | `push_front` | new.next = old front; header.next = new                    |
//! | `push_back`  | new.next = empty; tail.next (or header.next) = new         |
//! | `erase`      | pred.next (or header.next) = successor; free range         |
//! | `clear`      | header.next = empty; free all items                        |
//!
//! ## Concurrency
//!
//! The mutex serializes operations on one instance. Two instances attached
//! to the same header (in one process or several) are not coordinated; the
//! caller must serialize writers and call `load()` before trusting a cache
//! that another instance may have changed.

use std::collections::VecDeque;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use eyre::{bail, ensure, eyre, Result, WrapErr};
use hashbrown::HashSet;
use log::{debug, warn};
use parking_lot::Mutex;

use super::item::{encode_record, read_link, record_data, write_link, ItemHandle};
use crate::config::LIST_RECORD_HEADER_SIZE;
use crate::storage::{Location, MemoryPool, RecordType};

pub struct PersistentList {
    pool: Arc<MemoryPool>,
    header: Location,
    name: String,
    handles: Mutex<VecDeque<Location>>,
}

impl PersistentList {
    /// Creates a new list: allocates a header record holding `name`.
    pub fn create(pool: &Arc<MemoryPool>, name: &str) -> Result<Self> {
        let header = pool
            .insert_with(
                RecordType::ListHeader,
                LIST_RECORD_HEADER_SIZE + name.len(),
                |payload| encode_record(payload, Location::EMPTY, name.as_bytes()),
            )
            .wrap_err_with(|| format!("failed to allocate header for list '{}'", name))?;

        debug!("created list '{}' with header {}", name, header);

        Ok(Self {
            pool: Arc::clone(pool),
            header,
            name: name.to_string(),
            handles: Mutex::new(VecDeque::new()),
        })
    }

    /// Attaches to an existing list header and loads its chain, so the new
    /// instance starts with a cache that matches the disk.
    pub fn attach(pool: &Arc<MemoryPool>, header: Location) -> Result<Self> {
        let Some(record_type) = pool.record_type(header) else {
            bail!("list header {} is not allocated", header);
        };
        ensure!(
            record_type == RecordType::ListHeader,
            "record {} is not a list header (found {:?})",
            header,
            record_type
        );

        let name_bytes = pool
            .record(header)
            .and_then(|record| record_data(&record).map(<[u8]>::to_vec))
            .ok_or_else(|| eyre!("list header {} is truncated", header))?;
        let name = String::from_utf8(name_bytes)
            .wrap_err_with(|| format!("list header {} holds a non UTF-8 name", header))?;

        let list = Self {
            pool: Arc::clone(pool),
            header,
            name,
            handles: Mutex::new(VecDeque::new()),
        };
        list.load()
            .wrap_err_with(|| format!("failed to load list '{}'", list.name))?;

        Ok(list)
    }

    pub fn push_front(&self, data: &[u8]) -> Result<ItemHandle> {
        let mut handles = self.handles.lock();

        let next = handles.front().copied().unwrap_or(Location::EMPTY);
        let item = self.allocate_item(next, data)?;

        write_link(&self.pool, self.header, item)
            .wrap_err_with(|| format!("failed to link new front of list '{}'", self.name))?;
        handles.push_front(item);

        Ok(self.handle(item))
    }

    pub fn push_back(&self, data: &[u8]) -> Result<ItemHandle> {
        let mut handles = self.handles.lock();

        let item = self.allocate_item(Location::EMPTY, data)?;

        let predecessor = handles.back().copied().unwrap_or(self.header);
        write_link(&self.pool, predecessor, item)
            .wrap_err_with(|| format!("failed to link new back of list '{}'", self.name))?;
        handles.push_back(item);

        Ok(self.handle(item))
    }

    /// Removes the cached items in `range`, frees their records and relinks
    /// the chain across the gap. Returns the number of items removed.
    pub fn erase<R: RangeBounds<usize>>(&self, range: R) -> Result<usize> {
        let mut handles = self.handles.lock();
        let len = handles.len();

        let start = match range.start_bound() {
            Bound::Included(&s) => s,
            Bound::Excluded(&s) => s.saturating_add(1),
            Bound::Unbounded => 0,
        };
        let end = match range.end_bound() {
            Bound::Included(&e) => e.saturating_add(1),
            Bound::Excluded(&e) => e,
            Bound::Unbounded => len,
        };
        ensure!(
            start <= end && end <= len,
            "erase range {}..{} out of bounds for list '{}' of {} items",
            start,
            end,
            self.name,
            len
        );

        if start == end {
            return Ok(0);
        }

        let predecessor = if start == 0 {
            self.header
        } else {
            handles[start - 1]
        };
        let successor = handles.get(end).copied().unwrap_or(Location::EMPTY);

        write_link(&self.pool, predecessor, successor)
            .wrap_err_with(|| format!("failed to relink list '{}' after erase", self.name))?;

        self.free_items(handles.drain(start..end))?;

        Ok(end - start)
    }

    pub fn clear(&self) -> Result<()> {
        let mut handles = self.handles.lock();

        write_link(&self.pool, self.header, Location::EMPTY)
            .wrap_err_with(|| format!("failed to reset list '{}'", self.name))?;

        self.free_items(handles.drain(..))
    }

    /// Rebuilds the cache by walking the on-disk chain from the header.
    pub fn load(&self) -> Result<()> {
        let mut handles = self.handles.lock();
        handles.clear();

        let chain = self.walk_chain()?;
        handles.extend(chain);

        debug!("loaded list '{}': {} items", self.name, handles.len());
        Ok(())
    }

    /// Item locations reachable from the header on disk, without touching
    /// the cache.
    pub fn chain(&self) -> Result<Vec<Location>> {
        let _guard = self.handles.lock();
        self.walk_chain()
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.lock().is_empty()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> Location {
        self.header
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    /// Snapshot of the cached items, front to back.
    pub fn handles(&self) -> Vec<ItemHandle> {
        self.handles
            .lock()
            .iter()
            .map(|&location| self.handle(location))
            .collect()
    }

    pub fn get(&self, index: usize) -> Option<ItemHandle> {
        let location = self.handles.lock().get(index).copied()?;
        Some(self.handle(location))
    }

    pub fn front(&self) -> Option<ItemHandle> {
        let location = self.handles.lock().front().copied()?;
        Some(self.handle(location))
    }

    pub fn back(&self) -> Option<ItemHandle> {
        let location = self.handles.lock().back().copied()?;
        Some(self.handle(location))
    }

    fn handle(&self, location: Location) -> ItemHandle {
        ItemHandle::new(Arc::clone(&self.pool), location)
    }

    fn allocate_item(&self, next: Location, data: &[u8]) -> Result<Location> {
        ensure!(
            data.len() <= u32::MAX as usize,
            "item of {} bytes is too large",
            data.len()
        );

        self.pool
            .insert_with(
                RecordType::ListItem,
                LIST_RECORD_HEADER_SIZE + data.len(),
                |payload| encode_record(payload, next, data),
            )
            .wrap_err_with(|| {
                format!(
                    "failed to allocate {} byte item for list '{}'",
                    data.len(),
                    self.name
                )
            })
    }

    /// Frees every unlinked item, even past a failure. Returns the first
    /// error; later ones are logged.
    fn free_items(&self, locations: impl Iterator<Item = Location>) -> Result<()> {
        let mut first_error = None;

        for location in locations {
            if let Err(e) = self.pool.free(location) {
                let e = e.wrap_err(format!(
                    "failed to free item {} of list '{}'",
                    location, self.name
                ));
                if first_error.is_none() {
                    first_error = Some(e);
                } else {
                    warn!("{:#}", e);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn walk_chain(&self) -> Result<Vec<Location>> {
        let mut chain = Vec::new();
        let mut seen = HashSet::new();

        let mut current = read_link(&self.pool, self.header)
            .ok_or_else(|| eyre!("header {} of list '{}' is no longer allocated", self.header, self.name))?;

        while !current.is_empty() {
            ensure!(
                seen.insert(current),
                "cycle in list '{}' at item {}",
                self.name,
                current
            );
            ensure!(
                self.pool.record_type(current) == Some(RecordType::ListItem),
                "broken chain in list '{}': {} is not a live list item",
                self.name,
                current
            );

            chain.push(current);
            current = read_link(&self.pool, current)
                .ok_or_else(|| eyre!("item {} of list '{}' vanished during load", current, self.name))?;
        }

        Ok(chain)
    }
}

impl std::fmt::Debug for PersistentList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentList")
            .field("name", &self.name)
            .field("header", &self.header)
            .field("len", &self.len())
            .finish()
    }
}
