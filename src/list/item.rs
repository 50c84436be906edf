//! # List Records and Item Handles
//!
//! Every list record (header or item) is a pool record whose payload starts
//! with a 16-byte `ListRecordHeader`:
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       8     next         PackedLocation of the next record, empty at
//!                            the end of the chain
//! 8       4     data_length  Bytes of data following this header
//! 12      4     reserved     Zero
//! 16      n     data         List name (ListHeader) or item bytes (ListItem)
//! ```
//!
//! The header record's `next` points at the first item; each item's `next`
//! points at its successor. That chain is the durable state of a list.
//!
//! ## ItemHandle
//!
//! An `ItemHandle` is a weak reference to one item: the pool plus the item's
//! location. It never keeps the record alive. Every accessor re-checks the
//! allocation signature, so a handle to an erased item reads as `None`
//! (or a size of 0) instead of exposing a reused block.

use std::fmt;
use std::sync::Arc;

use eyre::{ensure, Result};
use parking_lot::MappedRwLockReadGuard;
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::LIST_RECORD_HEADER_SIZE;
use crate::storage::{Location, MemoryPool, PackedLocation, RecordRef};

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ListRecordHeader {
    next: PackedLocation,
    data_length: U32,
    reserved: U32,
}

const _: () = assert!(std::mem::size_of::<ListRecordHeader>() == LIST_RECORD_HEADER_SIZE);

impl ListRecordHeader {
    pub fn new(next: Location, data_length: u32) -> Self {
        Self {
            next: next.into(),
            data_length: U32::new(data_length),
            reserved: U32::new(0),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= LIST_RECORD_HEADER_SIZE,
            "buffer too small for ListRecordHeader: {} < {}",
            data.len(),
            LIST_RECORD_HEADER_SIZE
        );

        Self::ref_from_bytes(&data[..LIST_RECORD_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read ListRecordHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= LIST_RECORD_HEADER_SIZE,
            "buffer too small for ListRecordHeader: {} < {}",
            data.len(),
            LIST_RECORD_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut data[..LIST_RECORD_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read ListRecordHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= LIST_RECORD_HEADER_SIZE,
            "buffer too small for ListRecordHeader: {} < {}",
            data.len(),
            LIST_RECORD_HEADER_SIZE
        );

        data[..LIST_RECORD_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn next(&self) -> Location {
        self.next.get()
    }

    pub fn set_next(&mut self, next: Location) {
        self.next = next.into();
    }

    crate::zerocopy_accessors! {
        data_length: u32,
    }
}

/// Data bytes of a list record payload. `None` if the payload is too short
/// for its header or for the `data_length` it claims.
pub fn record_data(payload: &[u8]) -> Option<&[u8]> {
    let header = ListRecordHeader::from_bytes(payload).ok()?;
    let end = LIST_RECORD_HEADER_SIZE.checked_add(header.data_length() as usize)?;
    payload.get(LIST_RECORD_HEADER_SIZE..end)
}

/// Builds the payload of a list record: header followed by `data`.
pub(crate) fn encode_record(payload: &mut [u8], next: Location, data: &[u8]) {
    let (header, body) = payload.split_at_mut(LIST_RECORD_HEADER_SIZE);
    header.copy_from_slice(ListRecordHeader::new(next, data.len() as u32).as_bytes());
    body[..data.len()].copy_from_slice(data);
}

/// Reads the `next` link of a live list record.
pub(crate) fn read_link(pool: &MemoryPool, location: Location) -> Option<Location> {
    let record = pool.record(location)?;
    ListRecordHeader::from_bytes(&record).ok().map(|h| h.next())
}

/// Rewrites the `next` link of a live list record.
pub(crate) fn write_link(pool: &MemoryPool, location: Location, next: Location) -> Result<()> {
    pool.with_record_mut(location, |payload| {
        ListRecordHeader::from_bytes_mut(payload).map(|header| header.set_next(next))
    })?
}

/// Read-only view of an item's data. Holds the pool's read lock.
pub type ItemRef<'a> = MappedRwLockReadGuard<'a, [u8]>;

#[derive(Clone)]
pub struct ItemHandle {
    pool: Arc<MemoryPool>,
    location: Location,
}

impl ItemHandle {
    pub fn new(pool: Arc<MemoryPool>, location: Location) -> Self {
        Self { pool, location }
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }

    pub fn is_allocated(&self) -> bool {
        self.pool.is_allocated(self.location)
    }

    /// The item's data, or `None` if the item has been freed.
    pub fn data(&self) -> Option<ItemRef<'_>> {
        let record: RecordRef<'_> = self.pool.record(self.location)?;
        MappedRwLockReadGuard::try_map(record, record_data).ok()
    }

    pub fn to_vec(&self) -> Option<Vec<u8>> {
        self.data().map(|data| data.to_vec())
    }

    /// The item's data as text (invalid UTF-8 is replaced), or `None` if the
    /// item has been freed.
    pub fn text(&self) -> Option<String> {
        self.data()
            .map(|data| String::from_utf8_lossy(&data).into_owned())
    }

    /// Stored data length; 0 for a freed item.
    pub fn size(&self) -> usize {
        self.data().map_or(0, |data| data.len())
    }

    /// On-disk link to the next record, `None` if the item has been freed.
    pub fn next(&self) -> Option<Location> {
        read_link(&self.pool, self.location)
    }
}

impl PartialEq for ItemHandle {
    fn eq(&self, other: &Self) -> bool {
        self.location == other.location && Arc::ptr_eq(&self.pool, &other.pool)
    }
}

impl Eq for ItemHandle {}

impl fmt::Debug for ItemHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ItemHandle")
            .field("location", &self.location)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALLOCATION_UNIT;
    use crate::storage::RecordType;
    use tempfile::tempdir;

    #[test]
    fn list_record_header_size_is_16_bytes() {
        assert_eq!(size_of::<ListRecordHeader>(), 16);
    }

    #[test]
    fn encode_and_read_record() {
        let mut payload = [0u8; 24];
        encode_record(&mut payload, Location::new(2, 48), b"abc");

        let header = ListRecordHeader::from_bytes(&payload).unwrap();
        assert_eq!(header.next(), Location::new(2, 48));
        assert_eq!(header.data_length(), 3);
        assert_eq!(record_data(&payload), Some(&b"abc"[..]));
    }

    #[test]
    fn record_data_rejects_overlong_length() {
        let mut payload = [0u8; 20];
        ListRecordHeader::new(Location::EMPTY, 10)
            .write_to(&mut payload)
            .unwrap();

        assert_eq!(record_data(&payload), None);
        assert_eq!(record_data(&payload[..8]), None);
    }

    #[test]
    fn set_next_in_place() {
        let mut payload = [0u8; 16];
        ListRecordHeader::from_bytes_mut(&mut payload)
            .unwrap()
            .set_next(Location::new(1, 32));

        assert_eq!(&payload[..8], &Location::new(1, 32).to_bytes());
    }

    #[test]
    fn handle_reads_live_item_and_goes_stale_after_free() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(MemoryPool::open(dir.path(), "items", ALLOCATION_UNIT).unwrap());
        let location = pool
            .insert_with(RecordType::ListItem, LIST_RECORD_HEADER_SIZE + 5, |payload| {
                encode_record(payload, Location::EMPTY, b"hello")
            })
            .unwrap();
        let handle = ItemHandle::new(Arc::clone(&pool), location);

        assert!(handle.is_allocated());
        assert_eq!(&*handle.data().unwrap(), b"hello");
        assert_eq!(handle.text().as_deref(), Some("hello"));
        assert_eq!(handle.size(), 5);
        assert_eq!(handle.next(), Some(Location::EMPTY));

        pool.free(location).unwrap();

        assert!(!handle.is_allocated());
        assert!(handle.data().is_none());
        assert!(handle.to_vec().is_none());
        assert!(handle.text().is_none());
        assert_eq!(handle.size(), 0);
        assert_eq!(handle.next(), None);
    }

    #[test]
    fn write_link_updates_next() {
        let dir = tempdir().unwrap();
        let pool = MemoryPool::open(dir.path(), "items", ALLOCATION_UNIT).unwrap();
        let location = pool
            .insert(RecordType::ListItem, LIST_RECORD_HEADER_SIZE)
            .unwrap();

        write_link(&pool, location, Location::new(1, 999)).unwrap();

        assert_eq!(read_link(&pool, location), Some(Location::new(1, 999)));
    }
}
