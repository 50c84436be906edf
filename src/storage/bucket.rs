//! # Memory Buckets
//!
//! A `MemoryBucket` is one fixed-size memory-mapped file carved into records.
//! The file is a sequence of blocks, each starting with a `RecordHeader`:
//!
//! ```text
//! +--------+-----------+--------+-----------+--------+------------------+
//! | LIVE   | payload   | FREE   | (unused)  | LIVE   | payload | 0 0 0 0 ...
//! | cap=48 |           | cap=64 |           | cap=32 |         |
//! +--------+-----------+--------+-----------+--------+---------+--------
//! 0                    48                   112               144
//! ```
//!
//! Walking from offset 0 and hopping `capacity` bytes visits every block.
//! The walk ends at the first unformatted header (zero signature), which
//! only ever appears in the never-used tail of the file, because every free
//! block created by splitting or releasing is given a released header.
//!
//! A header with an impossible capacity, or an unformatted header with
//! non-zero bytes behind it, also ends the walk. In that case nothing from
//! that offset on is given to the free-space index: records past the damage
//! keep their bytes and stay readable by location, they are just not listed
//! by `scan()`.
//!
//! ## Allocation
//!
//! 1. Ask `FreeBlocks` for the best-fitting block of `RECORD_HEADER_SIZE +
//!    length` bytes.
//! 2. If the surplus can hold a header, split it off as a new released block;
//!    otherwise the allocation keeps the surplus as extra capacity.
//! 3. Write the allocated header and zero the payload.
//!
//! ## Release
//!
//! Releasing flips the signature to `RELEASED_MARK`, coalesces with adjacent
//! free blocks, and writes a released header spanning the merged block.
//! Releasing a released block is a no-op. Releasing an offset that does not
//! hold a formatted header is rejected as an invalid address.
//!
//! ## File Naming
//!
//! `<object>_<id>` with the id zero-padded to `BUCKET_FILE_ID_WIDTH` digits,
//! e.g. `lists_0000000003`.

use std::path::Path;

use eyre::{bail, ensure, Result, WrapErr};
use log::{debug, warn};

use super::freelist::FreeBlocks;
use super::headers::{RecordHeader, RecordState, RecordType};
use super::mmap::MmapFile;
use crate::config::{BUCKET_FILE_ID_WIDTH, MAX_BUCKET_SIZE, MIN_BLOCK_SIZE, RECORD_HEADER_SIZE};

pub fn bucket_file_name(object_name: &str, id: u32) -> String {
    format!("{}_{:0width$}", object_name, id, width = BUCKET_FILE_ID_WIDTH)
}

/// Parses a bucket id out of a file name produced by `bucket_file_name`.
pub fn parse_bucket_file_name(object_name: &str, file_name: &str) -> Option<u32> {
    let digits = file_name.strip_prefix(object_name)?.strip_prefix('_')?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u32>().ok().filter(|&id| id > 0)
}

/// A live record found while scanning a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveRecord {
    pub offset: u32,
    pub record_type: RecordType,
}

#[derive(Debug)]
pub struct MemoryBucket {
    id: u32,
    file: MmapFile,
    free_blocks: FreeBlocks,
}

impl MemoryBucket {
    /// Opens the bucket file if it exists, creating it at `size` bytes
    /// otherwise, and scans it.
    pub fn open(directory: &Path, object_name: &str, id: u32, size: usize) -> Result<Self> {
        ensure!(id > 0, "bucket id 0 is reserved for the empty location");

        let path = directory.join(bucket_file_name(object_name, id));
        let file = if path.exists() {
            MmapFile::open(&path)?
        } else {
            debug!("creating bucket {} at '{}'", id, path.display());
            MmapFile::create(&path, size)?
        };

        ensure!(
            file.len() <= MAX_BUCKET_SIZE,
            "bucket file '{}' is {} bytes, larger than the {} byte limit",
            path.display(),
            file.len(),
            MAX_BUCKET_SIZE
        );

        let mut bucket = Self {
            id,
            file,
            free_blocks: FreeBlocks::new(),
        };
        bucket.scan();
        Ok(bucket)
    }

    /// Rebuilds the free-space index from the on-disk headers and returns
    /// every live record in offset order.
    pub fn scan(&mut self) -> Vec<LiveRecord> {
        self.file.prefetch();
        self.free_blocks.clear();

        let len = self.file.len();
        let mut live = Vec::new();
        let mut offset = 0usize;
        let mut tail_is_free = true;

        while offset + RECORD_HEADER_SIZE <= len {
            let data = &self.file.as_slice()[offset..];
            let Ok(header) = RecordHeader::from_bytes(data) else {
                break;
            };

            let state = header.state();
            if state == RecordState::Unformatted {
                if self.file.as_slice()[offset..].iter().any(|&b| b != 0) {
                    warn!(
                        "bucket '{}': unformatted header at offset {} is followed by data, \
                         leaving the rest of the bucket unallocated",
                        self.file.path().display(),
                        offset
                    );
                    tail_is_free = false;
                }
                break;
            }

            let capacity = header.capacity() as usize;
            if capacity < RECORD_HEADER_SIZE
                || offset + capacity > len
                || header.length() as usize > capacity - RECORD_HEADER_SIZE
            {
                warn!(
                    "bucket '{}': corrupt record header at offset {} (capacity={}), \
                     leaving the rest of the bucket unallocated",
                    self.file.path().display(),
                    offset,
                    capacity
                );
                tail_is_free = false;
                break;
            }

            if state == RecordState::Allocated {
                live.push(LiveRecord {
                    offset: offset as u32,
                    record_type: header.record_type(),
                });
            } else {
                self.free_blocks.release(offset as u32, capacity as u32);
            }

            offset += capacity;
        }

        if tail_is_free && len - offset >= MIN_BLOCK_SIZE {
            self.free_blocks.release(offset as u32, (len - offset) as u32);
        }

        debug!(
            "scanned bucket {}: {} live records, {} free blocks, {} bytes free",
            self.id,
            live.len(),
            self.free_blocks.count(),
            self.free_blocks.total()
        );

        live
    }

    /// Allocates a record with a zeroed payload of `length` bytes. Returns
    /// `Ok(None)` when no free block is large enough.
    pub fn allocate(&mut self, record_type: RecordType, length: usize) -> Result<Option<u32>> {
        let Some(needed) = RECORD_HEADER_SIZE
            .checked_add(length)
            .filter(|&n| n <= self.file.len())
        else {
            return Ok(None);
        };

        let Some((offset, block_size)) = self.free_blocks.take(needed as u32) else {
            return Ok(None);
        };

        let surplus = block_size as usize - needed;
        let capacity = if surplus >= MIN_BLOCK_SIZE {
            let remainder_offset = offset + needed as u32;
            self.free_blocks.insert(remainder_offset, surplus as u32);
            self.write_header(
                remainder_offset as usize,
                &RecordHeader::released(surplus as u32),
            )?;
            needed
        } else {
            block_size as usize
        };

        self.write_header(
            offset as usize,
            &RecordHeader::allocated(record_type, capacity as u32, length as u32),
        )?;
        self.file
            .bytes_mut(offset as usize + RECORD_HEADER_SIZE, capacity - RECORD_HEADER_SIZE)?
            .fill(0);

        Ok(Some(offset))
    }

    pub fn release(&mut self, offset: u32) -> Result<()> {
        let header = self.header(offset).wrap_err_with(|| {
            format!("invalid persistent address {}:{}", self.id, offset)
        })?;

        match header.state() {
            RecordState::Released => return Ok(()),
            RecordState::Unformatted => {
                bail!("invalid persistent address {}:{}", self.id, offset)
            }
            RecordState::Allocated => {}
        }

        let capacity = header.capacity();
        ensure!(
            capacity as usize >= RECORD_HEADER_SIZE
                && offset as usize + capacity as usize <= self.file.len(),
            "invalid persistent address {}:{} (corrupt capacity {})",
            self.id,
            offset,
            capacity
        );

        RecordHeader::from_bytes_mut(self.file.bytes_mut(offset as usize, RECORD_HEADER_SIZE)?)?
            .mark_released();

        let (merged_offset, merged_size) = self.free_blocks.release(offset, capacity);
        if merged_offset != offset || merged_size != capacity {
            self.write_header(merged_offset as usize, &RecordHeader::released(merged_size))?;
        }

        Ok(())
    }

    pub fn header(&self, offset: u32) -> Result<&RecordHeader> {
        let bytes = self.file.bytes(offset as usize, RECORD_HEADER_SIZE)?;
        RecordHeader::from_bytes(bytes)
    }

    /// Header of a live record, `None` for anything else.
    pub fn live_header(&self, offset: u32) -> Option<&RecordHeader> {
        self.header(offset).ok().filter(|h| h.is_allocated())
    }

    /// Payload (`length` bytes) of a live record.
    pub fn payload(&self, offset: u32) -> Option<&[u8]> {
        let length = self.live_header(offset)?.length() as usize;
        self.file
            .bytes(offset as usize + RECORD_HEADER_SIZE, length)
            .ok()
    }

    pub fn payload_mut(&mut self, offset: u32) -> Option<&mut [u8]> {
        let length = self.live_header(offset)?.length() as usize;
        self.file
            .bytes_mut(offset as usize + RECORD_HEADER_SIZE, length)
            .ok()
    }

    /// Zeroes the whole file and marks it as one free block.
    pub fn clear(&mut self) {
        self.file.zero();
        self.free_blocks.clear();
        let len = self.file.len();
        if len >= MIN_BLOCK_SIZE {
            self.free_blocks.insert(0, len as u32);
        }
    }

    /// Largest payload a single allocation in this bucket can currently hold.
    pub fn available(&self) -> usize {
        (self.free_blocks.largest() as usize).saturating_sub(RECORD_HEADER_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.free_blocks.total() == self.file.len() as u64
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn size(&self) -> usize {
        self.file.len()
    }

    fn write_header(&mut self, offset: usize, header: &RecordHeader) -> Result<()> {
        header.write_to(self.file.bytes_mut(offset, RECORD_HEADER_SIZE)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALLOCATION_UNIT;
    use tempfile::tempdir;

    fn fresh_bucket(dir: &Path) -> MemoryBucket {
        MemoryBucket::open(dir, "test", 1, ALLOCATION_UNIT).unwrap()
    }

    #[test]
    fn bucket_file_names() {
        assert_eq!(bucket_file_name("lists", 3), "lists_0000000003");
        assert_eq!(parse_bucket_file_name("lists", "lists_0000000003"), Some(3));
        assert_eq!(parse_bucket_file_name("lists", "lists_0000000000"), None);
        assert_eq!(parse_bucket_file_name("lists", "lists_"), None);
        assert_eq!(parse_bucket_file_name("lists", "lists_12a"), None);
        assert_eq!(parse_bucket_file_name("lists", "other_0000000001"), None);
    }

    #[test]
    fn new_bucket_is_one_free_block() {
        let dir = tempdir().unwrap();
        let bucket = fresh_bucket(dir.path());

        assert!(bucket.is_empty());
        assert_eq!(bucket.available(), ALLOCATION_UNIT - RECORD_HEADER_SIZE);
    }

    #[test]
    fn allocate_writes_header_and_zeroed_payload() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let offset = bucket.allocate(RecordType::ListItem, 10).unwrap().unwrap();

        assert_eq!(offset, 0);
        let header = bucket.header(offset).unwrap();
        assert!(header.is_allocated());
        assert_eq!(header.record_type(), RecordType::ListItem);
        assert_eq!(header.length(), 10);
        assert_eq!(header.capacity(), 26);
        assert_eq!(bucket.payload(offset).unwrap(), &[0u8; 10]);
    }

    #[test]
    fn allocations_do_not_overlap() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let a = bucket.allocate(RecordType::ListItem, 10).unwrap().unwrap();
        let b = bucket.allocate(RecordType::ListItem, 10).unwrap().unwrap();

        assert_eq!(b, a + 26);
    }

    #[test]
    fn allocate_too_large_returns_none() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        assert_eq!(
            bucket
                .allocate(RecordType::ListItem, ALLOCATION_UNIT)
                .unwrap(),
            None
        );
    }

    #[test]
    fn small_surplus_is_absorbed_into_capacity() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let a = bucket.allocate(RecordType::ListItem, 40).unwrap().unwrap();
        let _b = bucket.allocate(RecordType::ListItem, 8).unwrap().unwrap();
        bucket.release(a).unwrap();

        let c = bucket.allocate(RecordType::ListItem, 30).unwrap().unwrap();

        assert_eq!(c, a);
        assert_eq!(bucket.header(c).unwrap().capacity(), 56);
        assert_eq!(bucket.header(c).unwrap().length(), 30);
    }

    #[test]
    fn release_marks_record_and_coalesces() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let a = bucket.allocate(RecordType::ListItem, 16).unwrap().unwrap();
        let b = bucket.allocate(RecordType::ListItem, 16).unwrap().unwrap();

        bucket.release(b).unwrap();
        bucket.release(a).unwrap();

        assert!(bucket.payload(a).is_none());
        assert!(bucket.payload(b).is_none());
        assert!(bucket.is_empty());
        assert_eq!(bucket.available(), ALLOCATION_UNIT - RECORD_HEADER_SIZE);
    }

    #[test]
    fn release_twice_is_noop() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let a = bucket.allocate(RecordType::ListItem, 16).unwrap().unwrap();
        bucket.release(a).unwrap();

        assert!(bucket.release(a).is_ok());
    }

    #[test]
    fn release_unformatted_offset_is_invalid() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let result = bucket.release(1024);

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("invalid persistent address"));
    }

    #[test]
    fn scan_after_reopen_finds_live_records_and_free_space() {
        let dir = tempdir().unwrap();
        let (a, b, c) = {
            let mut bucket = fresh_bucket(dir.path());
            let a = bucket.allocate(RecordType::ListHeader, 8).unwrap().unwrap();
            let b = bucket.allocate(RecordType::ListItem, 100).unwrap().unwrap();
            let c = bucket.allocate(RecordType::ListItem, 8).unwrap().unwrap();
            bucket.payload_mut(c).unwrap().copy_from_slice(b"survives");
            bucket.release(b).unwrap();
            bucket.sync().unwrap();
            (a, b, c)
        };

        let mut bucket = fresh_bucket(dir.path());
        let live = bucket.scan();

        assert_eq!(
            live,
            vec![
                LiveRecord {
                    offset: a,
                    record_type: RecordType::ListHeader
                },
                LiveRecord {
                    offset: c,
                    record_type: RecordType::ListItem
                },
            ]
        );
        assert_eq!(bucket.payload(c).unwrap(), b"survives");

        let reused = bucket.allocate(RecordType::ListItem, 100).unwrap().unwrap();
        assert_eq!(reused, b);
    }

    fn damaged_bucket(dir: &Path, damage: impl FnOnce(&mut MemoryBucket, u32)) -> (u32, u32) {
        let mut bucket = fresh_bucket(dir);
        let a = bucket.allocate(RecordType::ListItem, 4).unwrap().unwrap();
        let b = bucket.allocate(RecordType::ListItem, 4).unwrap().unwrap();
        let c = bucket.allocate(RecordType::ListItem, 4).unwrap().unwrap();
        bucket.payload_mut(c).unwrap().copy_from_slice(b"cccc");
        damage(&mut bucket, b);
        bucket.sync().unwrap();
        (a, c)
    }

    #[test]
    fn corrupt_capacity_leaves_rest_of_bucket_unallocated() {
        let dir = tempdir().unwrap();
        let (a, c) = damaged_bucket(dir.path(), |bucket, b| {
            bucket
                .file
                .bytes_mut(b as usize + 8, 4)
                .unwrap()
                .copy_from_slice(&0xFFFF_FFF0u32.to_le_bytes());
        });

        let mut bucket = fresh_bucket(dir.path());
        let live = bucket.scan();

        assert_eq!(
            live,
            vec![LiveRecord {
                offset: a,
                record_type: RecordType::ListItem
            }]
        );
        assert_eq!(bucket.available(), 0);
        assert_eq!(bucket.allocate(RecordType::ListItem, 4).unwrap(), None);
        assert_eq!(bucket.payload(c).unwrap(), b"cccc");
    }

    #[test]
    fn garbage_signature_before_live_data_leaves_rest_unallocated() {
        let dir = tempdir().unwrap();
        let (_a, c) = damaged_bucket(dir.path(), |bucket, b| {
            bucket
                .file
                .bytes_mut(b as usize, 4)
                .unwrap()
                .copy_from_slice(b"JUNK");
        });

        let mut bucket = fresh_bucket(dir.path());

        assert_eq!(bucket.scan().len(), 1);
        assert_eq!(bucket.allocate(RecordType::ListItem, 4).unwrap(), None);
        assert_eq!(bucket.payload(c).unwrap(), b"cccc");
    }

    #[test]
    fn scan_walks_past_split_remainders() {
        let dir = tempdir().unwrap();
        let tail = {
            let mut bucket = fresh_bucket(dir.path());
            let a = bucket.allocate(RecordType::ListItem, 200).unwrap().unwrap();
            let _b = bucket.allocate(RecordType::ListItem, 8).unwrap().unwrap();
            bucket.release(a).unwrap();
            let _small = bucket.allocate(RecordType::ListItem, 8).unwrap().unwrap();
            bucket.allocate(RecordType::ListItem, 8).unwrap().unwrap()
        };

        let mut bucket = fresh_bucket(dir.path());
        let live = bucket.scan();

        assert_eq!(live.len(), 3);
        assert!(live.iter().any(|r| r.offset == tail));
    }

    #[test]
    fn clear_resets_bucket() {
        let dir = tempdir().unwrap();
        let mut bucket = fresh_bucket(dir.path());

        let a = bucket.allocate(RecordType::ListItem, 16).unwrap().unwrap();
        bucket.clear();

        assert!(bucket.payload(a).is_none());
        assert!(bucket.is_empty());
        assert!(bucket.scan().is_empty());
    }
}
