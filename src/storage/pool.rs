//! # Memory Pool
//!
//! `MemoryPool` is the allocator every persistent structure in this crate is
//! built on. It hands out stable `Location`s for variable-length records,
//! frees them, and can enumerate all live records of a given `RecordType`
//! after a restart.
//!
//! ## Buckets
//!
//! A pool is a directory, an object name and a bucket size. Its storage is a
//! set of `MemoryBucket` files named `<object>_<id>` in the directory. A pool
//! never moves a record: buckets are fixed size, and when none of them has a
//! free block large enough a new bucket is created. This is what keeps
//! locations stable for the whole life of a record.
//!
//! ```text
//! pool_dir/
//! ├── lists_0000000001     # bucket 1
//! ├── lists_0000000002     # bucket 2
//! └── other_0000000001     # a different pool sharing the directory
//! ```
//!
//! ## Allocation Order
//!
//! Buckets are tried round-robin, starting with the bucket after the one that
//! satisfied the previous allocation. This spreads records over all buckets
//! instead of filling the lowest id first and scanning past it forever after.
//!
//! ## Stale Locations
//!
//! `record()` and friends check the allocation signature before exposing
//! anything. A location whose record was freed (or whose bucket was cleared)
//! reads as `None`, never as whatever bytes now occupy the block.
//!
//! A freed block can be reallocated, after which an old location pointing at
//! the same offset reads the new record. Signature checks catch use after
//! free, not use after reuse.
//!
//! ## Thread Safety
//!
//! All bucket state sits behind one `parking_lot::RwLock`. Readers share the
//! lock; `insert`, `free`, `load`, `clear` and `with_record_mut` take it
//! exclusively. A `RecordRef` returned by `record()` holds the read lock until
//! dropped, so it must not be held across a mutating call on the same thread.
//!
//! The lock is per process. Two processes mapping the same bucket files must
//! coordinate externally.

use std::collections::BTreeMap;
use std::fs;
use std::ops::Bound;
use std::path::{Path, PathBuf};

use eyre::{bail, ensure, eyre, Result, WrapErr};
use log::{debug, info};
use parking_lot::{MappedRwLockReadGuard, RwLock, RwLockReadGuard};

use super::bucket::{parse_bucket_file_name, MemoryBucket};
use super::builder::PoolBuilder;
use super::headers::RecordType;
use super::location::Location;
use super::mmap::aligned_size;
use crate::config::{MAX_BUCKET_SIZE, RECORD_HEADER_SIZE};

/// Read-only view of a live record's payload. Holds the pool's read lock.
pub type RecordRef<'a> = MappedRwLockReadGuard<'a, [u8]>;

#[derive(Debug)]
pub struct MemoryPool {
    directory: PathBuf,
    object_name: String,
    bucket_size: usize,
    inner: RwLock<PoolInner>,
}

#[derive(Debug, Default)]
struct PoolInner {
    buckets: BTreeMap<u32, MemoryBucket>,
    cursor: u32,
}

impl PoolInner {
    fn discover(&mut self, directory: &Path, object_name: &str, bucket_size: usize) -> Result<usize> {
        let mut opened = 0;

        for entry in fs::read_dir(directory)
            .wrap_err_with(|| format!("failed to read pool directory '{}'", directory.display()))?
        {
            let entry = entry.wrap_err("failed to read directory entry")?;
            let file_name = entry.file_name();
            let Some(id) = file_name
                .to_str()
                .and_then(|name| parse_bucket_file_name(object_name, name))
            else {
                continue;
            };

            if self.buckets.contains_key(&id) || !entry.path().is_file() {
                continue;
            }

            let bucket = MemoryBucket::open(directory, object_name, id, bucket_size)
                .wrap_err_with(|| format!("failed to open bucket {} of '{}'", id, object_name))?;
            self.buckets.insert(id, bucket);
            opened += 1;
        }

        Ok(opened)
    }

    fn next_bucket_id(&self) -> Result<u32> {
        let mut id = 1u32;
        for &existing in self.buckets.keys() {
            if existing != id {
                break;
            }
            id = id
                .checked_add(1)
                .ok_or_else(|| eyre!("bucket id space exhausted"))?;
        }
        Ok(id)
    }

    /// Bucket ids in round-robin order, starting after the cursor.
    fn allocation_order(&self) -> Vec<u32> {
        let after = self
            .buckets
            .range((Bound::Excluded(self.cursor), Bound::Unbounded))
            .map(|(&id, _)| id);
        let before = self.buckets.range(..=self.cursor).map(|(&id, _)| id);
        after.chain(before).collect()
    }

    fn payload(&self, location: Location) -> Option<&[u8]> {
        self.buckets
            .get(&location.bucket())?
            .payload(location.offset())
    }
}

impl MemoryPool {
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Opens (or creates) the pool `object_name` in `directory`.
    pub fn open<P: AsRef<Path>>(directory: P, object_name: &str, bucket_size: usize) -> Result<Self> {
        PoolBuilder::new()
            .directory(directory)
            .object_name(object_name)
            .bucket_size(bucket_size)
            .open()
    }

    pub(crate) fn from_config(
        directory: PathBuf,
        object_name: &str,
        bucket_size: usize,
        create_directory: bool,
    ) -> Result<Self> {
        ensure!(bucket_size > 0, "bucket size must be at least 1 byte");
        ensure!(
            aligned_size(bucket_size) <= MAX_BUCKET_SIZE,
            "bucket size {} exceeds the {} byte limit",
            bucket_size,
            MAX_BUCKET_SIZE
        );

        let object_name = sanitize_object_name(object_name);
        ensure!(!object_name.is_empty(), "pool object name must not be empty");

        if !directory.exists() {
            ensure!(
                create_directory,
                "pool directory '{}' does not exist",
                directory.display()
            );
            fs::create_dir_all(&directory).wrap_err_with(|| {
                format!("can't create pool directory '{}'", directory.display())
            })?;
        }

        let mut inner = PoolInner::default();
        let opened = inner.discover(&directory, &object_name, bucket_size)?;

        info!(
            "opened pool '{}' in '{}' with {} existing buckets",
            object_name,
            directory.display(),
            opened
        );

        Ok(Self {
            directory,
            object_name,
            bucket_size,
            inner: RwLock::new(inner),
        })
    }

    /// Allocates a record with a zero-filled payload of `length` bytes.
    pub fn insert(&self, record_type: RecordType, length: usize) -> Result<Location> {
        self.insert_with(record_type, length, |_| ())
    }

    /// Allocates a record and copies `data` into its payload.
    pub fn insert_bytes(&self, record_type: RecordType, data: &[u8]) -> Result<Location> {
        self.insert_with(record_type, data.len(), |payload| payload.copy_from_slice(data))
    }

    /// Allocates a record and lets `init` fill its zeroed payload before the
    /// pool lock is released.
    pub fn insert_with<F>(&self, record_type: RecordType, length: usize, init: F) -> Result<Location>
    where
        F: FnOnce(&mut [u8]),
    {
        let capacity = aligned_size(self.bucket_size);
        ensure!(
            length <= capacity - RECORD_HEADER_SIZE,
            "allocation of {} bytes exceeds bucket capacity of {} bytes",
            length,
            capacity - RECORD_HEADER_SIZE
        );

        let mut inner = self.inner.write();

        let mut allocated = None;
        for id in inner.allocation_order() {
            let Some(bucket) = inner.buckets.get_mut(&id) else {
                continue;
            };
            if let Some(offset) = bucket.allocate(record_type, length)? {
                allocated = Some(Location::new(id, offset));
                break;
            }
        }

        let location = match allocated {
            Some(location) => location,
            None => {
                let id = inner.next_bucket_id()?;
                let mut bucket =
                    MemoryBucket::open(&self.directory, &self.object_name, id, self.bucket_size)
                        .wrap_err_with(|| {
                            format!("failed to create bucket {} of '{}'", id, self.object_name)
                        })?;
                debug!("pool '{}' grew to bucket {}", self.object_name, id);

                let Some(offset) = bucket.allocate(record_type, length)? else {
                    bail!(
                        "new bucket {} of '{}' cannot hold {} bytes",
                        id,
                        self.object_name,
                        length
                    );
                };
                inner.buckets.insert(id, bucket);
                Location::new(id, offset)
            }
        };

        inner.cursor = location.bucket();

        let payload = inner
            .buckets
            .get_mut(&location.bucket())
            .and_then(|bucket| bucket.payload_mut(location.offset()))
            .ok_or_else(|| eyre!("record {} vanished right after allocation", location))?;
        init(payload);

        Ok(location)
    }

    /// Releases a record. Freeing an already released record is a no-op.
    pub fn free(&self, location: Location) -> Result<()> {
        ensure!(!location.is_empty(), "cannot free the empty location");

        let mut inner = self.inner.write();
        let bucket = inner
            .buckets
            .get_mut(&location.bucket())
            .ok_or_else(|| eyre!("invalid persistent address {}: unknown bucket", location))?;
        bucket.release(location.offset())
    }

    /// Rescans every bucket (picking up bucket files created since open) and
    /// returns the locations of all live records of `record_type`.
    pub fn load(&self, record_type: RecordType) -> Result<Vec<Location>> {
        let mut inner = self.inner.write();
        inner.discover(&self.directory, &self.object_name, self.bucket_size)?;

        let mut locations = Vec::new();
        for (&id, bucket) in inner.buckets.iter_mut() {
            locations.extend(
                bucket
                    .scan()
                    .into_iter()
                    .filter(|record| record.record_type == record_type)
                    .map(|record| Location::new(id, record.offset)),
            );
        }

        info!(
            "loaded {} {:?} records from pool '{}' ({} buckets)",
            locations.len(),
            record_type,
            self.object_name,
            inner.buckets.len()
        );

        Ok(locations)
    }

    /// Zeroes every bucket. All outstanding locations become stale.
    pub fn clear(&self) -> Result<()> {
        let mut inner = self.inner.write();
        for bucket in inner.buckets.values_mut() {
            bucket.clear();
        }
        inner.cursor = 0;
        Ok(())
    }

    /// Payload of a live record, or `None` if `location` is stale or empty.
    pub fn record(&self, location: Location) -> Option<RecordRef<'_>> {
        RwLockReadGuard::try_map(self.inner.read(), |inner| inner.payload(location)).ok()
    }

    /// Runs `f` on the payload of a live record under the write lock.
    pub fn with_record_mut<R, F>(&self, location: Location, f: F) -> Result<R>
    where
        F: FnOnce(&mut [u8]) -> R,
    {
        let mut inner = self.inner.write();
        let payload = inner
            .buckets
            .get_mut(&location.bucket())
            .and_then(|bucket| bucket.payload_mut(location.offset()))
            .ok_or_else(|| eyre!("record {} is not allocated", location))?;
        Ok(f(payload))
    }

    pub fn record_type(&self, location: Location) -> Option<RecordType> {
        let inner = self.inner.read();
        inner
            .buckets
            .get(&location.bucket())?
            .live_header(location.offset())
            .map(|header| header.record_type())
    }

    pub fn is_allocated(&self, location: Location) -> bool {
        self.record_type(location).is_some()
    }

    pub fn sync(&self) -> Result<()> {
        let inner = self.inner.read();
        for bucket in inner.buckets.values() {
            bucket
                .sync()
                .wrap_err_with(|| format!("failed to sync bucket {}", bucket.id()))?;
        }
        Ok(())
    }

    pub fn bucket_count(&self) -> usize {
        self.inner.read().buckets.len()
    }

    /// Largest payload that fits in an existing bucket without growing the pool.
    pub fn available(&self) -> usize {
        self.inner
            .read()
            .buckets
            .values()
            .map(MemoryBucket::available)
            .max()
            .unwrap_or(0)
    }

    /// Sum of bucket file sizes.
    pub fn size(&self) -> usize {
        self.inner
            .read()
            .buckets
            .values()
            .map(MemoryBucket::size)
            .sum()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }
}

/// Replaces every run of path separators, whitespace, `~` and `*` with `_`.
pub fn sanitize_object_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_run = false;

    for c in name.chars() {
        if matches!(c, '/' | '\\' | '~' | '*') || c.is_whitespace() {
            if !in_run {
                out.push('_');
                in_run = true;
            }
        } else {
            out.push(c);
            in_run = false;
        }
    }

    out
}
