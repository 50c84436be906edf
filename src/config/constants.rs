//! # Configuration Constants
//!
//! This module centralizes the constants that fix the on-disk layout of a
//! memory pool and the lists stored in it. Several of them depend on each
//! other; the relationships are documented here and enforced with
//! compile-time assertions at the bottom of each group.
//!
//! ## Dependency Graph
//!
//! ```text
//! ALLOCATION_UNIT (64 KiB)
//!       │
//!       ├─> DEFAULT_BUCKET_SIZE (must be a multiple)
//!       │     Bucket files are always rounded up to whole allocation units
//!       │     so that mapping granularity is identical on every platform.
//!       │
//!       └─> MAX_BUCKET_SIZE (must be a multiple, must fit in u32 offsets)
//!
//! RECORD_HEADER_SIZE (16 bytes)
//!       │
//!       ├─> MIN_BLOCK_SIZE (a free block must be able to hold a header)
//!       │
//!       └─> LIST_RECORD_HEADER_SIZE (16 bytes, lives inside the payload)
//!             A list item costs RECORD_HEADER_SIZE + LIST_RECORD_HEADER_SIZE
//!             bytes of overhead on top of its data.
//! ```
//!
//! ## Modifying Constants
//!
//! Every constant in the "ON-DISK LAYOUT" group is part of the file format.
//! Changing one makes existing bucket files unreadable.

// ============================================================================
// BUCKET SIZING
// Bucket files are fixed-size memory-mapped regions
// ============================================================================

/// Mapping granularity. Bucket file sizes are rounded up to a multiple of this.
pub const ALLOCATION_UNIT: usize = 64 * 1024;

/// Bucket size used when the caller does not configure one (1 MiB).
pub const DEFAULT_BUCKET_SIZE: usize = 16 * ALLOCATION_UNIT;

/// Largest bucket a pool accepts. Record offsets are stored as `u32`.
pub const MAX_BUCKET_SIZE: usize = 1 << 31;

/// Width of the zero-padded bucket id in bucket file names
/// (`<object>_0000000001`).
pub const BUCKET_FILE_ID_WIDTH: usize = 10;

const _: () = assert!(
    DEFAULT_BUCKET_SIZE % ALLOCATION_UNIT == 0,
    "DEFAULT_BUCKET_SIZE must be a multiple of ALLOCATION_UNIT"
);

const _: () = assert!(
    MAX_BUCKET_SIZE % ALLOCATION_UNIT == 0,
    "MAX_BUCKET_SIZE must be a multiple of ALLOCATION_UNIT"
);

const _: () = assert!(
    MAX_BUCKET_SIZE <= u32::MAX as usize,
    "record offsets are stored as u32"
);

// ============================================================================
// ON-DISK LAYOUT
// Part of the file format: changing any of these breaks existing pools
// ============================================================================

/// Size of the allocation header that precedes every record in a bucket.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Smallest block the free-space index tracks. Anything smaller cannot carry
/// a released-record header and is absorbed into a neighbouring allocation.
pub const MIN_BLOCK_SIZE: usize = RECORD_HEADER_SIZE;

/// Size of the list header (`next` + `data_length`) stored at the start of
/// every list record payload.
pub const LIST_RECORD_HEADER_SIZE: usize = 16;

/// Signature of a live allocation ("LIVE" read as little-endian bytes).
pub const ALLOCATED_MARK: u32 = u32::from_le_bytes(*b"LIVE");

/// Signature of a released block ("FREE" read as little-endian bytes).
pub const RELEASED_MARK: u32 = u32::from_le_bytes(*b"FREE");

const _: () = assert!(
    ALLOCATED_MARK != RELEASED_MARK,
    "allocation signatures must be distinguishable"
);

const _: () = assert!(
    ALLOCATED_MARK != 0 && RELEASED_MARK != 0,
    "a zeroed header must read as unformatted"
);

const _: () = assert!(
    MIN_BLOCK_SIZE >= RECORD_HEADER_SIZE,
    "free blocks must be able to hold a record header"
);
