//! # Record Header Layout
//!
//! Every allocation inside a bucket begins with a 16-byte `RecordHeader`.
//! The header is what makes a bucket self-describing: a scan from offset 0
//! can walk the whole file by hopping `capacity` bytes at a time, and a
//! reader holding a stale location can tell that the record behind it has
//! been released.
//!
//! ## Layout (16 bytes)
//!
//! ```text
//! Offset  Size  Field        Description
//! ------  ----  -----------  ----------------------------------------
//! 0       4     signature    ALLOCATED_MARK, RELEASED_MARK, or anything
//!                            else for unformatted space
//! 4       1     record_type  RecordType tag of the payload
//! 5       3     reserved     Zero
//! 8       4     capacity     Full block size including this header
//! 12      4     length       Payload bytes requested by the allocator
//! ```
//!
//! `length <= capacity - RECORD_HEADER_SIZE` always holds for a formatted
//! header: the allocator may round a block up (to absorb a remainder too
//! small to track) but never hands out less than was asked for.
//!
//! ## Record Types
//!
//! - **ListHeader** (0x01): head record of a persistent list, payload holds
//!   the list name
//! - **ListItem** (0x02): element of a persistent list
//!
//! ## Endianness
//!
//! Multi-byte fields are little-endian `zerocopy` wrappers, and the struct is
//! `Unaligned`, so it can be read in place at any offset of the mapping.

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::config::{ALLOCATED_MARK, RECORD_HEADER_SIZE, RELEASED_MARK};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    Unknown = 0x00,
    ListHeader = 0x01,
    ListItem = 0x02,
}

impl RecordType {
    pub fn from_byte(b: u8) -> Self {
        match b {
            0x01 => RecordType::ListHeader,
            0x02 => RecordType::ListItem,
            _ => RecordType::Unknown,
        }
    }
}

/// Allocation state decoded from a header signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordState {
    Allocated,
    Released,
    Unformatted,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RecordHeader {
    signature: U32,
    record_type: u8,
    reserved: [u8; 3],
    capacity: U32,
    length: U32,
}

const _: () = assert!(std::mem::size_of::<RecordHeader>() == RECORD_HEADER_SIZE);

impl RecordHeader {
    pub fn allocated(record_type: RecordType, capacity: u32, length: u32) -> Self {
        Self {
            signature: U32::new(ALLOCATED_MARK),
            record_type: record_type as u8,
            reserved: [0; 3],
            capacity: U32::new(capacity),
            length: U32::new(length),
        }
    }

    pub fn released(capacity: u32) -> Self {
        Self {
            signature: U32::new(RELEASED_MARK),
            record_type: RecordType::Unknown as u8,
            reserved: [0; 3],
            capacity: U32::new(capacity),
            length: U32::new(0),
        }
    }

    pub fn from_bytes(data: &[u8]) -> Result<&Self> {
        ensure!(
            data.len() >= RECORD_HEADER_SIZE,
            "buffer too small for RecordHeader: {} < {}",
            data.len(),
            RECORD_HEADER_SIZE
        );

        Self::ref_from_bytes(&data[..RECORD_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read RecordHeader: {:?}", e))
    }

    pub fn from_bytes_mut(data: &mut [u8]) -> Result<&mut Self> {
        ensure!(
            data.len() >= RECORD_HEADER_SIZE,
            "buffer too small for RecordHeader: {} < {}",
            data.len(),
            RECORD_HEADER_SIZE
        );

        Self::mut_from_bytes(&mut data[..RECORD_HEADER_SIZE])
            .map_err(|e| eyre::eyre!("failed to read RecordHeader: {:?}", e))
    }

    pub fn write_to(&self, data: &mut [u8]) -> Result<()> {
        ensure!(
            data.len() >= RECORD_HEADER_SIZE,
            "buffer too small for RecordHeader: {} < {}",
            data.len(),
            RECORD_HEADER_SIZE
        );

        data[..RECORD_HEADER_SIZE].copy_from_slice(self.as_bytes());
        Ok(())
    }

    pub fn state(&self) -> RecordState {
        match self.signature.get() {
            ALLOCATED_MARK => RecordState::Allocated,
            RELEASED_MARK => RecordState::Released,
            _ => RecordState::Unformatted,
        }
    }

    pub fn is_allocated(&self) -> bool {
        self.state() == RecordState::Allocated
    }

    pub fn mark_released(&mut self) {
        self.signature = U32::new(RELEASED_MARK);
        self.record_type = RecordType::Unknown as u8;
        self.length = U32::new(0);
    }

    pub fn record_type(&self) -> RecordType {
        RecordType::from_byte(self.record_type)
    }

    crate::zerocopy_accessors! {
        capacity: u32,
        length: u32,
    }
}
