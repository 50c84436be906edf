//! # Record Locations
//!
//! A `Location` names one record in a pool: the id of the bucket file that
//! holds it and the byte offset of its `RecordHeader` inside that file.
//! Locations are plain values: copying one does not keep the record alive,
//! and a location can outlive the record it names (see `MemoryPool::record`,
//! which returns `None` for such stale locations).
//!
//! Bucket ids start at 1, which leaves `(0, 0)` free to serve as the empty
//! location, the on-disk equivalent of a null pointer.
//!
//! ## Encoding
//!
//! ```text
//! Offset  Size  Field
//! 0       4     bucket  (little-endian)
//! 4       4     offset  (little-endian)
//! ```
//!
//! `PackedLocation` is the same encoding as an `Unaligned` zerocopy struct,
//! for embedding inside other on-disk headers.

use std::fmt;

use eyre::{ensure, Result};
use zerocopy::little_endian::U32;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const LOCATION_SIZE: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location {
    bucket: u32,
    offset: u32,
}

impl Location {
    pub const EMPTY: Location = Location {
        bucket: 0,
        offset: 0,
    };

    pub fn new(bucket: u32, offset: u32) -> Self {
        Self { bucket, offset }
    }

    pub fn bucket(&self) -> u32 {
        self.bucket
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.bucket == 0
    }

    pub fn to_bytes(&self) -> [u8; LOCATION_SIZE] {
        let mut out = [0u8; LOCATION_SIZE];
        out[..4].copy_from_slice(&self.bucket.to_le_bytes());
        out[4..].copy_from_slice(&self.offset.to_le_bytes());
        out
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        ensure!(
            data.len() >= LOCATION_SIZE,
            "buffer too small for Location: {} < {}",
            data.len(),
            LOCATION_SIZE
        );

        let bucket = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let offset = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
        Ok(Self { bucket, offset })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "empty")
        } else {
            write!(f, "{}:{}", self.bucket, self.offset)
        }
    }
}

#[repr(C)]
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned,
)]
pub struct PackedLocation {
    bucket: U32,
    offset: U32,
}

const _: () = assert!(std::mem::size_of::<PackedLocation>() == LOCATION_SIZE);

impl PackedLocation {
    pub fn get(&self) -> Location {
        Location::new(self.bucket.get(), self.offset.get())
    }
}

impl From<Location> for PackedLocation {
    fn from(location: Location) -> Self {
        Self {
            bucket: U32::new(location.bucket),
            offset: U32::new(location.offset),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_location() {
        assert!(Location::EMPTY.is_empty());
        assert!(Location::default().is_empty());
        assert!(!Location::new(1, 0).is_empty());
    }

    #[test]
    fn equality_is_by_bucket_and_offset() {
        assert_eq!(Location::new(1, 64), Location::new(1, 64));
        assert_ne!(Location::new(1, 64), Location::new(2, 64));
        assert_ne!(Location::new(1, 64), Location::new(1, 80));
    }

    #[test]
    fn ordering_is_bucket_major() {
        assert!(Location::new(1, 1000) < Location::new(2, 0));
        assert!(Location::new(2, 16) < Location::new(2, 32));
    }

    #[test]
    fn byte_encoding_is_little_endian() {
        let location = Location::new(0x0102_0304, 0x0A0B_0C0D);

        let bytes = location.to_bytes();

        assert_eq!(bytes, [0x04, 0x03, 0x02, 0x01, 0x0D, 0x0C, 0x0B, 0x0A]);
        assert_eq!(Location::from_bytes(&bytes).unwrap(), location);
    }

    #[test]
    fn from_bytes_too_small() {
        let result = Location::from_bytes(&[0u8; 4]);

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("buffer too small"));
    }

    #[test]
    fn packed_location_matches_byte_encoding() {
        let location = Location::new(7, 4096);
        let packed = PackedLocation::from(location);

        assert_eq!(packed.as_bytes(), &location.to_bytes());
        assert_eq!(packed.get(), location);
    }

    #[test]
    fn display() {
        assert_eq!(Location::EMPTY.to_string(), "empty");
        assert_eq!(Location::new(3, 128).to_string(), "3:128");
    }
}
