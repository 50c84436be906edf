//! # Memory-Mapped File
//!
//! This module implements `MmapFile`, the lowest layer of the pool: one file
//! on disk mapped read-write into the process address space. Buckets carve
//! records out of the mapped region; this type only knows about byte ranges.
//!
//! ## Sizing
//!
//! Files are created at a size rounded up to [`ALLOCATION_UNIT`] and zero
//! filled, so a freshly created bucket reads as entirely unformatted. An
//! existing file is mapped at whatever size it has on disk; the requested
//! size only matters on creation.
//!
//! ## Safety Considerations
//!
//! The mapping is never resized. That removes the remap hazard entirely: a
//! slice obtained from `bytes()` stays valid for as long as the `&self`
//! borrow it came from, and the borrow checker keeps `bytes_mut()` exclusive.
//!
//! ## Error Handling
//!
//! All fallible operations return `eyre::Result` with the file path and the
//! offending range in the message.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use memmap2::MmapMut;

use crate::config::ALLOCATION_UNIT;

/// Rounds `size` up to the next multiple of [`ALLOCATION_UNIT`] (minimum one unit).
pub fn aligned_size(size: usize) -> usize {
    let units = size.div_ceil(ALLOCATION_UNIT).max(1);
    units * ALLOCATION_UNIT
}

#[derive(Debug)]
pub struct MmapFile {
    path: PathBuf,
    mmap: MmapMut,
}

impl MmapFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .wrap_err_with(|| format!("failed to open bucket file '{}'", path.display()))?;

        let file_size = file
            .metadata()
            .wrap_err_with(|| format!("failed to get metadata for '{}'", path.display()))?
            .len();

        ensure!(
            file_size > 0,
            "cannot map empty bucket file '{}'",
            path.display()
        );

        // SAFETY: MmapMut::map_mut is unsafe because the file may be modified
        // externally while mapped. Bucket files are owned by a single pool
        // object; cross-process sharing requires external coordination (see the
        // crate docs). All access goes through bytes()/bytes_mut() which
        // bounds-check the requested range.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn create<P: AsRef<Path>>(path: P, size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file_size = aligned_size(size);

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .wrap_err_with(|| format!("failed to create bucket file '{}'", path.display()))?;

        file.set_len(file_size as u64)
            .wrap_err_with(|| format!("failed to set file size to {} bytes", file_size))?;

        // SAFETY: the file was just created with truncate=true and extended to
        // file_size, so the mapping covers exactly the zero-filled file. The
        // mapping lives as long as MmapFile and is never remapped.
        let mmap = unsafe {
            MmapMut::map_mut(&file)
                .wrap_err_with(|| format!("failed to memory-map '{}'", path.display()))?
        };

        Ok(Self {
            path: path.to_path_buf(),
            mmap,
        })
    }

    pub fn bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        let end = self.check_range(offset, len)?;
        Ok(&self.mmap[offset..end])
    }

    pub fn bytes_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8]> {
        let end = self.check_range(offset, len)?;
        Ok(&mut self.mmap[offset..end])
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    pub fn zero(&mut self) {
        self.mmap.fill(0);
    }

    pub fn sync(&self) -> Result<()> {
        self.mmap
            .flush()
            .wrap_err_with(|| format!("failed to sync '{}' to disk", self.path.display()))
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hints the kernel that the whole mapping is about to be read, ahead of a
    /// full bucket scan.
    pub fn prefetch(&self) {
        #[cfg(unix)]
        // SAFETY: madvise with MADV_WILLNEED is advisory and never causes UB.
        // The pointer and length describe exactly the live mapping owned by
        // self.mmap, which outlives this call.
        unsafe {
            libc::madvise(
                self.mmap.as_ptr() as *mut libc::c_void,
                self.mmap.len(),
                libc::MADV_WILLNEED,
            );
        }
    }

    fn check_range(&self, offset: usize, len: usize) -> Result<usize> {
        let end = offset.checked_add(len);
        ensure!(
            matches!(end, Some(end) if end <= self.mmap.len()),
            "range {}..{}+{} out of bounds for '{}' (len={})",
            offset,
            offset,
            len,
            self.path.display(),
            self.mmap.len()
        );
        Ok(offset + len)
    }
}
