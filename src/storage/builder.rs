//! # Pool Builder
//!
//! `PoolBuilder` configures and opens a `MemoryPool` through a fluent API.
//!
//! ## Configuration Options
//!
//! | Option           | Default               | Description                              |
//! |------------------|-----------------------|------------------------------------------|
//! | directory        | (required)            | Directory holding the bucket files       |
//! | object_name      | `"pool"`              | Prefix of the bucket file names          |
//! | bucket_size      | `DEFAULT_BUCKET_SIZE` | Size of newly created bucket files       |
//! | create_directory | `true`                | Create `directory` if it does not exist  |
//!
//! `bucket_size` is rounded up to a multiple of `ALLOCATION_UNIT` and bounds
//! the largest single record the pool accepts. Existing bucket files keep
//! their on-disk size.
//!
//! ## Usage
//!
//! ```ignore
//! let pool = MemoryPool::builder()
//!     .directory("./data")
//!     .object_name("orders")
//!     .bucket_size(4 * 1024 * 1024)
//!     .open()?;
//! ```

use std::path::{Path, PathBuf};

use eyre::{eyre, Result};

use super::pool::MemoryPool;
use crate::config::DEFAULT_BUCKET_SIZE;

pub const DEFAULT_OBJECT_NAME: &str = "pool";

#[derive(Debug, Clone)]
pub struct PoolBuilder {
    directory: Option<PathBuf>,
    object_name: String,
    bucket_size: usize,
    create_directory: bool,
}

impl Default for PoolBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self {
            directory: None,
            object_name: DEFAULT_OBJECT_NAME.to_string(),
            bucket_size: DEFAULT_BUCKET_SIZE,
            create_directory: true,
        }
    }

    pub fn directory<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.directory = Some(path.as_ref().to_path_buf());
        self
    }

    /// Bucket file name prefix. Path separators, whitespace, `~` and `*` are
    /// replaced with `_` when the pool is opened.
    pub fn object_name(mut self, name: &str) -> Self {
        self.object_name = name.to_string();
        self
    }

    pub fn bucket_size(mut self, bytes: usize) -> Self {
        self.bucket_size = bytes;
        self
    }

    pub fn create_directory(mut self, create: bool) -> Self {
        self.create_directory = create;
        self
    }

    pub fn open(self) -> Result<MemoryPool> {
        let directory = self
            .directory
            .ok_or_else(|| eyre!("pool directory not specified: call .directory() first"))?;

        MemoryPool::from_config(
            directory,
            &self.object_name,
            self.bucket_size,
            self.create_directory,
        )
    }

    pub fn get_directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }

    pub fn get_object_name(&self) -> &str {
        &self.object_name
    }

    pub fn get_bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn get_create_directory(&self) -> bool {
        self.create_directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALLOCATION_UNIT;
    use tempfile::tempdir;

    #[test]
    fn builder_defaults() {
        let builder = PoolBuilder::new();

        assert_eq!(builder.get_directory(), None);
        assert_eq!(builder.get_object_name(), DEFAULT_OBJECT_NAME);
        assert_eq!(builder.get_bucket_size(), DEFAULT_BUCKET_SIZE);
        assert!(builder.get_create_directory());
    }

    #[test]
    fn builder_chaining_works() {
        let builder = PoolBuilder::new()
            .directory("/tmp/pool")
            .object_name("orders")
            .bucket_size(ALLOCATION_UNIT)
            .create_directory(false);

        assert_eq!(builder.get_directory(), Some(Path::new("/tmp/pool")));
        assert_eq!(builder.get_object_name(), "orders");
        assert_eq!(builder.get_bucket_size(), ALLOCATION_UNIT);
        assert!(!builder.get_create_directory());
    }

    #[test]
    fn builder_open_without_directory_fails() {
        let result = PoolBuilder::new().open();

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("pool directory not specified"));
    }

    #[test]
    fn builder_open_respects_create_directory() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("missing");

        let result = PoolBuilder::new()
            .directory(&missing)
            .create_directory(false)
            .open();

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("does not exist"));
        assert!(!missing.exists());
    }

    #[test]
    fn builder_open_sanitizes_object_name() {
        let dir = tempdir().unwrap();

        let pool = PoolBuilder::new()
            .directory(dir.path())
            .object_name("my orders/today")
            .bucket_size(ALLOCATION_UNIT)
            .open()
            .unwrap();

        assert_eq!(pool.object_name(), "my_orders_today");
        assert_eq!(pool.bucket_size(), ALLOCATION_UNIT);
    }
}
