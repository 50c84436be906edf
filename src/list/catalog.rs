//! # List Catalog
//!
//! `ListCatalog` finds every list stored in a pool after a restart and keeps
//! them addressable by name.
//!
//! ## Discovery
//!
//! `load()` asks the pool for all live `ListHeader` records and attaches a
//! `PersistentList` to each one, which loads its chain. Lists are keyed by the
//! name stored in their header. If two headers carry the same name, the one
//! at the lower location wins and the other is skipped with a warning; both
//! stay allocated in the pool.
//!
//! A list whose chain fails to load (cycle, broken link) aborts `load()` with
//! the offending list's name in the error.

use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use log::{info, warn};
use parking_lot::RwLock;

use super::persistent_list::PersistentList;
use crate::storage::{MemoryPool, RecordType};

pub struct ListCatalog {
    pool: Arc<MemoryPool>,
    lists: RwLock<HashMap<String, Arc<PersistentList>>>,
}

impl ListCatalog {
    /// Discovers and loads every list in `pool`.
    pub fn load(pool: Arc<MemoryPool>) -> Result<Self> {
        let mut headers = pool.load(RecordType::ListHeader)?;
        headers.sort();

        let mut lists: HashMap<String, Arc<PersistentList>> = HashMap::new();
        for header in headers {
            let list = PersistentList::attach(&pool, header)
                .wrap_err_with(|| format!("failed to attach list header {}", header))?;
            if let Some(existing) = lists.get(list.name()) {
                warn!(
                    "skipping list header {}: name '{}' already used by {}",
                    header,
                    list.name(),
                    existing.header()
                );
                continue;
            }

            lists.insert(list.name().to_string(), Arc::new(list));
        }

        info!(
            "catalog of pool '{}' holds {} lists",
            pool.object_name(),
            lists.len()
        );

        Ok(Self {
            pool,
            lists: RwLock::new(lists),
        })
    }

    pub fn get(&self, name: &str) -> Option<Arc<PersistentList>> {
        self.lists.read().get(name).cloned()
    }

    /// Returns the list called `name`, creating an empty one if none exists.
    pub fn get_or_create(&self, name: &str) -> Result<Arc<PersistentList>> {
        if let Some(list) = self.get(name) {
            return Ok(list);
        }

        let mut lists = self.lists.write();
        if let Some(list) = lists.get(name) {
            return Ok(Arc::clone(list));
        }

        let list = Arc::new(PersistentList::create(&self.pool, name)?);
        lists.insert(name.to_string(), Arc::clone(&list));
        Ok(list)
    }

    /// List names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.lists.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.lists.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.read().is_empty()
    }

    pub fn pool(&self) -> &Arc<MemoryPool> {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ALLOCATION_UNIT;
    use tempfile::tempdir;
    use test_log::test;

    #[test]
    fn load_empty_pool() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(MemoryPool::open(dir.path(), "cat", ALLOCATION_UNIT).unwrap());

        let catalog = ListCatalog::load(pool).unwrap();

        assert!(catalog.is_empty());
        assert!(catalog.names().is_empty());
    }

    #[test]
    fn get_or_create_reuses_existing_list() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(MemoryPool::open(dir.path(), "cat", ALLOCATION_UNIT).unwrap());
        let catalog = ListCatalog::load(pool).unwrap();

        let first = catalog.get_or_create("jobs").unwrap();
        let second = catalog.get_or_create("jobs").unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn load_finds_lists_by_name() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(MemoryPool::open(dir.path(), "cat", ALLOCATION_UNIT).unwrap());
        let jobs = PersistentList::create(&pool, "jobs").unwrap();
        jobs.push_back(b"one").unwrap();
        jobs.push_back(b"two").unwrap();
        PersistentList::create(&pool, "done").unwrap();

        let catalog = ListCatalog::load(Arc::clone(&pool)).unwrap();

        assert_eq!(catalog.names(), vec!["done", "jobs"]);
        let loaded = catalog.get("jobs").unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded.header(), jobs.header());
        assert!(catalog.get("missing").is_none());
    }

    #[test]
    fn duplicate_names_keep_lowest_location() {
        let dir = tempdir().unwrap();
        let pool = Arc::new(MemoryPool::open(dir.path(), "cat", ALLOCATION_UNIT).unwrap());
        let first = PersistentList::create(&pool, "dup").unwrap();
        let second = PersistentList::create(&pool, "dup").unwrap();
        assert!(first.header() < second.header());

        let catalog = ListCatalog::load(pool).unwrap();

        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("dup").unwrap().header(), first.header());
    }
}
