#![forbid(unsafe_code)]

use super::{SqliteStore, StoreError};
use parking_lot::Mutex;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

/// Hands out one connection per operation and keeps a bounded idle list.
#[derive(Debug)]
pub struct StorePool {
    storage_dir: PathBuf,
    idle: Mutex<Vec<SqliteStore>>,
    max_idle: usize,
}

impl StorePool {
    /// Opens the first connection (installing the schema) and parks it as idle.
    pub fn open(storage_dir: impl AsRef<Path>, max_idle: usize) -> Result<Self, StoreError> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let first = SqliteStore::open(&storage_dir)?;
        Ok(Self {
            storage_dir,
            idle: Mutex::new(vec![first]),
            max_idle: max_idle.max(1),
        })
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    pub fn acquire(&self) -> Result<PooledStore<'_>, StoreError> {
        let reused = self.idle.lock().pop();
        let store = match reused {
            Some(store) => store,
            None => SqliteStore::connect(&self.storage_dir)?,
        };
        Ok(PooledStore {
            pool: self,
            store: Some(store),
        })
    }

    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }

    fn release(&self, store: SqliteStore) {
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(store);
        }
    }
}

/// A connection on loan from [`StorePool`]; returned when dropped.
pub struct PooledStore<'a> {
    pool: &'a StorePool,
    store: Option<SqliteStore>,
}

impl Deref for PooledStore<'_> {
    type Target = SqliteStore;

    fn deref(&self) -> &Self::Target {
        match &self.store {
            Some(store) => store,
            None => unreachable!("pooled store is only taken on drop"),
        }
    }
}

impl DerefMut for PooledStore<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match &mut self.store {
            Some(store) => store,
            None => unreachable!("pooled store is only taken on drop"),
        }
    }
}

impl Drop for PooledStore<'_> {
    fn drop(&mut self) {
        if let Some(store) = self.store.take() {
            self.pool.release(store);
        }
    }
}
