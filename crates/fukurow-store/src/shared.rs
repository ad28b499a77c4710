//! Shared store handle: many concurrent readers, exclusive writers

use crate::store::QuadStore;
use crate::StoreError;
use fukurow_core::Triple;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Cloneable handle to a store guarded by a reader/writer lock
///
/// Each mutation holds the write lock for its whole index update, so a reader
/// sees either the state before or after it, never a partial one.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<QuadStore>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_store(store: QuadStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    /// Read access for query evaluation
    pub fn read(&self) -> Result<RwLockReadGuard<'_, QuadStore>, StoreError> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    /// Exclusive access for a batch of mutations
    pub fn write(&self) -> Result<RwLockWriteGuard<'_, QuadStore>, StoreError> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }

    pub fn insert(&self, triple: &Triple) -> Result<bool, StoreError> {
        Ok(self.write()?.insert(triple))
    }

    pub fn delete(&self, triple: &Triple) -> Result<bool, StoreError> {
        Ok(self.write()?.delete(triple))
    }

    /// Bulk load under a single write lock
    pub fn load<I: IntoIterator<Item = Triple>>(&self, triples: I) -> Result<usize, StoreError> {
        let mut store = self.write()?;
        let added = store.load(triples);
        debug!("Shared store now holds {} triples", store.len());
        Ok(added)
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.read()?.is_empty())
    }
}
