use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::provider::{BucketId, BucketStore, UniquenessScope};

/// In-memory bucket store
///
/// Every operation runs under one mutex, so appends and
///  record-then-append are trivially atomic.
#[derive(Debug, Clone)]
pub struct MemoryBucketStore {
    inner: Arc<Mutex<MemoryBucketStoreInner>>,
    scope: UniquenessScope,
}

#[derive(Debug, Default)]
struct MemoryBucketStoreInner {
    /// bucket_id -> concatenated entries
    buckets: HashMap<BucketId, Vec<u8>>,
    /// (bucket_id, entry) pairs accepted so far
    records: HashSet<(BucketId, Vec<u8>)>,
    /// entry bytes accepted into any bucket
    values: HashSet<Vec<u8>>,
}

impl MemoryBucketStoreInner {
    fn is_recorded(&self, scope: UniquenessScope, id: &BucketId, value: &[u8]) -> bool {
        match scope {
            UniquenessScope::Bucket => self.records.contains(&(id.clone(), value.to_vec())),
            UniquenessScope::Global => self.values.contains(value),
        }
    }

    fn record(&mut self, scope: UniquenessScope, id: &BucketId, value: &[u8]) -> bool {
        if self.is_recorded(scope, id, value) {
            return false;
        }
        self.records.insert((id.clone(), value.to_vec()));
        self.values.insert(value.to_vec());
        true
    }

    fn append(&mut self, id: &BucketId, value: &[u8]) {
        self.buckets
            .entry(id.clone())
            .or_default()
            .extend_from_slice(value);
    }
}

/// The in-memory store cannot fail
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryBucketStoreError {}

impl MemoryBucketStore {
    pub fn new(scope: UniquenessScope) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MemoryBucketStoreInner::default())),
            scope,
        }
    }

    /// Number of uniqueness records held
    pub fn record_count(&self) -> usize {
        self.inner.lock().records.len()
    }

    /// Number of buckets that have been written
    pub fn bucket_count(&self) -> usize {
        self.inner.lock().buckets.len()
    }
}

impl Default for MemoryBucketStore {
    fn default() -> Self {
        Self::new(UniquenessScope::default())
    }
}

#[async_trait]
impl BucketStore for MemoryBucketStore {
    type Error = MemoryBucketStoreError;

    fn scope(&self) -> UniquenessScope {
        self.scope
    }

    async fn put(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error> {
        self.inner.lock().buckets.insert(id.clone(), value.to_vec());
        Ok(())
    }

    async fn get(&self, id: &BucketId) -> Result<Vec<u8>, Self::Error> {
        Ok(self
            .inner
            .lock()
            .buckets
            .get(id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error> {
        self.inner.lock().append(id, value);
        Ok(())
    }

    async fn is_unique(&self, id: &BucketId, value: &[u8]) -> bool {
        !self.inner.lock().is_recorded(self.scope, id, value)
    }

    async fn record_unique(&self, id: &BucketId, value: &[u8]) -> Result<bool, Self::Error> {
        Ok(self.inner.lock().record(self.scope, id, value))
    }

    async fn append_unique(&self, id: &BucketId, value: &[u8]) -> Result<bool, Self::Error> {
        let mut inner = self.inner.lock();
        if !inner.record(self.scope, id, value) {
            return Ok(false);
        }
        inner.append(id, value);
        Ok(true)
    }
}
