//! Shared fixtures for insertion pipeline tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::bucket_store::{BucketId, BucketStore, MemoryBucketStore, UniquenessScope};
use common::engine::{
    BucketAccess, EngineError, EngineSecret, EvaluateRequest, EvaluateResponse, KeyedEngine,
    MetadataKind, OpenedEntry, ProtocolEngine, DEFAULT_BUCKET_ID_BITS,
};
use common::ingest::Inserter;
use common::variants::{VariantError, VariantSource};

pub fn keyed_engine() -> Arc<KeyedEngine> {
    Arc::new(KeyedEngine::new(EngineSecret::generate(), DEFAULT_BUCKET_ID_BITS).unwrap())
}

/// A fresh in-memory store and an inserter over it
pub fn setup_inserter(scope: UniquenessScope) -> (Inserter<MemoryBucketStore>, Arc<KeyedEngine>) {
    let engine = keyed_engine();
    let inserter = Inserter::new(MemoryBucketStore::new(scope), engine.clone());
    (inserter, engine)
}

/// Ask the engine about a credential the way a client would and open
///  every entry it can
pub async fn client_check(
    engine: &KeyedEngine,
    store: &dyn BucketAccess,
    username: impl AsRef<[u8]>,
    password: impl AsRef<[u8]>,
) -> Vec<OpenedEntry> {
    let request = EvaluateRequest::for_credential(
        username.as_ref(),
        password.as_ref(),
        DEFAULT_BUCKET_ID_BITS,
    );
    let body = serde_json::to_vec(&request).unwrap();
    let response = engine.handle_request(&body, store).await.unwrap();
    let response: EvaluateResponse = bincode::deserialize(&response).unwrap();

    let mut opened = Vec::new();
    for evaluated in &response.evaluated {
        opened.extend(KeyedEngine::open_bucket(evaluated, &response.bucket_contents).unwrap());
    }
    opened
}

pub fn kinds(entries: &[OpenedEntry]) -> Vec<MetadataKind> {
    entries.iter().map(|e| e.kind).collect()
}

/// Store whose uniqueness index claims every entry already exists
#[derive(Debug, Clone, Default)]
pub struct SaturatedStore {
    pub inner: MemoryBucketStore,
}

#[async_trait]
impl BucketStore for SaturatedStore {
    type Error = <MemoryBucketStore as BucketStore>::Error;

    fn scope(&self) -> UniquenessScope {
        self.inner.scope()
    }

    async fn put(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error> {
        self.inner.put(id, value).await
    }

    async fn get(&self, id: &BucketId) -> Result<Vec<u8>, Self::Error> {
        self.inner.get(id).await
    }

    async fn append(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error> {
        self.inner.append(id, value).await
    }

    async fn is_unique(&self, _id: &BucketId, _value: &[u8]) -> bool {
        false
    }

    async fn record_unique(&self, _id: &BucketId, _value: &[u8]) -> Result<bool, Self::Error> {
        Ok(false)
    }

    async fn append_unique(&self, _id: &BucketId, _value: &[u8]) -> Result<bool, Self::Error> {
        Ok(false)
    }
}

/// Engine that stops encrypting after a fixed number of entries
#[derive(Debug)]
pub struct FlakyEngine {
    pub inner: KeyedEngine,
    pub remaining: AtomicUsize,
}

impl FlakyEngine {
    pub fn new(successes: usize) -> Self {
        Self {
            inner: KeyedEngine::new(EngineSecret::generate(), DEFAULT_BUCKET_ID_BITS).unwrap(),
            remaining: AtomicUsize::new(successes),
        }
    }
}

#[async_trait]
impl ProtocolEngine for FlakyEngine {
    fn bucket_id(&self, username: &[u8]) -> BucketId {
        self.inner.bucket_id(username)
    }

    fn encrypt_entry(
        &self,
        username: &[u8],
        password: Option<&[u8]>,
        kind: MetadataKind,
        metadata: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let left = self.remaining.load(Ordering::SeqCst);
        if left == 0 {
            return Err(EngineError::Encryption("key unavailable".into()));
        }
        self.remaining.store(left - 1, Ordering::SeqCst);
        self.inner.encrypt_entry(username, password, kind, metadata)
    }

    fn config(&self) -> serde_json::Value {
        self.inner.config()
    }

    async fn handle_request(
        &self,
        body: &[u8],
        store: &dyn BucketAccess,
    ) -> Result<Vec<u8>, EngineError> {
        self.inner.handle_request(body, store).await
    }
}

/// Generator that always answers with the same candidates
#[derive(Debug, Clone)]
pub struct FixedGenerator(pub Vec<Vec<u8>>);

#[async_trait]
impl VariantSource for FixedGenerator {
    async fn variants(&self, _password: &[u8], count: usize) -> Result<Vec<Vec<u8>>, VariantError> {
        Ok(self.0.iter().take(count).cloned().collect())
    }
}

/// Generator that repeats its input and ignores the requested count
#[derive(Debug, Clone)]
pub struct EchoingGenerator(pub Vec<Vec<u8>>);

#[async_trait]
impl VariantSource for EchoingGenerator {
    async fn variants(&self, password: &[u8], _count: usize) -> Result<Vec<Vec<u8>>, VariantError> {
        let mut out = vec![password.to_vec()];
        out.extend(self.0.iter().cloned());
        Ok(out)
    }
}

/// Generator that always fails the way a crashed script does
#[derive(Debug, Clone)]
pub struct BrokenGenerator;

#[async_trait]
impl VariantSource for BrokenGenerator {
    async fn variants(&self, _password: &[u8], _count: usize) -> Result<Vec<Vec<u8>>, VariantError> {
        Err(VariantError::Failed {
            status: "exit status: 1".into(),
            stderr: "model not loaded".into(),
        })
    }
}
