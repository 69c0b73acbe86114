use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Fixed-width identifier of a bucket.
///
/// Derived from a username by the protocol engine. The hex
///  rendering is what backing stores use as their key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BucketId(Vec<u8>);

#[derive(Debug, thiserror::Error)]
pub enum BucketIdError {
    #[error("bucket id is empty")]
    Empty,
    #[error("bucket id is not valid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

impl BucketId {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, BucketIdError> {
        if s.is_empty() {
            return Err(BucketIdError::Empty);
        }
        Ok(Self(hex::decode(s)?))
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for BucketId {
    type Err = BucketIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

/// Which records count as "the same entry" for deduplication.
///
/// A store instance is built with exactly one scope and applies it
///  to every uniqueness call, so the two disciplines never mix
///  within one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UniquenessScope {
    /// An entry is a duplicate only if the same bytes were already
    ///  accepted into the same bucket.
    #[default]
    Bucket,
    /// An entry is a duplicate if the same bytes were accepted into
    ///  any bucket.
    Global,
}

impl fmt::Display for UniquenessScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UniquenessScope::Bucket => write!(f, "bucket"),
            UniquenessScope::Global => write!(f, "global"),
        }
    }
}

#[async_trait]
pub trait BucketStore: Send + Sync + std::fmt::Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    /// The uniqueness discipline this store enforces
    fn scope(&self) -> UniquenessScope;

    /// Replace the value of a bucket, creating it if absent
    ///
    /// # Arguments
    /// * `id` - The bucket to write
    /// * `value` - The full new value of the bucket
    async fn put(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error>;

    /// Read the full accumulated value of a bucket
    ///
    /// # Returns
    /// * `Ok(Vec<u8>)` - The bucket value, empty if the bucket was never written
    /// * `Err(Self::Error)` - The backing store failed
    async fn get(&self, id: &BucketId) -> Result<Vec<u8>, Self::Error>;

    /// Concatenate `value` to the end of a bucket
    ///
    /// Must be atomic with respect to other appends on the same
    ///  bucket: concurrent appends never lose each other's bytes.
    async fn append(&self, id: &BucketId, value: &[u8]) -> Result<(), Self::Error>;

    /// Check whether `value` has not been recorded yet under this store's scope
    ///
    /// Backing store failures answer `false` so a transient error
    ///  can never let a duplicate through.
    async fn is_unique(&self, id: &BucketId, value: &[u8]) -> bool;

    /// Record `value` in the uniqueness index if it is absent
    ///
    /// # Returns
    /// * `Ok(true)` - The record was newly inserted
    /// * `Ok(false)` - A matching record already existed; nothing changed
    async fn record_unique(&self, id: &BucketId, value: &[u8]) -> Result<bool, Self::Error>;

    /// Record `value` and append it to the bucket as one atomic unit
    ///
    /// This is the arbiter the insertion pipeline relies on: of
    ///  several concurrent callers with the same entry exactly one
    ///  observes `Ok(true)` and appends.
    ///
    /// # Returns
    /// * `Ok(true)` - The entry was recorded and appended
    /// * `Ok(false)` - The entry was already recorded; the bucket is untouched
    async fn append_unique(&self, id: &BucketId, value: &[u8]) -> Result<bool, Self::Error>;
}
