//! The seam between the store and the protocol engine.
//!
//! The engine owns everything cryptographic: how a username maps to a
//! bucket, how an entry is sealed, and how a client request is answered.
//! The store never interprets entries; the engine never touches storage
//! except through [`BucketAccess`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::bucket_store::{BucketId, BucketStore};

pub mod entry;
mod keyed;

pub use keyed::{
    EngineSecret, EvaluateRequest, EvaluateResponse, KeyedEngine, OpenedEntry,
    DEFAULT_BUCKET_ID_BITS, MAX_LOOKUPS, PROTOCOL_VERSION,
};

/// Opaque error from whatever store backs a [`BucketAccess`]
pub type AccessError = Box<dyn std::error::Error + Send + Sync>;

/// What an entry asserts about the credential it was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetadataKind {
    /// The exact username and password appeared in a breach
    BreachedPassword,
    /// The username appeared in a breach
    BreachedUsername,
    /// The password is a near miss of a breached one
    SimilarPassword,
}

impl MetadataKind {
    pub fn as_byte(&self) -> u8 {
        match self {
            MetadataKind::BreachedPassword => 1,
            MetadataKind::BreachedUsername => 2,
            MetadataKind::SimilarPassword => 3,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(MetadataKind::BreachedPassword),
            2 => Some(MetadataKind::BreachedUsername),
            3 => Some(MetadataKind::SimilarPassword),
            _ => None,
        }
    }
}

impl fmt::Display for MetadataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataKind::BreachedPassword => write!(f, "breached-password"),
            MetadataKind::BreachedUsername => write!(f, "breached-username"),
            MetadataKind::SimilarPassword => write!(f, "similar-password"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("malformed request: {0}")]
    MalformedRequest(String),
    #[error("invalid engine configuration: {0}")]
    Config(String),
    #[error("encryption failed: {0}")]
    Encryption(String),
    #[error("bucket store error: {0}")]
    Store(#[source] AccessError),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// The store capabilities handed to an engine while it serves a request
///
/// Reads always return the whole accumulated bucket; there is no
///  ranged access.
#[async_trait]
pub trait BucketAccess: Send + Sync {
    async fn get_bucket(&self, id: &BucketId) -> Result<Vec<u8>, AccessError>;

    async fn put_bucket(&self, id: &BucketId, value: &[u8]) -> Result<(), AccessError>;

    async fn append_bucket(&self, id: &BucketId, value: &[u8]) -> Result<(), AccessError>;

    async fn is_unique_entry(&self, id: &BucketId, value: &[u8]) -> bool;
}

#[async_trait]
impl<S: BucketStore> BucketAccess for S {
    async fn get_bucket(&self, id: &BucketId) -> Result<Vec<u8>, AccessError> {
        BucketStore::get(self, id).await.map_err(Into::into)
    }

    async fn put_bucket(&self, id: &BucketId, value: &[u8]) -> Result<(), AccessError> {
        BucketStore::put(self, id, value).await.map_err(Into::into)
    }

    async fn append_bucket(&self, id: &BucketId, value: &[u8]) -> Result<(), AccessError> {
        BucketStore::append(self, id, value).await.map_err(Into::into)
    }

    async fn is_unique_entry(&self, id: &BucketId, value: &[u8]) -> bool {
        BucketStore::is_unique(self, id, value).await
    }
}

#[async_trait]
pub trait ProtocolEngine: Send + Sync + fmt::Debug {
    /// Derive the bucket a username's entries live in
    fn bucket_id(&self, username: &[u8]) -> BucketId;

    /// Seal one entry for storage
    ///
    /// # Arguments
    /// * `username` - The breached username
    /// * `password` - The password, or `None` for a username-only entry
    /// * `kind` - What the entry asserts
    /// * `metadata` - Auxiliary bytes carried inside the entry
    fn encrypt_entry(
        &self,
        username: &[u8],
        password: Option<&[u8]>,
        kind: MetadataKind,
        metadata: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    /// Public configuration a client needs to build requests
    fn config(&self) -> serde_json::Value;

    /// Answer a serialized client request
    ///
    /// `MalformedRequest` is the only error a client caused; every
    ///  other variant is a server fault.
    async fn handle_request(
        &self,
        body: &[u8],
        store: &dyn BucketAccess,
    ) -> Result<Vec<u8>, EngineError>;
}
