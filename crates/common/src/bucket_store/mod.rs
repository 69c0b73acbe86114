mod memory;
mod provider;

pub use memory::{MemoryBucketStore, MemoryBucketStoreError};
pub use provider::{BucketId, BucketIdError, BucketStore, UniquenessScope};
