/**
 * Durable bucket storage: the append-only mapping from
 *  bucket identifier to a blob of concatenated entries,
 *  plus the uniqueness index kept beside it.
 */
pub mod bucket_store;
/**
 * The seam to the protocol engine that derives bucket
 *  identifiers, encrypts entries and serves client
 *  requests. Ships a keyed reference engine.
 */
pub mod engine;
/**
 * Turns breach records into bucket entries across the
 *  breach and similarity phases.
 */
pub mod ingest;
/**
 * Sources of near-miss password variants: the built-in
 *  rule mutator and external generator processes.
 */
pub mod variants;
/**
 * Helper for reporting build version information
 *  captured at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::bucket_store::{BucketId, BucketStore, MemoryBucketStore, UniquenessScope};
    pub use crate::engine::{BucketAccess, EngineError, KeyedEngine, MetadataKind, ProtocolEngine};
    pub use crate::ingest::{InsertError, InsertReport, InsertRequest, Inserter, Phase};
    pub use crate::variants::{RuleMutator, ScriptGenerator, VariantError, VariantSource};
    pub use crate::version::build_info;
}
