//! The insertion pipeline.
//!
//! One [`InsertRequest`] becomes one or more entries in the bucket of its
//! username. Phase 1 (breach) stores the ground-truth credential and,
//! optionally, a username-only entry; duplicates are skipped. Phase 2
//! (similarity) stores near-miss variants and would rather store a
//! possibly-colliding entry than drop a variant.
//!
//! Every entry is placed with [`BucketStore::append_unique`], which
//! claims the uniqueness record and appends in one atomic step. There
//! is no separate check-then-append window. Appends that already
//! happened stand if a later step of the same record fails.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::bucket_store::{BucketId, BucketStore};
use crate::engine::{EngineError, MetadataKind, ProtocolEngine};
use crate::variants::{RuleMutator, VariantError, VariantSource};

mod base64_bytes;
mod record;

pub use record::{BreachRecord, RecordError};

/// Substitutes tried for a colliding similarity entry before it is stored anyway
pub const MAX_COLLISION_ATTEMPTS: usize = 10;
/// Randomness behind each substitute, in bytes (256 bits)
pub const SUBSTITUTE_ENTROPY_BYTES: usize = 32;
/// Upper bound on variants requested for one record
pub const MAX_VARIANTS: usize = 10_000;

const DEFAULT_NUM_VARIANTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Ground-truth breach records
    Breach,
    /// Synthetic near-miss expansion
    Similarity,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Breach => write!(f, "breach"),
            Phase::Similarity => write!(f, "similarity"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown phase '{0}', expected 1, 2, breach or similarity")]
pub struct PhaseParseError(String);

impl FromStr for Phase {
    type Err = PhaseParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "1" | "breach" => Ok(Phase::Breach),
            "2" | "similarity" => Ok(Phase::Similarity),
            _ => Err(PhaseParseError(s.to_string())),
        }
    }
}

fn default_num_variants() -> usize {
    DEFAULT_NUM_VARIANTS
}

/// One breach record to insert
///
/// Credentials and metadata are raw bytes; breach dumps are not always
///  UTF-8. On the JSON wire they travel base64-encoded.
#[derive(Clone, Serialize, Deserialize)]
pub struct InsertRequest {
    #[serde(with = "base64_bytes")]
    pub username: Vec<u8>,
    #[serde(with = "base64_bytes")]
    pub password: Vec<u8>,
    /// Auxiliary metadata sealed inside every entry of this record
    #[serde(default, with = "base64_bytes")]
    pub metadata: Vec<u8>,
    /// Variants to generate in the similarity phase
    #[serde(default = "default_num_variants")]
    pub num_variants: usize,
    /// Also store a username-only entry in the breach phase
    #[serde(default)]
    pub include_username_variant: bool,
    pub phase: Phase,
    /// Draw variants from the external generator instead of the built-in mutator
    #[serde(default)]
    pub use_external_generator: bool,
}

impl fmt::Debug for InsertRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InsertRequest")
            .field("username", &String::from_utf8_lossy(&self.username))
            .field("password", &"<redacted>")
            .field("metadata", &String::from_utf8_lossy(&self.metadata))
            .field("num_variants", &self.num_variants)
            .field("include_username_variant", &self.include_username_variant)
            .field("phase", &self.phase)
            .field("use_external_generator", &self.use_external_generator)
            .finish()
    }
}

impl InsertRequest {
    pub fn new(username: impl Into<Vec<u8>>, password: impl Into<Vec<u8>>, phase: Phase) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            metadata: Vec::new(),
            num_variants: DEFAULT_NUM_VARIANTS,
            include_username_variant: false,
            phase,
            use_external_generator: false,
        }
    }

    /// Reject records the pipeline would refuse, before any entry is built
    pub fn validate(&self) -> Result<(), String> {
        if self.username.is_empty() {
            return Err("username cannot be empty".into());
        }
        if self.phase == Phase::Breach && self.password.is_empty() {
            return Err("breach records need a password".into());
        }
        if self.num_variants > MAX_VARIANTS {
            return Err(format!(
                "at most {} variants per record, got {}",
                MAX_VARIANTS, self.num_variants
            ));
        }
        Ok(())
    }
}

/// What one insertion did to its bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertReport {
    /// hex-encoded bucket id
    pub bucket_id: String,
    /// Entries appended, including known collisions
    pub appended: usize,
    /// Breach-phase entries skipped as duplicates
    pub duplicates: usize,
    /// Similarity entries that needed a random substitute to become unique
    pub substituted: usize,
    /// Similarity entries stored while still colliding
    pub collisions: usize,
}

impl InsertReport {
    fn new(bucket_id: &BucketId) -> Self {
        Self {
            bucket_id: bucket_id.to_hex(),
            appended: 0,
            duplicates: 0,
            substituted: 0,
            collisions: 0,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum InsertError<E> {
    #[error("bucket store error: {0}")]
    Store(#[source] E),
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),
    #[error("variant generation failed: {0}")]
    Variants(#[from] VariantError),
    #[error("external variant generator requested but none is configured")]
    GeneratorUnavailable,
    #[error("invalid insert request: {0}")]
    InvalidRequest(String),
}

/// How a similarity entry ended up in its bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Stored as a unique entry after `substitutions` random substitutes
    Unique { substitutions: usize },
    /// Every attempt collided; the last candidate was stored anyway
    KnownCollision,
}

#[derive(Clone)]
pub struct Inserter<S> {
    store: S,
    engine: Arc<dyn ProtocolEngine>,
    mutator: RuleMutator,
    generator: Option<Arc<dyn VariantSource>>,
}

impl<S: fmt::Debug> fmt::Debug for Inserter<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Inserter")
            .field("store", &self.store)
            .field("engine", &self.engine)
            .field("generator", &self.generator)
            .finish()
    }
}

impl<S: BucketStore> Inserter<S> {
    pub fn new(store: S, engine: Arc<dyn ProtocolEngine>) -> Self {
        Self {
            store,
            engine,
            mutator: RuleMutator::new(),
            generator: None,
        }
    }

    /// Use `generator` for requests that ask for the external generator
    pub fn with_generator(mut self, generator: Arc<dyn VariantSource>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn ProtocolEngine> {
        &self.engine
    }

    #[tracing::instrument(skip_all, fields(phase = %request.phase))]
    pub async fn insert(&self, request: &InsertRequest) -> Result<InsertReport, InsertError<S::Error>> {
        request.validate().map_err(InsertError::InvalidRequest)?;

        let bucket_id = self.engine.bucket_id(request.username.as_slice());
        let mut report = InsertReport::new(&bucket_id);

        match request.phase {
            Phase::Breach => self.insert_breach(request, &bucket_id, &mut report).await?,
            Phase::Similarity => self.insert_similar(request, &bucket_id, &mut report).await?,
        }

        tracing::info!(
            bucket_id = %bucket_id,
            appended = report.appended,
            duplicates = report.duplicates,
            substituted = report.substituted,
            collisions = report.collisions,
            "record inserted"
        );
        Ok(report)
    }

    async fn insert_breach(
        &self,
        request: &InsertRequest,
        bucket_id: &BucketId,
        report: &mut InsertReport,
    ) -> Result<(), InsertError<S::Error>> {
        let username = request.username.as_slice();
        let metadata = request.metadata.as_slice();

        let entry = self.engine.encrypt_entry(
            username,
            Some(request.password.as_slice()),
            MetadataKind::BreachedPassword,
            metadata,
        )?;
        self.place_once(bucket_id, &entry, MetadataKind::BreachedPassword, report)
            .await?;

        if request.include_username_variant {
            let entry = self.engine.encrypt_entry(
                username,
                None,
                MetadataKind::BreachedUsername,
                metadata,
            )?;
            self.place_once(bucket_id, &entry, MetadataKind::BreachedUsername, report)
                .await?;
        }

        Ok(())
    }

    /// Append `entry` unless it is already recorded; duplicates are skipped
    async fn place_once(
        &self,
        bucket_id: &BucketId,
        entry: &[u8],
        kind: MetadataKind,
        report: &mut InsertReport,
    ) -> Result<(), InsertError<S::Error>> {
        let appended = self
            .store
            .append_unique(bucket_id, entry)
            .await
            .map_err(InsertError::Store)?;

        if appended {
            report.appended += 1;
        } else {
            tracing::warn!(bucket_id = %bucket_id, kind = %kind, "skipping duplicate entry");
            report.duplicates += 1;
        }
        Ok(())
    }

    async fn insert_similar(
        &self,
        request: &InsertRequest,
        bucket_id: &BucketId,
        report: &mut InsertReport,
    ) -> Result<(), InsertError<S::Error>> {
        let username = request.username.as_slice();
        let metadata = request.metadata.as_slice();
        let password = request.password.as_slice();

        let variants = if request.use_external_generator {
            let generator = self
                .generator
                .as_ref()
                .ok_or(InsertError::GeneratorUnavailable)?;
            let mut variants = generator.variants(password, request.num_variants).await?;
            // the program may echo its input or overshoot the count
            variants.retain(|variant| variant.as_slice() != password);
            variants.truncate(request.num_variants);
            variants
        } else {
            self.mutator.mutate(password, request.num_variants)
        };
        tracing::debug!(bucket_id = %bucket_id, variants = variants.len(), "generated variants");

        for variant in &variants {
            let entry = self.engine.encrypt_entry(
                username,
                Some(variant),
                MetadataKind::SimilarPassword,
                metadata,
            )?;

            match self.place_with_retry(request, bucket_id, entry).await? {
                Placement::Unique { substitutions } => {
                    report.appended += 1;
                    if substitutions > 0 {
                        report.substituted += 1;
                    }
                }
                Placement::KnownCollision => {
                    report.appended += 1;
                    report.collisions += 1;
                }
            }
        }

        Ok(())
    }

    /// Place a similarity entry, swapping in random substitutes on collision
    ///
    /// Tries the entry itself and then at most [`MAX_COLLISION_ATTEMPTS`]
    ///  substitutes. If every candidate collides the last one is appended
    ///  regardless and reported as [`Placement::KnownCollision`].
    pub async fn place_with_retry(
        &self,
        request: &InsertRequest,
        bucket_id: &BucketId,
        mut entry: Vec<u8>,
    ) -> Result<Placement, InsertError<S::Error>> {
        for attempt in 0..=MAX_COLLISION_ATTEMPTS {
            let appended = self
                .store
                .append_unique(bucket_id, &entry)
                .await
                .map_err(InsertError::Store)?;
            if appended {
                return Ok(Placement::Unique {
                    substitutions: attempt,
                });
            }
            if attempt == MAX_COLLISION_ATTEMPTS {
                break;
            }

            tracing::debug!(bucket_id = %bucket_id, attempt, "similar entry collides, substituting");
            let substitute = self.substitute();
            entry = self.engine.encrypt_entry(
                request.username.as_slice(),
                Some(&substitute),
                MetadataKind::SimilarPassword,
                request.metadata.as_slice(),
            )?;
        }

        tracing::warn!(
            bucket_id = %bucket_id,
            attempts = MAX_COLLISION_ATTEMPTS,
            "collision attempts exhausted, storing entry anyway"
        );
        self.store
            .append(bucket_id, &entry)
            .await
            .map_err(InsertError::Store)?;
        self.store
            .record_unique(bucket_id, &entry)
            .await
            .map_err(InsertError::Store)?;
        Ok(Placement::KnownCollision)
    }

    /// A fresh candidate: 256 random bits, mutated once
    fn substitute(&self) -> Vec<u8> {
        let mut random = [0u8; SUBSTITUTE_ENTROPY_BYTES];
        rand::rng().fill_bytes(&mut random);
        self.mutator
            .mutate(&random, 1)
            .pop()
            .unwrap_or_else(|| random.to_vec())
    }
}
