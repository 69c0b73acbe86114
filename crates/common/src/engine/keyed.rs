//! Keyed reference engine
//!
//! A complete but *non-oblivious* engine: clients send a hash of their
//! credential instead of a blinded element, so the server can in
//! principle test guesses against it. It exists so the service can run
//! and be tested end to end without an external engine.
//!
//! - bucket id: BLAKE3 (derive-key mode) of the username, truncated to
//!   `bucket_id_bits` bits
//! - lookup: BLAKE3 (derive-key mode) of the length-prefixed username
//!   and optional password, computed by the client
//! - evaluation: BLAKE3 keyed hash of the lookup under the server secret
//! - entry key: BLAKE3 (derive-key mode) of the evaluation
//! - entry: `frame(nonce (12 bytes) || ChaCha20-Poly1305(kind || metadata))`
//!   with the nonce taken from a keyed hash of the plaintext, so the same
//!   inputs always seal to the same bytes

use std::fmt;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use serde::{Deserialize, Serialize};

use super::entry::{frame, split_entries};
use super::{BucketAccess, EngineError, MetadataKind, ProtocolEngine};
use crate::bucket_store::BucketId;

/// Version tag carried by requests and responses
pub const PROTOCOL_VERSION: u16 = 1;
/// Bucket id width used when none is configured
pub const DEFAULT_BUCKET_ID_BITS: u8 = 20;
/// Upper bound on lookups evaluated per request
pub const MAX_LOOKUPS: usize = 4;
/// Size of the engine secret in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;

const MAX_BUCKET_ID_BITS: u8 = 64;
const LOOKUP_SIZE: usize = 32;

const BUCKET_ID_CONTEXT: &str = "leakcheck 2024-06-01 bucket id";
const LOOKUP_CONTEXT: &str = "leakcheck 2024-06-01 credential lookup";
const ENTRY_KEY_CONTEXT: &str = "leakcheck 2024-06-01 entry key";

/// The server-side key of the keyed engine
#[derive(Clone, PartialEq, Eq)]
pub struct EngineSecret([u8; SECRET_SIZE]);

impl fmt::Debug for EngineSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EngineSecret(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for EngineSecret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Self(bytes)
    }
}

impl EngineSecret {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    pub fn from_hex(s: &str) -> Result<Self, EngineError> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| EngineError::Config(format!("engine secret is not hex: {}", e)))?;
        let buff: [u8; SECRET_SIZE] = bytes.try_into().map_err(|b: Vec<u8>| {
            EngineError::Config(format!(
                "invalid engine secret size, expected {}, got {}",
                SECRET_SIZE,
                b.len()
            ))
        })?;
        Ok(Self(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Client request understood by [`KeyedEngine`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluateRequest {
    pub version: u16,
    /// hex-encoded bucket id
    pub bucket_id: String,
    /// base64-encoded lookups to evaluate
    pub lookups: Vec<String>,
}

impl EvaluateRequest {
    /// Build the request a client sends to check a credential: one
    ///  lookup for the full credential and one for the username alone.
    pub fn for_credential(username: &[u8], password: &[u8], bucket_id_bits: u8) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            bucket_id: KeyedEngine::derive_bucket_id(username, bucket_id_bits).to_hex(),
            lookups: vec![
                BASE64.encode(KeyedEngine::lookup(username, Some(password))),
                BASE64.encode(KeyedEngine::lookup(username, None)),
            ],
        }
    }
}

/// Response produced by [`KeyedEngine`], bincode-encoded on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluateResponse {
    pub version: u16,
    /// One evaluation per request lookup, in request order
    pub evaluated: Vec<Vec<u8>>,
    /// The full contents of the requested bucket
    pub bucket_contents: Vec<u8>,
}

/// An entry a client managed to open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedEntry {
    pub kind: MetadataKind,
    pub metadata: Vec<u8>,
}

#[derive(Clone)]
pub struct KeyedEngine {
    secret: EngineSecret,
    bucket_id_bits: u8,
}

impl fmt::Debug for KeyedEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedEngine")
            .field("bucket_id_bits", &self.bucket_id_bits)
            .finish_non_exhaustive()
    }
}

impl KeyedEngine {
    pub fn new(secret: EngineSecret, bucket_id_bits: u8) -> Result<Self, EngineError> {
        if bucket_id_bits == 0 || bucket_id_bits > MAX_BUCKET_ID_BITS {
            return Err(EngineError::Config(format!(
                "bucket id bits must be within 1..={}, got {}",
                MAX_BUCKET_ID_BITS, bucket_id_bits
            )));
        }
        Ok(Self {
            secret,
            bucket_id_bits,
        })
    }

    pub fn bucket_id_bits(&self) -> u8 {
        self.bucket_id_bits
    }

    /// Width of a bucket id in bytes
    pub fn bucket_id_len(&self) -> usize {
        (self.bucket_id_bits as usize).div_ceil(8)
    }

    /// Bucket id derivation, shared with clients
    pub fn derive_bucket_id(username: &[u8], bits: u8) -> BucketId {
        let hash = blake3::derive_key(BUCKET_ID_CONTEXT, username);
        let len = (bits as usize).div_ceil(8);
        let mut id = hash[..len].to_vec();
        let spare = (len * 8) - bits as usize;
        if let Some(last) = id.last_mut() {
            *last &= 0xffu8 << spare;
        }
        BucketId::new(id)
    }

    /// Credential lookup, computed by clients
    pub fn lookup(username: &[u8], password: Option<&[u8]>) -> [u8; LOOKUP_SIZE] {
        let mut hasher = blake3::Hasher::new_derive_key(LOOKUP_CONTEXT);
        hasher.update(&(username.len() as u64).to_be_bytes());
        hasher.update(username);
        match password {
            Some(password) => {
                hasher.update(&[1]);
                hasher.update(&(password.len() as u64).to_be_bytes());
                hasher.update(password);
            }
            None => {
                hasher.update(&[0]);
            }
        }
        *hasher.finalize().as_bytes()
    }

    fn evaluate(&self, lookup: &[u8]) -> [u8; 32] {
        *blake3::keyed_hash(&self.secret.0, lookup).as_bytes()
    }

    fn entry_key(evaluated: &[u8]) -> [u8; 32] {
        blake3::derive_key(ENTRY_KEY_CONTEXT, evaluated)
    }

    fn seal(key: &[u8; 32], plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
        let nonce_source = blake3::keyed_hash(key, plaintext);
        let nonce = Nonce::from_slice(&nonce_source.as_bytes()[..NONCE_SIZE]);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| EngineError::Encryption(e.to_string()))?;

        let mut body = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        body.extend_from_slice(nonce);
        body.extend_from_slice(&ciphertext);
        frame(&body).map_err(|e| EngineError::Encryption(e.to_string()))
    }

    /// Open every entry in `bucket` sealed for the credential behind `evaluated`
    ///
    /// Entries sealed for other credentials fail authentication and
    ///  are skipped.
    pub fn open_bucket(evaluated: &[u8], bucket: &[u8]) -> Result<Vec<OpenedEntry>, EngineError> {
        let key = Self::entry_key(evaluated);
        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key));
        let entries =
            split_entries(bucket).map_err(|e| EngineError::Serialization(e.to_string()))?;

        let mut opened = Vec::new();
        for body in entries {
            if body.len() < NONCE_SIZE {
                continue;
            }
            let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
            let Ok(plaintext) = cipher.decrypt(Nonce::from_slice(nonce), ciphertext) else {
                continue;
            };
            let Some((&tag, metadata)) = plaintext.split_first() else {
                continue;
            };
            if let Some(kind) = MetadataKind::from_byte(tag) {
                opened.push(OpenedEntry {
                    kind,
                    metadata: metadata.to_vec(),
                });
            }
        }
        Ok(opened)
    }

    fn parse_request(&self, body: &[u8]) -> Result<(BucketId, Vec<Vec<u8>>), EngineError> {
        let request: EvaluateRequest = serde_json::from_slice(body)
            .map_err(|e| EngineError::MalformedRequest(e.to_string()))?;

        if request.version != PROTOCOL_VERSION {
            return Err(EngineError::MalformedRequest(format!(
                "unsupported version {}",
                request.version
            )));
        }

        let bucket_id = BucketId::from_hex(&request.bucket_id)
            .map_err(|e| EngineError::MalformedRequest(e.to_string()))?;
        if bucket_id.len() != self.bucket_id_len() {
            return Err(EngineError::MalformedRequest(format!(
                "bucket id must be {} bytes, got {}",
                self.bucket_id_len(),
                bucket_id.len()
            )));
        }

        if request.lookups.is_empty() || request.lookups.len() > MAX_LOOKUPS {
            return Err(EngineError::MalformedRequest(format!(
                "expected between 1 and {} lookups, got {}",
                MAX_LOOKUPS,
                request.lookups.len()
            )));
        }

        let lookups = request
            .lookups
            .iter()
            .map(|encoded| {
                let lookup = BASE64
                    .decode(encoded)
                    .map_err(|e| EngineError::MalformedRequest(e.to_string()))?;
                if lookup.len() != LOOKUP_SIZE {
                    return Err(EngineError::MalformedRequest(format!(
                        "lookup must be {} bytes, got {}",
                        LOOKUP_SIZE,
                        lookup.len()
                    )));
                }
                Ok(lookup)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok((bucket_id, lookups))
    }
}

#[async_trait]
impl ProtocolEngine for KeyedEngine {
    fn bucket_id(&self, username: &[u8]) -> BucketId {
        Self::derive_bucket_id(username, self.bucket_id_bits)
    }

    fn encrypt_entry(
        &self,
        username: &[u8],
        password: Option<&[u8]>,
        kind: MetadataKind,
        metadata: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let evaluated = self.evaluate(&Self::lookup(username, password));
        let key = Self::entry_key(&evaluated);

        let mut plaintext = Vec::with_capacity(1 + metadata.len());
        plaintext.push(kind.as_byte());
        plaintext.extend_from_slice(metadata);

        Self::seal(&key, &plaintext)
    }

    fn config(&self) -> serde_json::Value {
        serde_json::json!({
            "engine": "keyed",
            "version": PROTOCOL_VERSION,
            "bucket_id_bit_size": self.bucket_id_bits,
            "max_lookups": MAX_LOOKUPS,
            "metadata_kinds": {
                "breached_password": MetadataKind::BreachedPassword.as_byte(),
                "breached_username": MetadataKind::BreachedUsername.as_byte(),
                "similar_password": MetadataKind::SimilarPassword.as_byte(),
            },
        })
    }

    async fn handle_request(
        &self,
        body: &[u8],
        store: &dyn BucketAccess,
    ) -> Result<Vec<u8>, EngineError> {
        let (bucket_id, lookups) = self.parse_request(body)?;

        let evaluated = lookups
            .iter()
            .map(|lookup| self.evaluate(lookup).to_vec())
            .collect();
        let bucket_contents = store
            .get_bucket(&bucket_id)
            .await
            .map_err(EngineError::Store)?;

        tracing::debug!(
            bucket_id = %bucket_id,
            bucket_len = bucket_contents.len(),
            "evaluated request"
        );

        let response = EvaluateResponse {
            version: PROTOCOL_VERSION,
            evaluated,
            bucket_contents,
        };
        bincode::serialize(&response).map_err(|e| EngineError::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bucket_store::{BucketStore, MemoryBucketStore};

    fn engine() -> KeyedEngine {
        KeyedEngine::new(EngineSecret::from([7u8; SECRET_SIZE]), DEFAULT_BUCKET_ID_BITS).unwrap()
    }

    #[test]
    fn test_bucket_id_width_and_mask() {
        let id = KeyedEngine::derive_bucket_id(b"alice", 20);
        assert_eq!(id.len(), 3);
        assert_eq!(id.as_bytes()[2] & 0x0f, 0);

        let id = KeyedEngine::derive_bucket_id(b"alice", 16);
        assert_eq!(id.len(), 2);
        assert_eq!(engine().bucket_id(b"alice"), engine().bucket_id(b"alice"));
    }

    #[test]
    fn test_rejects_bad_bucket_id_bits() {
        let secret = EngineSecret::from([1u8; SECRET_SIZE]);
        assert!(KeyedEngine::new(secret.clone(), 0).is_err());
        assert!(KeyedEngine::new(secret, 65).is_err());
    }

    #[test]
    fn test_secret_hex() {
        let secret = EngineSecret::generate();
        assert_eq!(EngineSecret::from_hex(&secret.to_hex()).unwrap(), secret);
        assert!(EngineSecret::from_hex("abcd").is_err());
        assert!(EngineSecret::from_hex("not hex").is_err());
    }

    #[test]
    fn test_encryption_is_deterministic() {
        let engine = engine();
        let a = engine
            .encrypt_entry(b"alice", Some(b"hunter2"), MetadataKind::BreachedPassword, b"")
            .unwrap();
        let b = engine
            .encrypt_entry(b"alice", Some(b"hunter2"), MetadataKind::BreachedPassword, b"")
            .unwrap();
        let c = engine
            .encrypt_entry(b"alice", Some(b"hunter3"), MetadataKind::BreachedPassword, b"")
            .unwrap();
        let d = engine
            .encrypt_entry(b"alice", None, MetadataKind::BreachedUsername, b"")
            .unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, d);
    }

    #[tokio::test]
    async fn test_request_response_opens_matching_entries() {
        let engine = engine();
        let store = MemoryBucketStore::default();
        let id = engine.bucket_id(b"alice");

        for (password, kind) in [
            (Some(&b"hunter2"[..]), MetadataKind::BreachedPassword),
            (None, MetadataKind::BreachedUsername),
            (Some(&b"hunter3"[..]), MetadataKind::SimilarPassword),
        ] {
            let entry = engine
                .encrypt_entry(b"alice", password, kind, b"combo-2019")
                .unwrap();
            store.append(&id, &entry).await.unwrap();
        }

        let request = EvaluateRequest::for_credential(b"alice", b"hunter2", DEFAULT_BUCKET_ID_BITS);
        let body = serde_json::to_vec(&request).unwrap();
        let raw = engine.handle_request(&body, &store).await.unwrap();
        let response: EvaluateResponse = bincode::deserialize(&raw).unwrap();

        assert_eq!(response.evaluated.len(), 2);
        assert_eq!(response.bucket_contents, store.get(&id).await.unwrap());

        let exact = KeyedEngine::open_bucket(&response.evaluated[0], &response.bucket_contents)
            .unwrap();
        assert_eq!(
            exact,
            vec![OpenedEntry {
                kind: MetadataKind::BreachedPassword,
                metadata: b"combo-2019".to_vec(),
            }]
        );

        let username_only =
            KeyedEngine::open_bucket(&response.evaluated[1], &response.bucket_contents).unwrap();
        assert_eq!(username_only.len(), 1);
        assert_eq!(username_only[0].kind, MetadataKind::BreachedUsername);
    }

    #[tokio::test]
    async fn test_malformed_requests() {
        let engine = engine();
        let store = MemoryBucketStore::default();

        let err = engine.handle_request(b"not json", &store).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedRequest(_)));

        let mut request = EvaluateRequest::for_credential(b"bob", b"pw", DEFAULT_BUCKET_ID_BITS);
        request.bucket_id = "00".to_string();
        let body = serde_json::to_vec(&request).unwrap();
        let err = engine.handle_request(&body, &store).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedRequest(_)));

        let mut request = EvaluateRequest::for_credential(b"bob", b"pw", DEFAULT_BUCKET_ID_BITS);
        request.version = 9;
        let body = serde_json::to_vec(&request).unwrap();
        let err = engine.handle_request(&body, &store).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedRequest(_)));

        let mut request = EvaluateRequest::for_credential(b"bob", b"pw", DEFAULT_BUCKET_ID_BITS);
        request.lookups = vec![BASE64.encode(b"short")];
        let body = serde_json::to_vec(&request).unwrap();
        let err = engine.handle_request(&body, &store).await.unwrap_err();
        assert!(matches!(err, EngineError::MalformedRequest(_)));
    }
}
