use std::path::PathBuf;
use std::time::Duration;

use common::bucket_store::UniquenessScope;
use common::engine::{EngineSecret, DEFAULT_BUCKET_ID_BITS};
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    // http server configuration - separate ports for evaluation and ingestion
    /// Port for the evaluation HTTP server (public, read-only).
    pub evaluate_port: u16,
    /// Port for the API HTTP server (private, ingestion).
    pub api_port: u16,

    // data store configuration
    /// explicit database url, takes precedence over `sqlite_path`
    pub database_url: Option<Url>,
    /// a path to a sqlite database, if neither this nor `database_url`
    ///  is set then an in-memory database will be used
    pub sqlite_path: Option<PathBuf>,
    pub uniqueness_scope: UniquenessScope,

    // engine configuration
    /// the engine secret, if not set then a new secret will be generated
    pub engine_secret: Option<EngineSecret>,
    pub bucket_id_bits: u8,

    // variant generation
    /// external generator for similarity variants
    pub variant_generator: Option<PathBuf>,
    pub variant_generator_timeout: Duration,

    // logging
    pub log_level: tracing::Level,
    /// Directory for log files (optional, logs to stdout only if not set)
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            evaluate_port: 8080,
            api_port: 8081,
            database_url: None,
            sqlite_path: None,
            uniqueness_scope: UniquenessScope::default(),
            engine_secret: None,
            bucket_id_bits: DEFAULT_BUCKET_ID_BITS,
            variant_generator: None,
            variant_generator_timeout: Duration::from_secs(300),
            log_level: tracing::Level::INFO,
            log_dir: None,
        }
    }
}
