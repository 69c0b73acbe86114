use std::{fs, path::PathBuf};

use common::bucket_store::UniquenessScope;
use common::engine::{EngineSecret, DEFAULT_BUCKET_ID_BITS};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "leakcheck";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const KEY_FILE_NAME: &str = "engine.key";

/// Overrides the database location in the state directory
pub const DATABASE_URL_ENV: &str = "LEAKCHECK_DATABASE_URL";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Port for the public evaluation server
    #[serde(default = "default_evaluate_port")]
    pub evaluate_port: u16,
    /// Port for the private ingestion API server
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Which records count as duplicates
    #[serde(default)]
    pub uniqueness_scope: UniquenessScope,
    /// Width of bucket identifiers in bits
    #[serde(default = "default_bucket_id_bits")]
    pub bucket_id_bits: u8,
    /// External program producing similarity variants (optional)
    #[serde(default)]
    pub variant_generator: Option<PathBuf>,
    /// Seconds the external generator may run per record
    #[serde(default = "default_variant_generator_timeout_secs")]
    pub variant_generator_timeout_secs: u64,
}

fn default_evaluate_port() -> u16 {
    8080
}

fn default_api_port() -> u16 {
    8081
}

fn default_bucket_id_bits() -> u8 {
    DEFAULT_BUCKET_ID_BITS
}

fn default_variant_generator_timeout_secs() -> u64 {
    300
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            evaluate_port: default_evaluate_port(),
            api_port: default_api_port(),
            uniqueness_scope: UniquenessScope::default(),
            bucket_id_bits: default_bucket_id_bits(),
            variant_generator: None,
            variant_generator_timeout_secs: default_variant_generator_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.leakcheck)
    pub leakcheck_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the hex-encoded engine secret
    pub key_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.leakcheck)
    pub fn leakcheck_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory
    pub fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
    ) -> Result<Self, StateError> {
        let leakcheck_dir = Self::leakcheck_dir(custom_path)?;

        if leakcheck_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&leakcheck_dir)?;

        let secret = EngineSecret::generate();
        let key_path = leakcheck_dir.join(KEY_FILE_NAME);
        fs::write(&key_path, secret.to_hex())?;

        let config = config.unwrap_or_default();
        let config_path = leakcheck_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // the service creates the schema on first start
        let db_path = leakcheck_dir.join(DB_FILE_NAME);
        fs::write(&db_path, "")?;

        Ok(Self {
            leakcheck_dir,
            db_path,
            key_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let leakcheck_dir = Self::leakcheck_dir(custom_path)?;

        if !leakcheck_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = leakcheck_dir.join(DB_FILE_NAME);
        let key_path = leakcheck_dir.join(KEY_FILE_NAME);
        let config_path = leakcheck_dir.join(CONFIG_FILE_NAME);

        if !db_path.exists() {
            return Err(StateError::MissingFile(DB_FILE_NAME.to_string()));
        }
        if !key_path.exists() {
            return Err(StateError::MissingFile(KEY_FILE_NAME.to_string()));
        }
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            leakcheck_dir,
            db_path,
            key_path,
            config_path,
            config,
        })
    }

    /// Load the engine secret from the key file
    pub fn load_secret(&self) -> Result<EngineSecret, StateError> {
        let hex = fs::read_to_string(&self.key_path)?;
        EngineSecret::from_hex(&hex).map_err(|e| StateError::InvalidKey(e.to_string()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("leakcheck directory not initialized. Run 'leakcheck init' first")]
    NotInitialized,

    #[error("leakcheck directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
