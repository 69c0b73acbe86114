use std::sync::Arc;

use axum::extract::FromRef;
use url::Url;

use common::engine::{EngineError, EngineSecret, KeyedEngine, ProtocolEngine};
use common::ingest::Inserter;
use common::variants::ScriptGenerator;

use crate::database::{Database, DatabaseSetupError, KvStore};
use crate::service_config::Config;

/// Shared service state handed to every request handler
#[derive(Clone)]
pub struct State {
    database: Database,
    store: KvStore,
    engine: Arc<dyn ProtocolEngine>,
    inserter: Arc<Inserter<KvStore>>,
}

impl State {
    pub async fn from_config(config: &Config) -> Result<Self, StateSetupError> {
        // 1. Setup database
        let database_url = match (&config.database_url, &config.sqlite_path) {
            (Some(url), _) => Ok(url.clone()),
            (None, Some(path)) => {
                // check that the path exists
                if !path.exists() {
                    return Err(StateSetupError::DatabasePathDoesNotExist);
                }
                Url::parse(&format!("sqlite://{}", path.display()))
                    .map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
            // otherwise just set up an in-memory database
            (None, None) => {
                Url::parse("sqlite::memory:").map_err(|_| StateSetupError::InvalidDatabaseUrl)
            }
        }?;
        tracing::info!(url = %database_url, "connecting to database");
        let database = Database::connect(&database_url).await?;
        let store = KvStore::new(database.clone(), config.uniqueness_scope);

        // 2. Setup engine
        let secret = match &config.engine_secret {
            Some(secret) => secret.clone(),
            None => {
                tracing::warn!("no engine secret configured, generating an ephemeral one");
                EngineSecret::generate()
            }
        };
        let engine: Arc<dyn ProtocolEngine> =
            Arc::new(KeyedEngine::new(secret, config.bucket_id_bits)?);

        // 3. Setup insertion pipeline
        let mut inserter = Inserter::new(store.clone(), engine.clone());
        if let Some(program) = &config.variant_generator {
            tracing::info!(program = %program.display(), "using external variant generator");
            inserter = inserter.with_generator(Arc::new(
                ScriptGenerator::new(program).with_timeout(config.variant_generator_timeout),
            ));
        }

        tracing::info!(
            scope = %config.uniqueness_scope,
            bucket_id_bits = config.bucket_id_bits,
            "service state ready"
        );

        Ok(Self {
            database,
            store,
            engine,
            inserter: Arc::new(inserter),
        })
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn ProtocolEngine> {
        &self.engine
    }

    pub fn inserter(&self) -> &Inserter<KvStore> {
        &self.inserter
    }
}

impl FromRef<State> for Database {
    fn from_ref(state: &State) -> Self {
        state.database.clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateSetupError {
    #[error("failed to setup the database: {0}")]
    DatabaseSetupError(#[from] DatabaseSetupError),
    #[error("Database path does not exist")]
    DatabasePathDoesNotExist,
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,
    #[error("failed to setup the protocol engine: {0}")]
    Engine(#[from] EngineError),
}
