use std::time::Duration;

use clap::Args;
use url::Url;

use leakcheck_daemon::state::{AppState, DATABASE_URL_ENV};
use leakcheck_daemon::{spawn_service, ServiceConfig};

#[derive(Args, Debug, Clone)]
pub struct Daemon {
    /// Override evaluation server port (default from config)
    #[arg(long)]
    pub evaluate_port: Option<u16>,

    /// Override API server port (default from config)
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Directory for log files (logs to stdout only if not set)
    #[arg(long)]
    pub log_dir: Option<std::path::PathBuf>,

    /// Default log level, RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    pub log_level: tracing::Level,
}

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("state error: {0}")]
    StateError(#[from] leakcheck_daemon::state::StateError),

    #[error("invalid LEAKCHECK_DATABASE_URL: {0}")]
    InvalidDatabaseUrl(url::ParseError),

    #[error("daemon failed: {0}")]
    Failed(#[from] leakcheck_daemon::ServiceError),
}

fn database_url_override() -> Result<Option<Url>, DaemonError> {
    match std::env::var(DATABASE_URL_ENV) {
        Ok(raw) if !raw.trim().is_empty() => Url::parse(raw.trim())
            .map(Some)
            .map_err(DaemonError::InvalidDatabaseUrl),
        _ => Ok(None),
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Daemon {
    type Error = DaemonError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::load(ctx.config_path.clone())?;
        let engine_secret = state.load_secret()?;

        let config = ServiceConfig {
            evaluate_port: self.evaluate_port.unwrap_or(state.config.evaluate_port),
            api_port: self.api_port.unwrap_or(state.config.api_port),
            database_url: database_url_override()?,
            sqlite_path: Some(state.db_path),
            uniqueness_scope: state.config.uniqueness_scope,
            engine_secret: Some(engine_secret),
            bucket_id_bits: state.config.bucket_id_bits,
            variant_generator: state.config.variant_generator.clone(),
            variant_generator_timeout: Duration::from_secs(
                state.config.variant_generator_timeout_secs,
            ),
            log_level: self.log_level,
            log_dir: self.log_dir.clone(),
        };

        spawn_service(&config).await?;
        Ok("daemon ended".to_string())
    }
}
