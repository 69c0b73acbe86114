use std::path::PathBuf;

use clap::Args;

use common::bucket_store::UniquenessScope;
use leakcheck_daemon::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Port for the public evaluation server
    #[arg(long)]
    pub evaluate_port: Option<u16>,

    /// Port for the private ingestion API server
    #[arg(long)]
    pub api_port: Option<u16>,

    /// Deduplicate entries per bucket or across all buckets
    #[arg(long, value_parser = parse_scope)]
    pub uniqueness_scope: Option<UniquenessScope>,

    /// Width of bucket identifiers in bits (1-64)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub bucket_id_bits: Option<u8>,

    /// External program producing similarity variants
    #[arg(long)]
    pub variant_generator: Option<PathBuf>,
}

fn parse_scope(s: &str) -> Result<UniquenessScope, String> {
    match s {
        "bucket" => Ok(UniquenessScope::Bucket),
        "global" => Ok(UniquenessScope::Global),
        other => Err(format!("unknown scope '{}', expected bucket or global", other)),
    }
}

impl Init {
    fn config(&self) -> AppConfig {
        let defaults = AppConfig::default();
        AppConfig {
            evaluate_port: self.evaluate_port.unwrap_or(defaults.evaluate_port),
            api_port: self.api_port.unwrap_or(defaults.api_port),
            uniqueness_scope: self.uniqueness_scope.unwrap_or(defaults.uniqueness_scope),
            bucket_id_bits: self.bucket_id_bits.unwrap_or(defaults.bucket_id_bits),
            variant_generator: self.variant_generator.clone(),
            ..defaults
        }
    }
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Init {
    type Error = StateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = AppState::init(ctx.config_path.clone(), Some(self.config()))?;

        Ok(format!(
            "Initialized leakcheck state at {}\n  evaluate_port:    {}\n  api_port:         {}\n  uniqueness_scope: {}\n  bucket_id_bits:   {}",
            state.leakcheck_dir.display(),
            state.config.evaluate_port,
            state.config.api_port,
            state.config.uniqueness_scope,
            state.config.bucket_id_bits,
        ))
    }
}
