pub use clap::Parser;

use std::path::PathBuf;
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "leakcheck")]
#[command(about = "Credential leak-check bucket service")]
#[command(version)]
pub struct Args {
    /// API server to talk to (defaults to the api_port in config, then 8081)
    #[arg(long, global = true)]
    pub remote: Option<Url>,

    /// Path to the leakcheck state directory (defaults to ~/.leakcheck)
    #[arg(long, global = true)]
    pub config_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: crate::Command,
}
