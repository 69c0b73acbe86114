use async_trait::async_trait;

mod mutator;
mod script;

pub use mutator::RuleMutator;
pub use script::{parse_candidates, ScriptGenerator};

#[derive(Debug, thiserror::Error)]
pub enum VariantError {
    #[error("failed to start variant generator {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("variant generator exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },
    #[error("variant generator did not finish within {0:?}")]
    TimedOut(std::time::Duration),
}

/// Produces near-miss variants of a password
#[async_trait]
pub trait VariantSource: Send + Sync + std::fmt::Debug {
    /// Generate candidate variants of `password`
    ///
    /// # Arguments
    /// * `password` - The breached password to vary
    /// * `count` - How many variants are wanted
    ///
    /// # Returns
    /// * `Ok(Vec<Vec<u8>>)` - Distinct, non-empty candidates
    /// * `Err(VariantError)` - The source could not produce candidates
    async fn variants(&self, password: &[u8], count: usize) -> Result<Vec<Vec<u8>>, VariantError>;
}
