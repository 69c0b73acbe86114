use std::collections::HashSet;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{VariantError, VariantSource};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Variant source backed by an external program
///
/// The program is invoked as `<program> <password> <count>` and must
///  print one candidate per line on stdout. A non-zero exit is a
///  failure; its stderr is carried in the error untouched.
#[derive(Debug, Clone)]
pub struct ScriptGenerator {
    program: PathBuf,
    timeout: Duration,
}

impl ScriptGenerator {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &PathBuf {
        &self.program
    }
}

#[async_trait]
impl VariantSource for ScriptGenerator {
    async fn variants(&self, password: &[u8], count: usize) -> Result<Vec<Vec<u8>>, VariantError> {
        let child = Command::new(&self.program)
            .arg(password_arg(password))
            .arg(count.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| VariantError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| VariantError::TimedOut(self.timeout))?
            .map_err(|source| VariantError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            tracing::error!(
                program = %self.program.display(),
                status = %output.status,
                stderr = %stderr,
                "variant generator failed"
            );
            return Err(VariantError::Failed {
                status: output.status.to_string(),
                stderr,
            });
        }

        let candidates = parse_candidates(&output.stdout);
        tracing::debug!(
            program = %self.program.display(),
            requested = count,
            received = candidates.len(),
            "variant generator finished"
        );
        Ok(candidates)
    }
}

/// Split generator output into distinct candidates
///
/// One candidate per line; a trailing `\r` is dropped, empty lines are
///  discarded and repeats keep their first position.
pub fn parse_candidates(stdout: &[u8]) -> Vec<Vec<u8>> {
    let mut seen = HashSet::new();
    stdout
        .split(|b| *b == b'\n')
        .map(|line| line.strip_suffix(b"\r").unwrap_or(line))
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(line.to_vec()))
        .map(|line| line.to_vec())
        .collect()
}

#[cfg(unix)]
fn password_arg(password: &[u8]) -> OsString {
    use std::os::unix::ffi::OsStrExt;
    std::ffi::OsStr::from_bytes(password).to_os_string()
}

#[cfg(not(unix))]
fn password_arg(password: &[u8]) -> OsString {
    String::from_utf8_lossy(password).into_owned().into()
}
