use std::fmt;

use serde::Serialize;

/// Build metadata captured by `build.rs` at compile time.
#[derive(Debug, Clone, Serialize)]
pub struct BuildInfo {
    pub version: &'static str,
    pub build_profile: &'static str,
    pub build_timestamp: &'static str,
    pub package_version: &'static str,
}

impl fmt::Display for BuildInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "leakcheck {} ({}, built {} [{}])",
            self.package_version, self.version, self.build_timestamp, self.build_profile
        )
    }
}

pub fn build_info() -> BuildInfo {
    BuildInfo {
        version: env!("REPO_VERSION"),
        build_profile: env!("BUILD_PROFILE"),
        build_timestamp: env!("BUILD_TIMESTAMP"),
        package_version: env!("CARGO_PKG_VERSION"),
    }
}
