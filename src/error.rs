//! Error taxonomy for toolchain provisioning and native builds.
//!
//! Every variant is fatal to the operation that produced it. The only
//! non-fatal condition in the crate (failing to delete the temporary
//! download archive) is reported as a warning and never reaches this type.

use std::path::PathBuf;

/// Errors raised while resolving, provisioning, or driving the toolchain.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// Host OS or CPU architecture string matched no known pattern.
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    /// Toolchain version is not a valid semantic version.
    #[error("invalid toolchain version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    /// Download URL template references a placeholder we cannot fill.
    #[error("invalid download URL template '{template}': {reason}")]
    InvalidUrlTemplate { template: String, reason: String },

    /// Archive fetch failed at the transport or HTTP level.
    #[error("failed to download {url}: {reason}")]
    Download { url: String, reason: String },

    /// Archive could not be read or unpacked.
    #[error("failed to extract {}: {reason}", archive.display())]
    Extract { archive: PathBuf, reason: String },

    /// Filesystem operation failed.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Archive was fetched and extracted, but no matching toolchain directory appeared.
    #[error(
        "toolchain not found in {} after install; the archive may be corrupt or use an unexpected layout",
        install_dir.display()
    )]
    ToolchainNotFoundAfterInstall { install_dir: PathBuf },

    /// A build was requested before the toolchain was provisioned.
    #[error(
        "toolchain {version} not found in {}, run provisioning first",
        install_dir.display()
    )]
    ToolchainNotProvisioned { install_dir: PathBuf, version: String },

    /// The toolchain home exists but lacks its executable entry point.
    #[error("native-image not found at {}", path.display())]
    ToolchainEntryPointMissing { path: PathBuf },

    /// No build input matched the required runtime marker.
    #[error("no runtime dependency matching '{marker}' in build inputs")]
    RequiredDependencyMissing { marker: String },

    /// Several build inputs matched the marker and the policy requires exactly one.
    #[error("{} runtime dependencies match '{marker}', expected exactly one", candidates.len())]
    AmbiguousDependency {
        marker: String,
        candidates: Vec<PathBuf>,
    },

    /// A classpath entry cannot be joined with the host path-list separator.
    #[error("cannot build classpath: {0}")]
    InvalidClasspath(String),

    /// The subprocess could not be started at all.
    #[error("failed to execute {}: {source}", program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The native build exited unsuccessfully.
    #[error("native-image failed ({}): {}", exit_label(*status), failure_excerpt(stderr, stdout))]
    NativeBuildFailed {
        status: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

impl ToolchainError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

fn exit_label(status: Option<i32>) -> String {
    match status {
        Some(code) => format!("exit {code}"),
        None => "terminated by signal".to_string(),
    }
}

/// Last non-empty line of stderr, else of stdout. The full streams stay on
/// the variant for callers that want to print them.
fn failure_excerpt<'a>(stderr: &'a str, stdout: &'a str) -> &'a str {
    let last_line = |s: &'a str| s.lines().map(str::trim).filter(|l| !l.is_empty()).last();
    last_line(stderr)
        .or_else(|| last_line(stdout))
        .unwrap_or("no output captured")
}

/// Result type for toolchain operations.
pub type Result<T> = std::result::Result<T, ToolchainError>;
