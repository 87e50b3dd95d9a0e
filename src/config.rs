//! Build settings supplied by the project driving the native build.
//!
//! Settings live in `graal-native.toml` in the working directory (or a file
//! named with `--config`). Every value can be overridden per invocation on
//! the command line; the toolchain location settings can also come from
//! the environment so CI can share one install directory across projects.
//!
//! Relative paths are resolved against the current directory.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::artifact::{DEFAULT_RUNTIME_MARKER, DependencyPolicy};
use crate::provision::DEFAULT_URL_TEMPLATE;
use crate::toolchain::ToolchainVersion;

/// Config file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = "graal-native.toml";

/// Default toolchain install directory, relative to the current directory.
pub const DEFAULT_INSTALL_DIR: &str = ".toolchain/graalvm";

/// Default GraalVM release.
pub const DEFAULT_VERSION: &str = "25.0.0";

const INSTALL_DIR_ENV_VAR: &str = "GRAAL_NATIVE_INSTALL_DIR";
const VERSION_ENV_VAR: &str = "GRAAL_NATIVE_VERSION";
const URL_TEMPLATE_ENV_VAR: &str = "GRAAL_NATIVE_URL_TEMPLATE";

/// Persisted build settings. Absent fields fall back to defaults at resolve time.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildConfig {
    /// Directory holding the unpacked toolchain.
    pub install_dir: Option<PathBuf>,
    /// Full GraalVM version, e.g. "25.0.0".
    pub version: Option<String>,
    /// Download URL template, see `provision::render_url`.
    pub url_template: Option<String>,
    /// Total download timeout. Unset means the HTTP client defaults.
    pub download_timeout_secs: Option<u64>,
    /// Substring identifying the runtime dependency to put on the classpath.
    pub runtime_marker: Option<String>,
    pub dependency_policy: Option<DependencyPolicy>,
    /// Name passed to `native-image -o`.
    pub output_name: Option<String>,
    /// Directory `native-image` runs in.
    pub working_dir: Option<PathBuf>,
    /// Compiled application archive.
    pub app_archive: Option<PathBuf>,
    /// Resolved runtime dependency artifacts.
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    /// Arguments appended after the fixed `native-image` flags.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl BuildConfig {
    /// Loads the config named on the command line, or `graal-native.toml`
    /// from the current directory.
    ///
    /// An explicitly named file must exist. The implicit file is optional.
    /// Parse errors are always hard failures.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                if !path.is_file() {
                    bail!("config file not found: {}", path.display());
                }
                Self::load_from(path)
            }
            None => Self::load_from(Path::new(CONFIG_FILE_NAME)),
        }
    }

    /// Load config from a specific path. Returns defaults if the file does not exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .with_context(|| format!("failed to parse config file at {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => {
                Err(e).with_context(|| format!("failed to read config file at {}", path.display()))
            }
        }
    }

    /// Install directory: CLI flag, then `GRAAL_NATIVE_INSTALL_DIR`, then
    /// config, then `.toolchain/graalvm`.
    pub fn resolve_install_dir(&self, cli_override: Option<&Path>) -> PathBuf {
        self.resolve_install_dir_with_env(cli_override, std::env::var(INSTALL_DIR_ENV_VAR).ok())
    }

    fn resolve_install_dir_with_env(
        &self,
        cli_override: Option<&Path>,
        env_value: Option<String>,
    ) -> PathBuf {
        let cli = cli_override.map(|p| p.to_string_lossy().into_owned());
        let file = self
            .install_dir
            .as_ref()
            .map(|p| p.to_string_lossy().into_owned());
        non_empty_trimmed(cli)
            .or_else(|| non_empty_trimmed(env_value))
            .or_else(|| non_empty_trimmed(file))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_DIR))
    }

    /// Toolchain version: CLI flag, then `GRAAL_NATIVE_VERSION`, then config,
    /// then the built-in default.
    pub fn resolve_version(&self, cli_override: Option<&str>) -> Result<ToolchainVersion> {
        self.resolve_version_with_env(cli_override, std::env::var(VERSION_ENV_VAR).ok())
    }

    fn resolve_version_with_env(
        &self,
        cli_override: Option<&str>,
        env_value: Option<String>,
    ) -> Result<ToolchainVersion> {
        let raw = non_empty_trimmed(cli_override.map(str::to_string))
            .or_else(|| non_empty_trimmed(env_value))
            .or_else(|| non_empty_trimmed(self.version.clone()))
            .unwrap_or_else(|| DEFAULT_VERSION.to_string());
        Ok(ToolchainVersion::parse(&raw)?)
    }

    /// Download URL template: CLI flag, then `GRAAL_NATIVE_URL_TEMPLATE`,
    /// then config, then the GitHub release URL.
    pub fn resolve_url_template(&self, cli_override: Option<&str>) -> String {
        self.resolve_url_template_with_env(cli_override, std::env::var(URL_TEMPLATE_ENV_VAR).ok())
    }

    fn resolve_url_template_with_env(
        &self,
        cli_override: Option<&str>,
        env_value: Option<String>,
    ) -> String {
        non_empty_trimmed(cli_override.map(str::to_string))
            .or_else(|| non_empty_trimmed(env_value))
            .or_else(|| non_empty_trimmed(self.url_template.clone()))
            .unwrap_or_else(|| DEFAULT_URL_TEMPLATE.to_string())
    }

    pub fn download_timeout(&self) -> Option<Duration> {
        self.download_timeout_secs
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    pub fn resolve_runtime_marker(&self, cli_override: Option<&str>) -> String {
        non_empty_trimmed(cli_override.map(str::to_string))
            .or_else(|| non_empty_trimmed(self.runtime_marker.clone()))
            .unwrap_or_else(|| DEFAULT_RUNTIME_MARKER.to_string())
    }

    pub fn resolve_policy(&self, cli_override: Option<DependencyPolicy>) -> DependencyPolicy {
        cli_override
            .or(self.dependency_policy)
            .unwrap_or_default()
    }

    /// Output name has no default; the caller must name the library.
    pub fn resolve_output_name(&self, cli_override: Option<&str>) -> Result<String> {
        non_empty_trimmed(cli_override.map(str::to_string))
            .or_else(|| non_empty_trimmed(self.output_name.clone()))
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no output name configured; pass --output or set output_name in {CONFIG_FILE_NAME}"
                )
            })
    }

    /// Application archive has no default and must exist on disk.
    pub fn resolve_app_archive(&self, cli_override: Option<&Path>) -> Result<PathBuf> {
        let path = cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.app_archive.clone())
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "no application archive configured; pass --app or set app_archive in {CONFIG_FILE_NAME}"
                )
            })?;
        if !path.is_file() {
            bail!("application archive not found: {}", path.display());
        }
        Ok(path)
    }

    /// Dependencies given on the command line replace the configured list.
    pub fn resolve_dependencies(&self, cli_override: &[PathBuf]) -> Vec<PathBuf> {
        if cli_override.is_empty() {
            self.dependencies.clone()
        } else {
            cli_override.to_vec()
        }
    }

    pub fn resolve_working_dir(&self, cli_override: Option<&Path>) -> PathBuf {
        cli_override
            .map(Path::to_path_buf)
            .or_else(|| self.working_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

/// Return the trimmed value if non-empty after trimming, otherwise `None`.
fn non_empty_trimmed(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
