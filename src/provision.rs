//! Idempotent GraalVM provisioning.
//!
//! `ensure` returns the installed toolchain when one is already present and
//! otherwise downloads the platform archive, unpacks it into a staging
//! directory, moves the finished tree into the install directory, removes
//! the archive, and resolves the result again.
//!
//! Downloads are not resumable. A failed fetch may leave a truncated
//! `graalvm-download.<ext>` behind; the next attempt truncates and rewrites
//! it from the start.

use std::fmt::Display;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::archive;
use crate::error::{Result, ToolchainError};
use crate::output;
use crate::platform::{self, Os, PlatformTag};
use crate::toolchain::{self, InstalledToolchain, PRODUCT_MARKER, ToolchainVersion};

/// GraalVM Community release archives on GitHub.
pub const DEFAULT_URL_TEMPLATE: &str = "https://github.com/graalvm/graalvm-ce-builds/releases/download/jdk-{semver}/graalvm-community-jdk-{semver}_{platform}_bin.{ext}";

/// User-Agent header sent with download requests.
const USER_AGENT: &str = concat!("graal-native-lib/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Fetching
// ---------------------------------------------------------------------------

/// Streams a remote archive into a local file.
pub trait ArchiveFetcher {
    /// Writes the body at `url` to `dest`, replacing any existing file.
    /// Returns the number of bytes written.
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// HTTP(S) fetcher backed by reqwest on a current-thread runtime.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    timeout: Option<Duration>,
}

impl HttpFetcher {
    /// Without a timeout the transport defaults apply.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

fn download_error(url: &str, reason: impl Display) -> ToolchainError {
    ToolchainError::Download {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| download_error(url, format!("failed to build HTTP client: {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| download_error(url, format!("failed to start runtime: {e}")))?;

        runtime.block_on(async move {
            let mut response = client
                .get(url)
                .send()
                .await
                .map_err(|e| download_error(url, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(download_error(url, format!("HTTP {status}")));
            }

            // `create` truncates, so a stale partial archive is never appended to.
            let mut file = std::fs::File::create(dest).map_err(|e| ToolchainError::io(dest, e))?;
            let mut written: u64 = 0;
            while let Some(chunk) = response
                .chunk()
                .await
                .map_err(|e| download_error(url, e))?
            {
                file.write_all(&chunk)
                    .map_err(|e| ToolchainError::io(dest, e))?;
                written += chunk.len() as u64;
            }
            file.flush().map_err(|e| ToolchainError::io(dest, e))?;
            Ok::<u64, ToolchainError>(written)
        })
    }
}

// ---------------------------------------------------------------------------
// URL templates
// ---------------------------------------------------------------------------

/// Fills a download URL template.
///
/// Placeholders: `{semver}`, `{major}`, `{os}`, `{arch}`, `{platform}`
/// (`<os>-<arch>`), `{ext}`. Anything else in braces is rejected rather than
/// sent to the server verbatim.
pub fn render_url(
    template: &str,
    version: &ToolchainVersion,
    platform: PlatformTag,
    ext: &str,
) -> Result<String> {
    let invalid = |reason: String| ToolchainError::InvalidUrlTemplate {
        template: template.to_string(),
        reason,
    };

    let mut url = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        url.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after
            .find('}')
            .ok_or_else(|| invalid(format!("unterminated placeholder at '{}'", &rest[open..])))?;
        let name = &after[..close];
        match name {
            "semver" => url.push_str(version.semver()),
            "major" => url.push_str(version.major()),
            "os" => url.push_str(platform.os.as_str()),
            "arch" => url.push_str(platform.arch.as_str()),
            "platform" => url.push_str(&platform.to_string()),
            "ext" => url.push_str(ext),
            other => return Err(invalid(format!("unknown placeholder '{{{other}}}'"))),
        }
        rest = &after[close + 1..];
    }
    url.push_str(rest);
    Ok(url)
}

/// Transient download location inside the install directory.
pub fn temp_archive_path(install_dir: &Path, os: Os) -> PathBuf {
    install_dir.join(format!(
        "{PRODUCT_MARKER}-download.{}",
        platform::archive_extension(os)
    ))
}

/// Scratch directory archives are unpacked into. The name never matches the
/// toolchain lookup, so a half-extracted tree is never reported as installed.
pub fn staging_dir_path(install_dir: &Path) -> PathBuf {
    install_dir.join(".download-staging")
}

// ---------------------------------------------------------------------------
// Staged extraction
// ---------------------------------------------------------------------------

/// Removes a file or directory tree. A missing path is not an error.
fn remove_if_present(path: &Path) -> Result<()> {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(ToolchainError::io(path, e)),
    };
    let removed = if metadata.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    removed.map_err(|e| ToolchainError::io(path, e))
}

/// Extracts `archive_path` into `staging`, then moves its top-level entries
/// into `install_dir`. Nothing lands in `install_dir` unless extraction
/// finished.
fn unpack_staged(archive_path: &Path, staging: &Path, install_dir: &Path) -> Result<()> {
    // Left over from an interrupted run.
    remove_if_present(staging)?;
    std::fs::create_dir_all(staging).map_err(|e| ToolchainError::io(staging, e))?;

    archive::extract(archive_path, staging)?;

    let mut entries = Vec::new();
    for entry in std::fs::read_dir(staging).map_err(|e| ToolchainError::io(staging, e))? {
        entries.push(entry.map_err(|e| ToolchainError::io(staging, e))?.file_name());
    }
    for name in entries {
        let dest = install_dir.join(&name);
        remove_if_present(&dest)?;
        std::fs::rename(staging.join(&name), &dest).map_err(|e| ToolchainError::io(&dest, e))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Provisioning
// ---------------------------------------------------------------------------

pub struct Provisioner<F = HttpFetcher> {
    platform: PlatformTag,
    fetcher: F,
}

impl Provisioner<HttpFetcher> {
    /// Provisioner for the running host, downloading over HTTP.
    pub fn for_host(timeout: Option<Duration>) -> Result<Self> {
        Ok(Self::new(platform::identify()?, HttpFetcher::new(timeout)))
    }
}

impl<F: ArchiveFetcher> Provisioner<F> {
    pub fn new(platform: PlatformTag, fetcher: F) -> Self {
        Self { platform, fetcher }
    }

    /// Makes sure `version` is installed under `install_dir` and returns it.
    ///
    /// An existing installation is returned without touching the network.
    pub fn ensure(
        &self,
        install_dir: &Path,
        version: &ToolchainVersion,
        url_template: &str,
    ) -> Result<InstalledToolchain> {
        if let Some(existing) = toolchain::locate(install_dir, version, self.platform)? {
            output::note(&format!(
                "GraalVM {version} already installed at {}",
                existing.home.display()
            ));
            return Ok(existing);
        }

        std::fs::create_dir_all(install_dir).map_err(|e| ToolchainError::io(install_dir, e))?;

        let ext = platform::archive_extension(self.platform.os);
        let url = render_url(url_template, version, self.platform, ext)?;
        let temp = temp_archive_path(install_dir, self.platform.os);

        output::action("Downloading", &format!("GraalVM {version} from {url}"));
        let bytes = self.fetcher.fetch(&url, &temp)?;
        output::verbose(&format!("wrote {bytes} bytes to {}", temp.display()));

        output::action("Extracting", &temp.display().to_string());
        let staging = staging_dir_path(install_dir);
        let unpacked = unpack_staged(&temp, &staging, install_dir);
        if let Err(e) = std::fs::remove_file(&temp) {
            output::warn(&format!(
                "failed to delete temporary archive {}: {e}",
                temp.display()
            ));
        }
        if let Err(e) = remove_if_present(&staging) {
            output::warn(&format!(
                "failed to delete staging directory {}: {e}",
                staging.display()
            ));
        }
        unpacked?;

        let installed = toolchain::locate(install_dir, version, self.platform)?.ok_or_else(|| {
            ToolchainError::ToolchainNotFoundAfterInstall {
                install_dir: install_dir.to_path_buf(),
            }
        })?;
        output::success(
            "Installed",
            &format!("GraalVM {version} to {}", installed.home.display()),
        );
        Ok(installed)
    }
}

/// [`Provisioner::ensure`] for the running host, downloading over HTTP.
pub fn ensure(
    install_dir: &Path,
    version: &ToolchainVersion,
    url_template: &str,
    timeout: Option<Duration>,
) -> Result<InstalledToolchain> {
    Provisioner::for_host(timeout)?.ensure(install_dir, version, url_template)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
