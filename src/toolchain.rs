//! Locating an installed GraalVM toolchain.
//!
//! The install directory holds whatever the distribution archive unpacked
//! to, e.g. `graalvm-community-openjdk-25+37.1/`. On macOS the archive is an
//! application bundle, so the usable home sits at
//! `<dir>/Contents/Home`; everywhere else it is the directory itself.
//!
//! Lookups are never cached: each call re-scans the directory.

use std::path::{Path, PathBuf};

use crate::error::{Result, ToolchainError};
use crate::platform::{Os, PlatformTag};

/// Directory names of installed toolchains always contain this marker.
pub const PRODUCT_MARKER: &str = "graalvm";

/// Nested home directory inside a macOS distribution bundle.
const BUNDLE_HOME: [&str; 2] = ["Contents", "Home"];

/// Required toolchain version: the major token used to match install
/// directories, and the full semantic version used in download URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainVersion {
    major: String,
    semver: String,
}

impl ToolchainVersion {
    /// Parses a full semantic version such as `"25.0.0"`.
    pub fn parse(version: &str) -> Result<Self> {
        let trimmed = version.trim();
        let parsed =
            semver::Version::parse(trimmed).map_err(|e| ToolchainError::InvalidVersion {
                version: version.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self {
            major: parsed.major.to_string(),
            semver: trimmed.to_string(),
        })
    }

    pub fn major(&self) -> &str {
        &self.major
    }

    pub fn semver(&self) -> &str {
        &self.semver
    }
}

impl std::fmt::Display for ToolchainVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.semver)
    }
}

/// A usable toolchain home directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledToolchain {
    pub home: PathBuf,
}

impl InstalledToolchain {
    pub fn bin_dir(&self) -> PathBuf {
        self.home.join("bin")
    }
}

/// Finds an installed toolchain for `version` under `install_dir`.
///
/// Returns `Ok(None)` when the directory is missing or holds no matching
/// toolchain. Candidates are visited in name order so the choice is stable
/// when several versions are unpacked side by side.
pub fn locate(
    install_dir: &Path,
    version: &ToolchainVersion,
    platform: PlatformTag,
) -> Result<Option<InstalledToolchain>> {
    let entries = match std::fs::read_dir(install_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ToolchainError::io(install_dir, e)),
    };

    let mut candidates = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| ToolchainError::io(install_dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if matches_version(&name, version) {
            candidates.push((name, path));
        }
    }
    candidates.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(candidates
        .into_iter()
        .next()
        .map(|(_, candidate)| InstalledToolchain {
            home: normalize_home(&candidate, platform),
        }))
}

/// Whether a directory name belongs to the product at the given major version.
pub fn matches_version(dir_name: &str, version: &ToolchainVersion) -> bool {
    dir_name.contains(PRODUCT_MARKER) && dir_name.contains(version.major())
}

/// Resolves the toolchain home for a candidate directory on disk.
pub fn normalize_home(candidate: &Path, platform: PlatformTag) -> PathBuf {
    normalize_home_with(candidate, platform, |p| p.is_dir())
}

/// Layout rule with the directory probe injected.
///
/// macOS distributions nest the home at `Contents/Home`; when that
/// directory exists it is the home. Other platforms use the candidate as is.
pub fn normalize_home_with(
    candidate: &Path,
    platform: PlatformTag,
    is_dir: impl Fn(&Path) -> bool,
) -> PathBuf {
    if platform.os == Os::MacOs {
        let nested: PathBuf = BUNDLE_HOME.iter().fold(candidate.to_path_buf(), |p, c| p.join(c));
        if is_dir(&nested) {
            return nested;
        }
    }
    candidate.to_path_buf()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
