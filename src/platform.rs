//! Host platform identification.
//!
//! Maps host OS and CPU architecture strings onto the small set of
//! platforms GraalVM publishes distributions for, plus the per-OS file
//! conventions (archive format, launcher suffix, shared library extension).

use std::fmt;

use crate::error::{Result, ToolchainError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    MacOs,
    Windows,
    Linux,
}

impl Os {
    pub fn as_str(self) -> &'static str {
        match self {
            Os::MacOs => "macos",
            Os::Windows => "windows",
            Os::Linux => "linux",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    Aarch64,
    X64,
}

impl Arch {
    pub fn as_str(self) -> &'static str {
        match self {
            Arch::Aarch64 => "aarch64",
            Arch::X64 => "x64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical platform of the running host, e.g. `macos-aarch64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlatformTag {
    pub os: Os,
    pub arch: Arch,
}

impl PlatformTag {
    pub fn new(os: Os, arch: Arch) -> Self {
        Self { os, arch }
    }
}

impl fmt::Display for PlatformTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.os, self.arch)
    }
}

/// Identifies the platform this process is running on.
pub fn identify() -> Result<PlatformTag> {
    identify_from(std::env::consts::OS, std::env::consts::ARCH)
}

/// Identifies a platform from host-reported OS and architecture strings.
///
/// Matching is case-insensitive and substring based, so both
/// `"Mac OS X"`/`"aarch64"` and `"darwin"`/`"arm64"` resolve to
/// `macos-aarch64`.
pub fn identify_from(os: &str, arch: &str) -> Result<PlatformTag> {
    Ok(PlatformTag::new(parse_os(os)?, parse_arch(arch)?))
}

/// Parses an OS string. `darwin` contains `win`, so macOS is checked first.
pub fn parse_os(os: &str) -> Result<Os> {
    let lower = os.to_lowercase();
    if lower.contains("mac") || lower.contains("darwin") {
        Ok(Os::MacOs)
    } else if lower.contains("win") {
        Ok(Os::Windows)
    } else if lower.contains("linux") {
        Ok(Os::Linux)
    } else {
        Err(ToolchainError::UnsupportedPlatform(format!("OS '{os}'")))
    }
}

pub fn parse_arch(arch: &str) -> Result<Arch> {
    let lower = arch.to_lowercase();
    if lower.contains("aarch64") || lower.contains("arm64") {
        Ok(Arch::Aarch64)
    } else if lower.contains("x86_64") || lower.contains("amd64") {
        Ok(Arch::X64)
    } else {
        Err(ToolchainError::UnsupportedPlatform(format!(
            "architecture '{arch}'"
        )))
    }
}

/// Distribution archive format: `zip` on Windows, `tar.gz` elsewhere.
pub fn archive_extension(os: Os) -> &'static str {
    match os {
        Os::Windows => "zip",
        Os::MacOs | Os::Linux => "tar.gz",
    }
}

/// Launcher suffix for toolchain executables: `.cmd` on Windows.
pub fn executable_suffix(os: Os) -> &'static str {
    match os {
        Os::Windows => ".cmd",
        Os::MacOs | Os::Linux => "",
    }
}

/// Extension `native-image --shared` gives the produced library.
pub fn shared_library_extension(os: Os) -> &'static str {
    match os {
        Os::MacOs => "dylib",
        Os::Windows => "dll",
        Os::Linux => "so",
    }
}

/// [`archive_extension`] for a raw OS string.
pub fn archive_extension_for(os: &str) -> Result<&'static str> {
    parse_os(os).map(archive_extension)
}

/// [`executable_suffix`] for a raw OS string.
pub fn executable_suffix_for(os: &str) -> Result<&'static str> {
    parse_os(os).map(executable_suffix)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
