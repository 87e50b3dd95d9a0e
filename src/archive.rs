//! Distribution archive extraction.
//!
//! Unpacks the full tree of a `.tar.gz` or `.zip` archive. Unix permission
//! bits recorded in the archive are kept so launchers such as
//! `bin/native-image` stay executable.

use std::fmt::Display;
use std::path::Path;

use crate::error::{Result, ToolchainError};

fn extract_error(archive: &Path, reason: impl Display) -> ToolchainError {
    ToolchainError::Extract {
        archive: archive.to_path_buf(),
        reason: reason.to_string(),
    }
}

/// Unpacks a gzip-compressed tarball into `dest_dir`. Returns the entry count.
fn extract_tar_gz(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file =
        std::fs::File::open(archive_path).map_err(|e| ToolchainError::io(archive_path, e))?;

    let decoder = flate2::read::GzDecoder::new(file);
    let mut archive = tar::Archive::new(decoder);
    archive.set_preserve_permissions(true);

    let mut unpacked = 0;
    let entries = archive
        .entries()
        .map_err(|e| extract_error(archive_path, e))?;
    for entry_result in entries {
        let mut entry = entry_result.map_err(|e| extract_error(archive_path, e))?;
        // `unpack_in` refuses entries that would escape `dest_dir`.
        if entry
            .unpack_in(dest_dir)
            .map_err(|e| extract_error(archive_path, e))?
        {
            unpacked += 1;
        }
    }
    Ok(unpacked)
}

/// Unpacks a zip archive into `dest_dir`. Returns the entry count.
fn extract_zip(archive_path: &Path, dest_dir: &Path) -> Result<usize> {
    let file =
        std::fs::File::open(archive_path).map_err(|e| ToolchainError::io(archive_path, e))?;

    let mut archive = zip::ZipArchive::new(file).map_err(|e| extract_error(archive_path, e))?;
    let entries = archive.len();
    archive
        .extract(dest_dir)
        .map_err(|e| extract_error(archive_path, e))?;
    Ok(entries)
}

/// Extracts a distribution archive into `dest_dir`, choosing the format
/// from the file name. An archive with no entries is an error.
pub fn extract(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let name = archive_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("");

    let unpacked = if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
        extract_tar_gz(archive_path, dest_dir)?
    } else if name.ends_with(".zip") {
        extract_zip(archive_path, dest_dir)?
    } else {
        return Err(extract_error(
            archive_path,
            "unsupported archive format, expected .tar.gz or .zip",
        ));
    };

    if unpacked == 0 {
        return Err(extract_error(archive_path, "archive contains no entries"));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
