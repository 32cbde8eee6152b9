//! Relative-path sanitization (spec component C1).
//!
//! The sanitized form is the sole key shape used everywhere downstream: by
//! the rule resolver, the metadata index, and every drive-local path join.
//! Separators are normalized to the host separator; leading separators are
//! stripped; any `..` segment is rejected outright rather than silently
//! resolved, since a resolved `..` could escape a drive root.

use crate::error::StorageError;
use std::path::{Path, PathBuf};

/// Normalize a caller-supplied relative path and reject anything unsafe.
///
/// Accepts either `/` or `\` as a separator in the input, normalizes to the
/// host separator, and returns the sanitized string form (not a `PathBuf`,
/// since the sanitized string is also the index key in C5).
pub fn sanitize_relpath(input: &str) -> Result<String, StorageError> {
    let replaced = input.replace('\\', "/");
    let trimmed = replaced.trim_start_matches('/');

    if trimmed.is_empty() {
        return Err(StorageError::InvalidPath(input.to_string()));
    }

    let mut segments = Vec::new();
    for segment in trimmed.split('/') {
        if segment.is_empty() || segment == "." {
            continue;
        }
        if segment == ".." {
            return Err(StorageError::InvalidPath(input.to_string()));
        }
        segments.push(segment);
    }

    if segments.is_empty() {
        return Err(StorageError::InvalidPath(input.to_string()));
    }

    let sep = std::path::MAIN_SEPARATOR;
    Ok(segments.join(&sep.to_string()))
}

/// Join a sanitized relative path onto a drive root.
pub fn join_on_drive(drive_root: &Path, sanitized_relpath: &str) -> PathBuf {
    drive_root.join(sanitized_relpath)
}

/// Split a sanitized relative path into its `/`-normalized segments, used by
/// the glob matcher (which matches independently of host separator).
pub fn to_glob_segments(sanitized_relpath: &str) -> Vec<&str> {
    sanitized_relpath
        .split(std::path::MAIN_SEPARATOR)
        .filter(|s| !s.is_empty())
        .collect()
}
