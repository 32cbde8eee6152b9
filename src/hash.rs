//! Content hashing and atomic filesystem primitives (spec component C4).

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;
use uuid::Uuid;

/// Stream a file through SHA-256 and return uppercase hex, matching the
/// digest form recorded in `ReplicaRecord::sha256` (spec §3, §8 scenario 1).
pub fn hash_file(path: &Path) -> Result<String> {
    let mut file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    hash_reader(&mut file)
}

/// Hash an in-memory buffer the same way `hash_file` does, used by the
/// write coordinator's staged-file integrity gate.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode_upper(hasher.finalize())
}

fn hash_reader<R: Read>(reader: &mut R) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode_upper(hasher.finalize()))
}

/// A 32-hex-character unique suffix for temp/backup file names (spec §6).
pub fn unique_suffix() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Copy `reader` (rewound to the start by the caller) into `dest`, replacing
/// any existing file at `dest`, returning the number of bytes written and
/// the SHA-256 of what was written. Staging path for Phase 1 of the write
/// coordinator (spec §4.8): `dest` is expected to be a `.2pc` temp path.
pub fn stage_stream<R: Read>(reader: &mut R, dest: &Path) -> Result<(u64, String)> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent dir for {}", dest.display()))?;
    }

    let mut hasher = Sha256::new();
    let mut file = File::create(dest).with_context(|| format!("creating {}", dest.display()))?;
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0u64;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        file.write_all(&buf[..n])?;
        total += n as u64;
    }
    file.sync_all().ok();
    Ok((total, hex::encode_upper(hasher.finalize())))
}

/// Rewind a seekable stream to offset 0, required before each re-read when
/// duplication level > 1 (spec §4.8 step 3, §9 open question).
pub fn rewind<S: Seek>(stream: &mut S) -> io::Result<()> {
    stream.seek(SeekFrom::Start(0)).map(|_| ())
}

/// Atomically replace `final_path`'s content with `temp_path`'s (spec §4.4).
///
/// If `final_path` exists, perform an OS-level replace that swaps the two
/// atomically via a backup path, then delete the backup. If the OS replace
/// fails, fall back to delete-then-move. If `final_path` doesn't exist yet,
/// a plain rename suffices.
pub fn atomic_replace(temp_path: &Path, final_path: &Path) -> Result<()> {
    if let Some(parent) = final_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating parent dir for {}", final_path.display()))?;
    }

    if !final_path.exists() {
        fs::rename(temp_path, final_path)
            .with_context(|| format!("renaming {} to {}", temp_path.display(), final_path.display()))?;
        return Ok(());
    }

    let backup_path = final_path.with_file_name(format!(
        "{}.bak_{}",
        final_path.file_name().and_then(|n| n.to_str()).unwrap_or("final"),
        unique_suffix()
    ));

    match os_replace(temp_path, final_path, &backup_path) {
        Ok(()) => {
            let _ = fs::remove_file(&backup_path);
            Ok(())
        }
        Err(_) => {
            fs::remove_file(final_path)
                .with_context(|| format!("removing stale {}", final_path.display()))?;
            fs::rename(temp_path, final_path).with_context(|| {
                format!("renaming {} to {} after fallback delete", temp_path.display(), final_path.display())
            })?;
            Ok(())
        }
    }
}

#[cfg(unix)]
fn os_replace(temp_path: &Path, final_path: &Path, backup_path: &Path) -> io::Result<()> {
    // POSIX rename(2) is already an atomic replace; the backup path is
    // unused on this platform but kept for API symmetry with Windows'
    // ReplaceFile, which requires one.
    let _ = backup_path;
    fs::rename(temp_path, final_path)
}

#[cfg(windows)]
fn os_replace(temp_path: &Path, final_path: &Path, backup_path: &Path) -> io::Result<()> {
    // Windows rename fails if the destination exists; go through a rename
    // of the existing file to a backup path, then promote the temp file.
    fs::rename(final_path, backup_path)?;
    match fs::rename(temp_path, final_path) {
        Ok(()) => Ok(()),
        Err(e) => {
            let _ = fs::rename(backup_path, final_path);
            Err(e)
        }
    }
}

/// Safe copy with replace-on-conflict (spec §4.4): copy to a uniquely-named
/// temp file beside `dst`, delete any existing `dst`, rename temp into place.
pub fn copy_with_replace(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).with_context(|| format!("creating parent dir for {}", dst.display()))?;
    }

    let temp_path = dst.with_file_name(format!(
        "{}.{}.tmp",
        dst.file_name().and_then(|n| n.to_str()).unwrap_or("file"),
        unique_suffix()
    ));

    fs::copy(src, &temp_path)
        .with_context(|| format!("copying {} to {}", src.display(), temp_path.display()))?;

    if dst.exists() {
        fs::remove_file(dst).with_context(|| format!("removing existing {}", dst.display()))?;
    }

    fs::rename(&temp_path, dst)
        .with_context(|| format!("renaming {} to {}", temp_path.display(), dst.display()))?;

    Ok(())
}

/// Delete a file if present; swallow "not found" (used to clean up `.2pc`
/// staging temporaries on Phase-1 failure, per spec §4.8 step 4).
pub fn remove_if_exists(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != io::ErrorKind::NotFound {
            log::warn!("failed to remove {}: {}", path.display(), e);
        }
    }
}
