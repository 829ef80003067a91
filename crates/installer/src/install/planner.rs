//! Moving classified files into a mod folder
//!
//! Existing files are never overwritten. A colliding name gets a numeric
//! suffix before the extension (`name_1.ext`, `name_2.ext`, ...). The name is
//! reserved with an exclusive create before the move, so concurrent installs
//! into the same folder cannot pick the same target.

use std::fs::OpenOptions;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Give up looking for a free name after this many suffixes
const MAX_SUFFIX: u32 = 10_000;

/// Create `dir` and its parents, treating a concurrent creation as success
pub fn ensure_dir(dir: &Path) -> Result<()> {
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(e) => Err(DownloadError::fs(dir, FileOperation::CreateDir, e)),
    }
}

/// Candidate name for attempt `n`; attempt 0 is the original name
pub fn suffixed_name(file_name: &str, n: u32) -> String {
    if n == 0 {
        return file_name.to_string();
    }

    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    }
}

/// Claim a free path for `file_name` inside `dir` by creating it empty
fn reserve_destination(dir: &Path, file_name: &str) -> Result<PathBuf> {
    for n in 0..=MAX_SUFFIX {
        let candidate = dir.join(suffixed_name(file_name, n));
        match OpenOptions::new().write(true).create_new(true).open(&candidate) {
            Ok(_) => return Ok(candidate),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(DownloadError::fs(&candidate, FileOperation::Create, e)),
        }
    }

    Err(DownloadError::fs(
        dir.join(file_name),
        FileOperation::Create,
        std::io::Error::new(ErrorKind::AlreadyExists, "no free file name left"),
    ))
}

/// Rename, falling back to copy and delete across file systems
fn move_file(src: &Path, dest: &Path) -> std::io::Result<()> {
    match std::fs::rename(src, dest) {
        Ok(()) => Ok(()),
        Err(rename_err) => {
            debug!("rename {} failed ({}), copying instead", src.display(), rename_err);
            std::fs::copy(src, dest)?;
            std::fs::remove_file(src)
        }
    }
}

/// Move every file in `files` into `dest_dir`
///
/// Returns the final paths in the same order as `files`. If any move fails,
/// files already moved are put back where they came from and a folder this
/// call created is removed again, so a failed install leaves nothing behind.
pub fn install_files(files: &[PathBuf], dest_dir: &Path) -> Result<Vec<PathBuf>> {
    let created_dir = !dest_dir.exists();
    ensure_dir(dest_dir)?;

    let mut moved: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(files.len());
    for src in files {
        match place_file(src, dest_dir) {
            Ok(dest) => moved.push((src.clone(), dest)),
            Err(e) => {
                roll_back(&moved, dest_dir, created_dir);
                return Err(e);
            }
        }
    }

    Ok(moved.into_iter().map(|(_, dest)| dest).collect())
}

fn place_file(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    let file_name = src
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| {
            DownloadError::fs(
                src,
                FileOperation::Move,
                std::io::Error::new(ErrorKind::InvalidInput, "source has no file name"),
            )
        })?;

    let dest = reserve_destination(dest_dir, &file_name)?;
    if let Err(e) = move_file(src, &dest) {
        let _ = std::fs::remove_file(&dest);
        return Err(DownloadError::fs(src, FileOperation::Move, e));
    }

    debug!("Installed {} -> {}", src.display(), dest.display());
    Ok(dest)
}

fn roll_back(moved: &[(PathBuf, PathBuf)], dest_dir: &Path, created_dir: bool) {
    for (src, dest) in moved.iter().rev() {
        if let Err(e) = move_file(dest, src) {
            warn!("Could not restore {} ({}), removing it", dest.display(), e);
            if let Err(e) = std::fs::remove_file(dest) {
                warn!("Could not remove partially installed {}: {}", dest.display(), e);
            }
        }
    }

    // Only succeeds when nothing else landed in the folder meanwhile
    if created_dir && std::fs::remove_dir(dest_dir).is_ok() {
        debug!("Removed {} after failed install", dest_dir.display());
    }
}
