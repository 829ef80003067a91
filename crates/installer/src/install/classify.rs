//! Selection of installable mod files from an extracted tree

use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Extensions the game loads, compared case-insensitively
pub const MOD_EXTENSIONS: [&str; 2] = ["otr", "o2r"];

/// Resource-fork trees macOS adds to zips
const IGNORED_DIRS: [&str; 1] = ["__MACOSX"];

/// True if `path` carries an installable extension
pub fn is_installable(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy())
        .is_some_and(|ext| MOD_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
}

fn is_hidden_or_ignored(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || IGNORED_DIRS.iter().any(|dir| name.eq_ignore_ascii_case(dir))
}

/// Recursively collect installable files under `root`
///
/// Hidden entries are skipped and symlinks are never followed. Results are in
/// depth-first, file-name order.
pub fn collect_mod_files(root: &Path) -> Result<Vec<PathBuf>> {
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden_or_ignored(entry));

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            let source = e
                .into_io_error()
                .unwrap_or_else(|| std::io::Error::other("file system loop"));
            DownloadError::fs(path, FileOperation::Read, source)
        })?;

        if entry.file_type().is_file() && is_installable(entry.path()) {
            files.push(entry.into_path());
        }
    }

    Ok(files)
}
