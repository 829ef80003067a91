//! Provenance sidecar stored in each installed mod folder

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::downloader::core::{DownloadError, FileOperation, Result};

/// Reserved, hidden file name of the sidecar
pub const METADATA_FILE_NAME: &str = ".modinfo.json";

/// Where an installed folder came from
///
/// `catalog_id` is what update checks and profile resolution key on; folders
/// without it are never matched against the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModMetadata {
    pub display_name: String,
    #[serde(default)]
    pub catalog_id: Option<u64>,
    pub installed_at: DateTime<Utc>,
}

impl ModMetadata {
    /// Record stamped with the current time
    pub fn new<S: Into<String>>(display_name: S, catalog_id: Option<u64>) -> Self {
        Self {
            display_name: display_name.into(),
            catalog_id,
            installed_at: Utc::now(),
        }
    }
}

pub fn metadata_path(folder: &Path) -> PathBuf {
    folder.join(METADATA_FILE_NAME)
}

/// Write the sidecar, replacing any previous record
pub fn write_metadata(folder: &Path, metadata: &ModMetadata) -> Result<()> {
    let path = metadata_path(folder);
    let json = serde_json::to_vec_pretty(metadata).map_err(|e| {
        DownloadError::fs(&path, FileOperation::Write, std::io::Error::other(e))
    })?;

    // Private temp file per writer; the rename swaps the sidecar in whole.
    let mut tmp = tempfile::Builder::new()
        .prefix(METADATA_FILE_NAME)
        .suffix(".tmp")
        .tempfile_in(folder)
        .map_err(|e| DownloadError::fs(folder, FileOperation::Create, e))?;
    tmp.write_all(&json)
        .map_err(|e| DownloadError::fs(tmp.path(), FileOperation::Write, e))?;
    tmp.persist(&path)
        .map_err(|e| DownloadError::fs(&path, FileOperation::Move, e.error))?;

    debug!("Wrote metadata for '{}' to {}", metadata.display_name, path.display());
    Ok(())
}

/// Load the sidecar; missing or unreadable records read as `None`
pub fn read_metadata(folder: &Path) -> Option<ModMetadata> {
    let path = metadata_path(folder);
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Could not read {}: {}", path.display(), e);
            }
            return None;
        }
    };

    match serde_json::from_slice(&bytes) {
        Ok(metadata) => Some(metadata),
        Err(e) => {
            warn!("Ignoring corrupt metadata in {}: {}", path.display(), e);
            None
        }
    }
}

/// An installed mod folder and its sidecar, if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledMod {
    pub folder: PathBuf,
    pub metadata: Option<ModMetadata>,
}

/// Every directory directly under `mods_dir`, sorted by name
///
/// A missing mods directory yields an empty list.
pub fn scan_installed(mods_dir: &Path) -> Result<Vec<InstalledMod>> {
    let entries = match std::fs::read_dir(mods_dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(DownloadError::fs(mods_dir, FileOperation::Read, e)),
    };

    let mut folders: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_ok_and(|ft| ft.is_dir()))
        .map(|entry| entry.path())
        .collect();
    folders.sort();

    Ok(folders
        .into_iter()
        .map(|folder| InstalledMod {
            metadata: read_metadata(&folder),
            folder,
        })
        .collect())
}
