//! Update checks and profile resolution against installed metadata
//!
//! Both key on the `catalogId` in each folder's sidecar. Folders without a
//! sidecar, or without an id in it, are invisible here.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::catalog::CatalogClient;
use crate::downloader::core::{DownloadError, DownloadRequest, Result};
use crate::install::{scan_installed, InstalledMod};

/// An installed folder whose catalog entry changed after it was installed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableUpdate {
    pub folder: PathBuf,
    pub catalog_id: u64,
    pub display_name: String,
    pub installed_at: DateTime<Utc>,
    pub remote_updated: DateTime<Utc>,
}

/// A mod a profile or modpack wants present
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileEntry {
    pub catalog_id: u64,
    /// Catalog file to fetch when the mod is missing
    pub file_id: u64,
    pub display_name: String,
}

/// Compares installed metadata with the catalog
pub struct UpdateChecker<C: CatalogClient> {
    client: Arc<C>,
}

impl<C: CatalogClient> UpdateChecker<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Folders under `mods_dir` with a newer catalog entry
    ///
    /// A lookup failure for one mod is logged and that mod skipped.
    pub async fn check(&self, mods_dir: &Path) -> Result<Vec<AvailableUpdate>> {
        let mut updates = Vec::new();

        for installed in scan(mods_dir).await? {
            let Some(metadata) = installed.metadata else {
                continue;
            };
            let Some(catalog_id) = metadata.catalog_id else {
                continue;
            };

            let details = match self.client.fetch_mod_details(catalog_id).await {
                Ok(details) => details,
                Err(e) => {
                    warn!("Update check for catalog id {} failed: {}", catalog_id, e);
                    continue;
                }
            };

            if details.last_updated > metadata.installed_at {
                debug!(
                    "Update available for {} (installed {}, remote {})",
                    installed.folder.display(),
                    metadata.installed_at,
                    details.last_updated
                );
                updates.push(AvailableUpdate {
                    folder: installed.folder,
                    catalog_id,
                    display_name: metadata.display_name,
                    installed_at: metadata.installed_at,
                    remote_updated: details.last_updated,
                });
            }
        }

        Ok(updates)
    }

    /// Batch requests for the profile entries nothing installed claims
    pub async fn plan_profile_downloads(
        &self,
        mods_dir: &Path,
        entries: &[ProfileEntry],
    ) -> Result<Vec<DownloadRequest>> {
        let wanted: Vec<u64> = entries.iter().map(|entry| entry.catalog_id).collect();
        let missing: HashSet<u64> = missing_catalog_ids(mods_dir, &wanted)?.into_iter().collect();

        let mut requests = Vec::new();
        for entry in entries.iter().filter(|entry| missing.contains(&entry.catalog_id)) {
            let info = self.client.fetch_file_info(entry.file_id).await?;
            requests.push(
                DownloadRequest::from_file_info(&info, entry.display_name.clone(), Some(entry.catalog_id)).as_batch(),
            );
        }
        Ok(requests)
    }
}

/// Catalog ids in `wanted` that no installed folder's metadata claims
///
/// Keeps the order of `wanted` and drops duplicates.
pub fn missing_catalog_ids(mods_dir: &Path, wanted: &[u64]) -> Result<Vec<u64>> {
    let installed: HashSet<u64> = scan_installed(mods_dir)?
        .into_iter()
        .filter_map(|m| m.metadata.and_then(|meta| meta.catalog_id))
        .collect();

    let mut seen = HashSet::new();
    Ok(wanted
        .iter()
        .copied()
        .filter(|id| !installed.contains(id) && seen.insert(*id))
        .collect())
}

async fn scan(mods_dir: &Path) -> Result<Vec<InstalledMod>> {
    let mods_dir = mods_dir.to_path_buf();
    tokio::task::spawn_blocking(move || scan_installed(&mods_dir))
        .await
        .map_err(|e| DownloadError::TaskFailed { reason: e.to_string() })?
}
