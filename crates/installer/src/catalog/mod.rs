//! Remote catalog collaborator
//!
//! The installer consumes exactly two lookups from the mod catalog. Search,
//! paging and caching belong to whoever implements [`CatalogClient`].

pub mod updates;

pub use updates::{missing_catalog_ids, AvailableUpdate, ProfileEntry, UpdateChecker};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::downloader::core::Result;

/// A downloadable file of a catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub filename: String,
    pub download_url: String,
    /// MD5 hex digest, when the catalog publishes one
    #[serde(default)]
    pub checksum: Option<String>,
    pub file_size: u64,
}

/// Catalog entry details used for update checks
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModDetails {
    pub display_name: String,
    pub last_updated: DateTime<Utc>,
}

/// Trait for mod catalog implementations
///
/// Failures should be reported as [`DownloadError::Catalog`](crate::DownloadError::Catalog).
#[async_trait]
pub trait CatalogClient: Send + Sync {
    async fn fetch_file_info(&self, file_id: u64) -> Result<FileInfo>;

    async fn fetch_mod_details(&self, catalog_id: u64) -> Result<ModDetails>;
}
