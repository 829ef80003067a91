//! Core types used throughout the downloader system
//!
//! This module contains the fundamental types that all other modules depend on.
//! By organizing these in a core module, we make the dependency relationships clear.

pub mod error;
pub mod http;
pub mod metrics;
pub mod progress;
pub mod validation;

// Re-export main types for convenience
pub use error::{DownloadError, ErrorSeverity, FailureKind, FileOperation, Result};
pub use http::HttpClient;
pub use metrics::{InstallMetrics, InstallMetricsSnapshot};
pub use progress::{
    spawn_reporter, ConsoleProgressReporter, NullProgressReporter, ProgressCallback, ProgressEvent,
    ProgressReporter, ProgressThrottle, TransferProgress,
};
pub use validation::{ChecksumSpec, ChecksumVerdict};

use std::path::PathBuf;

use crate::catalog::FileInfo;
use crate::downloader::task::TaskId;

/// A request to download and install one mod
///
/// Both install triggers (a user picking a file, a profile naming a missing
/// catalog id) produce this same shape; only `batch` differs.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    /// Artifact file name; derived from the URL when `None`
    pub filename: Option<String>,
    /// Source of the destination folder name
    pub display_name: String,
    pub catalog_id: Option<u64>,
    pub checksum: ChecksumSpec,
    /// Parent directory for the mod folder instead of the managed root
    pub destination: Option<PathBuf>,
    pub batch: bool,
}

impl DownloadRequest {
    /// Create a new request with a URL and the mod's display name
    pub fn new<U: Into<String>, N: Into<String>>(url: U, display_name: N) -> Self {
        Self {
            url: url.into(),
            filename: None,
            display_name: display_name.into(),
            catalog_id: None,
            checksum: ChecksumSpec::none(),
            destination: None,
            batch: false,
        }
    }

    /// Build the request for a catalog file listing
    pub fn from_file_info<N: Into<String>>(info: &FileInfo, display_name: N, catalog_id: Option<u64>) -> Self {
        let mut request = Self::new(info.download_url.clone(), display_name).with_filename(info.filename.clone());
        request.catalog_id = catalog_id;
        if let Some(ref checksum) = info.checksum {
            request.checksum = ChecksumSpec::md5(checksum.clone());
        }
        request
    }

    pub fn with_filename<S: Into<String>>(mut self, filename: S) -> Self {
        self.filename = Some(filename.into());
        self
    }

    pub fn with_catalog_id(mut self, catalog_id: u64) -> Self {
        self.catalog_id = Some(catalog_id);
        self
    }

    pub fn with_checksum<S: Into<String>>(mut self, md5_hex: S) -> Self {
        self.checksum = ChecksumSpec::md5(md5_hex);
        self
    }

    pub fn with_destination<P: Into<PathBuf>>(mut self, parent: P) -> Self {
        self.destination = Some(parent.into());
        self
    }

    /// Mark as originating from a profile or modpack application
    pub fn as_batch(mut self) -> Self {
        self.batch = true;
        self
    }

    /// Get the filename for this download
    ///
    /// Returns the explicit filename if set, otherwise the last URL path
    /// segment. Falls back to a generic name if extraction fails.
    pub fn get_filename(&self) -> String {
        if let Some(ref filename) = self.filename {
            return filename.clone();
        }

        url::Url::parse(&self.url)
            .ok()
            .and_then(|parsed| {
                parsed
                    .path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|segment| !segment.is_empty())
            .unwrap_or_else(|| "download".to_string())
    }
}

/// Terminal result of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub task_id: TaskId,
    /// The mod folder the files landed in
    pub folder: PathBuf,
    /// Final paths of the installed files
    pub installed: Vec<PathBuf>,
}

impl InstallOutcome {
    pub fn count(&self) -> usize {
        self.installed.len()
    }
}
