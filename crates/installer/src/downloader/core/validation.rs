//! Artifact integrity check
//!
//! The catalog publishes an MD5 hex digest. A request without one skips
//! verification; that is the default trust policy, tightened only by
//! `InstallerConfig::require_checksum`.

use md5::{Digest, Md5};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::downloader::core::{DownloadError, FileOperation, Result};

const HASH_BUFFER_SIZE: usize = 64 * 1024;

/// Expected digest for a download, if the catalog supplied one
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChecksumSpec {
    pub expected_md5: Option<String>,
}

/// What verification concluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChecksumVerdict {
    Verified,
    Skipped,
}

impl ChecksumSpec {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn md5<S: Into<String>>(hex_digest: S) -> Self {
        Self {
            expected_md5: Some(hex_digest.into()),
        }
    }

    /// Blank strings count as "no checksum"
    pub fn is_empty(&self) -> bool {
        self.expected_md5.as_deref().is_none_or(|s| s.trim().is_empty())
    }

    /// Hash `path` and compare case-insensitively
    pub async fn verify_file(&self, path: &Path) -> Result<ChecksumVerdict> {
        let Some(expected) = self.expected_md5.as_deref().map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(ChecksumVerdict::Skipped);
        };

        let actual = md5_file(path.to_path_buf()).await?;
        debug!("MD5 check for {}: expected={}, actual={}", path.display(), expected, actual);

        if actual.eq_ignore_ascii_case(expected) {
            Ok(ChecksumVerdict::Verified)
        } else {
            Err(DownloadError::ChecksumMismatch {
                file: path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                expected: expected.to_string(),
                actual,
            })
        }
    }
}

/// Lower-case hex MD5 of a file, hashed off the async runtime
pub async fn md5_file(path: PathBuf) -> Result<String> {
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || md5_file_blocking(&task_path))
        .await
        .map_err(|e| DownloadError::TaskFailed {
            reason: format!("hash computation for {}: {}", path.display(), e),
        })?
}

fn md5_file_blocking(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path).map_err(|e| DownloadError::fs(path, FileOperation::Read, e))?;
    let mut hasher = Md5::new();
    let mut buffer = vec![0u8; HASH_BUFFER_SIZE];
    loop {
        let read = file
            .read(&mut buffer)
            .map_err(|e| DownloadError::fs(path, FileOperation::Read, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}
