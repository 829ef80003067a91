//! Configuration types for the download manager

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::downloader::core::{DownloadError, Result};
use crate::install::tools::ToolPaths;

/// Configuration for download and install operations
#[derive(Debug, Clone)]
pub struct InstallerConfig {
    /// Managed mods root; each install lands in a sub-folder
    pub mods_dir: PathBuf,
    /// Parent for per-task scratch directories
    pub scratch_dir: PathBuf,
    /// Ceiling for a whole transfer; archives can be large
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub user_agent: String,
    /// Minimum spacing between progress events of one task
    pub progress_interval: Duration,
    /// How long finished tasks stay listed
    pub task_retention: Duration,
    /// Reject requests that carry no checksum
    pub require_checksum: bool,
    /// Candidate locations of optional extraction tools
    pub tools: ToolPaths,
    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,
}

impl InstallerConfig {
    pub fn new<P: Into<PathBuf>>(mods_dir: P) -> Self {
        Self {
            mods_dir: mods_dir.into(),
            ..Self::default()
        }
    }

    pub fn with_scratch_dir<P: Into<PathBuf>>(mut self, scratch_dir: P) -> Self {
        self.scratch_dir = scratch_dir.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_task_retention(mut self, retention: Duration) -> Self {
        self.task_retention = retention;
        self
    }

    pub fn with_require_checksum(mut self, required: bool) -> Self {
        self.require_checksum = required;
        self
    }

    pub fn with_tools(mut self, tools: ToolPaths) -> Self {
        self.tools = tools;
        self
    }

    pub fn mods_dir(&self) -> &Path {
        &self.mods_dir
    }

    /// Reject settings the pipeline cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.timeout.is_zero() {
            return Err(DownloadError::Configuration {
                message: "timeout must be greater than zero".to_string(),
                field: Some("timeout".to_string()),
            });
        }
        if self.progress_interval.is_zero() {
            return Err(DownloadError::Configuration {
                message: "progress interval must be greater than zero".to_string(),
                field: Some("progress_interval".to_string()),
            });
        }
        if self.event_capacity == 0 {
            return Err(DownloadError::Configuration {
                message: "event capacity must be at least 1".to_string(),
                field: Some("event_capacity".to_string()),
            });
        }
        Ok(())
    }
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            mods_dir: PathBuf::from("./mods"),
            scratch_dir: std::env::temp_dir(),
            timeout: Duration::from_secs(600), // 10 minutes for large archives
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("mod-installer/{}", env!("CARGO_PKG_VERSION")),
            progress_interval: Duration::from_millis(100),
            task_retention: Duration::from_secs(5),
            require_checksum: false,
            tools: ToolPaths::default(),
            event_capacity: 256,
        }
    }
}
