//! Downloader module
//!
//! This module contains the download side of the pipeline: core types,
//! configuration, task state and the orchestrating manager.

pub mod config;
pub mod core;
pub mod manager;
pub mod task;

// Re-export main types for convenience
pub use config::InstallerConfig;
pub use core::{
    spawn_reporter, ChecksumSpec, ChecksumVerdict, ConsoleProgressReporter, DownloadError, DownloadRequest,
    ErrorSeverity, FailureKind, FileOperation, InstallMetricsSnapshot, InstallOutcome, NullProgressReporter,
    ProgressEvent, ProgressReporter, ProgressThrottle, Result,
};
pub use manager::DownloadManager;
pub use task::{DownloadTask, TaskId, TaskStatus};
