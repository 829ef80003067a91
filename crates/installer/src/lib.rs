//! Mod Installer Library
//!
//! This library downloads mods from a catalog and installs them into a
//! managed mods directory. Every download goes through the same pipeline:
//! stream to scratch space, verify the checksum, extract, reject unsafe
//! archives, pick out the mod files, move them into a folder named after the
//! mod and record where they came from.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mod_installer::{
//!     ConsoleProgressReporter, DownloadManager, DownloadRequest, InstallerConfig, spawn_reporter,
//! };
//!
//! # async fn example() -> mod_installer::Result<()> {
//! // Create the manager for a mods directory
//! let config = InstallerConfig::new("/games/soh/mods");
//! let manager = DownloadManager::new(config)?;
//!
//! // Print progress events (optional)
//! let _reporter = spawn_reporter(manager.subscribe(), ConsoleProgressReporter::new(true));
//!
//! // Create a download request
//! let request = DownloadRequest::new("https://example.com/files/CoolMod.zip", "Cool Mod")
//!     .with_catalog_id(1234)
//!     .with_checksum("65a8e27d8879283831b664bd8b7f0ad4");
//!
//! // Download and install
//! let outcome = manager.install(request).await?;
//! println!("Installed {} files into {}", outcome.count(), outcome.folder.display());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Streaming downloads**: throttled progress events over a broadcast channel
//! - **Integrity check**: MD5 verification when the catalog supplies a digest
//! - **Archive support**: ZIP in-process, 7z and RAR through 7-Zip or unar
//! - **Path safety**: extracted trees escaping their root are rejected whole
//! - **Collision-free installs**: existing files are never overwritten
//! - **Provenance**: a `.modinfo.json` sidecar drives update checks
//! - **Batch installs**: profiles and modpacks install with bounded concurrency

pub mod catalog;
pub mod downloader;
pub mod install;

// Re-export commonly used types for convenience
pub use catalog::{AvailableUpdate, CatalogClient, FileInfo, ModDetails, ProfileEntry, UpdateChecker};
pub use downloader::{
    spawn_reporter, ConsoleProgressReporter, DownloadError, DownloadManager, DownloadRequest, DownloadTask,
    FailureKind, InstallOutcome, InstallerConfig, NullProgressReporter, ProgressEvent, ProgressReporter, Result,
    TaskId, TaskStatus,
};
pub use install::{scan_installed, ExtractionTool, InstalledMod, ModMetadata, ToolPaths};
