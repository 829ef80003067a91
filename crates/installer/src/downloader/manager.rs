//! Main entry point for downloading and installing mods
//!
//! The call chain flows as follows:
//!
//! User Code
//! ↓
//! DownloadManager (this file)
//! ↓
//! HttpClient (core/http.rs) → ChecksumSpec (core/validation.rs)
//! ↓
//! ArchiveExtractor → safety → classify → planner → metadata (install/*)
//!
//! The manager is the only component that touches task state; every stage
//! below it just returns a `Result`.

use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::downloader::config::InstallerConfig;
use crate::downloader::core::{
    DownloadError, DownloadRequest, FileOperation, HttpClient, InstallMetrics, InstallMetricsSnapshot,
    InstallOutcome, ProgressCallback, ProgressEvent, Result,
};
use crate::downloader::task::{DownloadTask, TaskId, TaskRegistry, TaskStatus};
use crate::install::{
    collect_mod_files, install_files, is_installable, sanitize_folder_name, validate_extraction_root,
    write_metadata, ArchiveExtractor, ModMetadata, ToolLocator,
};

const SCRATCH_PREFIX: &str = "mod-install-";
const EXTRACTION_DIR: &str = "extracted";

/// Download orchestrator
///
/// Cheap to clone; clones share the same tasks, channel and metrics. Construct
/// one per application and hand clones to whatever needs it.
#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    config: InstallerConfig,
    http: HttpClient,
    extractor: ArchiveExtractor,
    registry: TaskRegistry,
    events: broadcast::Sender<ProgressEvent>,
    metrics: InstallMetrics,
}

impl DownloadManager {
    /// Create a manager from validated configuration
    pub fn new(config: InstallerConfig) -> Result<Self> {
        config.validate()?;
        let http = HttpClient::from_config(&config)?;
        let extractor = ArchiveExtractor::new(ToolLocator::new(config.tools.clone()));
        let (events, _) = broadcast::channel(config.event_capacity);
        let registry = TaskRegistry::new(events.clone(), config.task_retention);

        Ok(Self {
            inner: Arc::new(ManagerInner {
                config,
                http,
                extractor,
                registry,
                events,
                metrics: InstallMetrics::default(),
            }),
        })
    }

    pub fn config(&self) -> &InstallerConfig {
        &self.inner.config
    }

    /// Subscribe to progress events of all tasks
    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.inner.events.subscribe()
    }

    /// Snapshots of all live and recently finished tasks
    pub fn tasks(&self) -> Vec<DownloadTask> {
        self.inner.registry.snapshot()
    }

    pub fn task(&self, id: TaskId) -> Option<DownloadTask> {
        self.inner.registry.get(id)
    }

    /// Get access to built-in install metrics
    pub fn metrics(&self) -> InstallMetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Best-effort abandon of a running task; scratch space is still removed
    pub fn cancel(&self, id: TaskId) -> bool {
        self.inner.registry.cancel(id)
    }

    /// Run the whole pipeline for one request and wait for its terminal state
    pub async fn install(&self, request: DownloadRequest) -> Result<InstallOutcome> {
        let (id, cancel) = self.register(&request);
        self.run(id, cancel, request).await
    }

    /// Start the pipeline in the background
    ///
    /// The task is registered before this returns, so `id` is immediately
    /// visible through [`tasks`](Self::tasks).
    pub fn spawn_install(&self, request: DownloadRequest) -> (TaskId, JoinHandle<Result<InstallOutcome>>) {
        let (id, cancel) = self.register(&request);
        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run(id, cancel, request).await });
        (id, handle)
    }

    /// Install several mods concurrently, as a profile or modpack does
    ///
    /// Every request is flagged as batch. Results come back in completion
    /// order; each successful outcome names its task.
    pub async fn install_batch(
        &self,
        requests: Vec<DownloadRequest>,
        max_concurrent: usize,
    ) -> Vec<Result<InstallOutcome>> {
        debug!("Starting batch install of {} mods with max_concurrent={}", requests.len(), max_concurrent);

        stream::iter(requests)
            .map(|request| self.install(request.as_batch()))
            .buffer_unordered(max_concurrent.max(1))
            .collect()
            .await
    }

    fn register(&self, request: &DownloadRequest) -> (TaskId, CancellationToken) {
        self.inner.registry.register(
            request.get_filename(),
            request.display_name.clone(),
            request.catalog_id,
            request.batch,
        )
    }

    async fn run(&self, id: TaskId, cancel: CancellationToken, request: DownloadRequest) -> Result<InstallOutcome> {
        let inner = &self.inner;
        inner.metrics.record_started();

        // Dropping the pipeline future drops its TempDir, which removes scratch space
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(DownloadError::Cancelled {
                reason: format!("'{}' was cancelled", request.display_name),
            }),
            result = self.pipeline(id, &request) => result,
        };

        match result {
            Ok(outcome) => {
                let count = outcome.count();
                let message = format!("Installed {} files to {}/", count, folder_label(&outcome.folder));
                info!(task = %id, "{}", message);
                inner.registry.set_installed(id, outcome.folder.clone(), count);
                inner.registry.transition(id, TaskStatus::Completed, message);
                inner.metrics.record_completed(count as u64);
                Ok(outcome)
            }
            Err(e) => {
                let kind = e.kind();
                if e.is_security_violation() {
                    error!(security = true, task = %id, url = %request.url, "Rejected archive: {}", e);
                } else {
                    warn!(task = %id, category = e.category(), "Install of '{}' failed: {}", request.display_name, e);
                }
                inner.registry.transition(id, TaskStatus::Failed(kind), e.to_string());
                inner.metrics.record_failed(kind);
                Err(e)
            }
        }
    }

    async fn pipeline(&self, id: TaskId, request: &DownloadRequest) -> Result<InstallOutcome> {
        let inner = &self.inner;
        let config = &inner.config;

        if config.require_checksum && request.checksum.is_empty() {
            return Err(DownloadError::ChecksumRequired { url: request.url.clone() });
        }

        inner.registry.transition(id, TaskStatus::Downloading, format!("Downloading {}", request.display_name));

        let scratch = create_scratch(&config.scratch_dir).await?;
        let artifact = scratch.path().join(artifact_name(&request.get_filename()));

        let registry = inner.registry.clone();
        let on_progress: ProgressCallback = Arc::new(move |p| {
            registry.update_progress(id, p.downloaded, p.total, p.speed_bps);
        });
        let bytes = inner
            .http
            .download_to_file(&request.url, &artifact, Some(on_progress))
            .await?;
        inner.metrics.record_downloaded(bytes);

        if let Err(e) = request.checksum.verify_file(&artifact).await {
            // The artifact is discarded before anything else happens
            if let Err(remove_err) = tokio::fs::remove_file(&artifact).await {
                debug!("Could not remove rejected artifact {}: {}", artifact.display(), remove_err);
            }
            return Err(e);
        }

        inner.registry.transition(id, TaskStatus::Extracting, format!("Extracting {}", request.display_name));

        let parent = request.destination.clone().unwrap_or_else(|| config.mods_dir.clone());
        let folder = parent.join(sanitize_folder_name(&request.display_name));

        let files = if is_installable(&artifact) {
            debug!("{} is a mod file, skipping extraction", artifact.display());
            vec![artifact.clone()]
        } else {
            let root = scratch.path().join(EXTRACTION_DIR);
            tokio::fs::create_dir(&root)
                .await
                .map_err(|e| DownloadError::fs(&root, FileOperation::CreateDir, e))?;

            let kind = inner.extractor.extract(&artifact, &root).await?;
            debug!("Extracted {:?} archive {}", kind, artifact.display());

            blocking(move || {
                let checked = validate_extraction_root(&root)?;
                debug!("Validated {} extracted entries", checked);
                collect_mod_files(&root)
            })
            .await?
        };

        if files.is_empty() {
            return Err(DownloadError::NoInstallableFiles {
                source_name: request.get_filename(),
            });
        }

        let dest = folder.clone();
        let installed = blocking(move || install_files(&files, &dest)).await?;

        let metadata = ModMetadata::new(request.display_name.clone(), request.catalog_id);
        if let Err(e) = write_metadata(&folder, &metadata) {
            warn!("Installed '{}' but could not write metadata: {}", request.display_name, e);
        }

        let scratch_path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("Failed to remove scratch directory {}: {}", scratch_path.display(), e);
        }

        Ok(InstallOutcome {
            task_id: id,
            folder,
            installed,
        })
    }
}

async fn create_scratch(parent: &Path) -> Result<TempDir> {
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| DownloadError::fs(parent, FileOperation::CreateDir, e))?;
    let parent = parent.to_path_buf();
    blocking(move || {
        tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&parent)
            .map_err(|e| DownloadError::fs(&parent, FileOperation::CreateDir, e))
    })
    .await
}

/// A file name that cannot leave the scratch directory
fn artifact_name(filename: &str) -> String {
    let name = sanitize_filename::sanitize(filename);
    if name.is_empty() || name == "." || name == ".." {
        "download".to_string()
    } else {
        name
    }
}

fn folder_label(folder: &Path) -> String {
    folder
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| folder.display().to_string())
}

async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| DownloadError::TaskFailed { reason: e.to_string() })?
}
