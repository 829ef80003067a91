//! Progress publishing for download tasks
//!
//! The manager publishes [`ProgressEvent`]s on a broadcast channel; UIs and
//! tests subscribe. [`ProgressReporter`] adapts the channel to callback hooks.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::downloader::task::{DownloadTask, TaskId, TaskStatus};

/// Byte progress of one transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub downloaded: u64,
    pub total: Option<u64>,
    pub speed_bps: f64,
}

/// Callback the HTTP layer invokes with throttled byte progress
pub type ProgressCallback = Arc<dyn Fn(TransferProgress) + Send + Sync>;

/// Events emitted while tasks run
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    TaskQueued {
        id: TaskId,
        display_name: String,
        batch: bool,
    },
    StatusChanged {
        id: TaskId,
        status: TaskStatus,
        message: String,
    },
    DownloadProgress {
        id: TaskId,
        downloaded: u64,
        total: Option<u64>,
        speed_bps: f64,
    },
    TaskFinished {
        task: DownloadTask,
    },
}

impl ProgressEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            ProgressEvent::TaskQueued { id, .. }
            | ProgressEvent::StatusChanged { id, .. }
            | ProgressEvent::DownloadProgress { id, .. } => *id,
            ProgressEvent::TaskFinished { task } => task.id,
        }
    }
}

/// Coalescing policy for byte progress
///
/// Emits at most once per `interval`, plus always for the final update.
#[derive(Debug, Clone)]
pub struct ProgressThrottle {
    interval: Duration,
    last_emit: Option<Instant>,
}

impl ProgressThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_emit: None,
        }
    }

    pub fn should_emit(&mut self, now: Instant, is_final: bool) -> bool {
        let due = match self.last_emit {
            None => true,
            Some(last) => now.duration_since(last) >= self.interval,
        };
        if due || is_final {
            self.last_emit = Some(now);
            true
        } else {
            false
        }
    }
}

/// Hook-style observer of task progress
pub trait ProgressReporter: Send + Sync {
    fn on_task_queued(&self, _id: TaskId, _display_name: &str, _batch: bool) {}
    fn on_status_changed(&self, _id: TaskId, _status: TaskStatus, _message: &str) {}
    fn on_download_progress(&self, _id: TaskId, _downloaded: u64, _total: Option<u64>, _speed_bps: f64) {}
    fn on_task_finished(&self, _task: &DownloadTask) {}

    fn handle(&self, event: &ProgressEvent) {
        match event {
            ProgressEvent::TaskQueued { id, display_name, batch } => {
                self.on_task_queued(*id, display_name, *batch);
            }
            ProgressEvent::StatusChanged { id, status, message } => {
                self.on_status_changed(*id, *status, message);
            }
            ProgressEvent::DownloadProgress { id, downloaded, total, speed_bps } => {
                self.on_download_progress(*id, *downloaded, *total, *speed_bps);
            }
            ProgressEvent::TaskFinished { task } => self.on_task_finished(task),
        }
    }
}

/// Drive `reporter` from a subscription until the manager is dropped
pub fn spawn_reporter<R>(mut receiver: broadcast::Receiver<ProgressEvent>, reporter: R) -> JoinHandle<()>
where
    R: ProgressReporter + 'static,
{
    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => reporter.handle(&event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Progress reporter lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// Simple console progress reporter implementation
#[derive(Debug, Default)]
pub struct ConsoleProgressReporter {
    pub verbose: bool,
}

impl ConsoleProgressReporter {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for ConsoleProgressReporter {
    fn on_task_queued(&self, _id: TaskId, display_name: &str, _batch: bool) {
        println!("Queued: {}", display_name);
    }

    fn on_status_changed(&self, _id: TaskId, _status: TaskStatus, message: &str) {
        if self.verbose {
            println!("{}", message);
        }
    }

    fn on_download_progress(&self, _id: TaskId, downloaded: u64, total: Option<u64>, speed_bps: f64) {
        if self.verbose {
            let speed_mb = speed_bps / 1_000_000.0;
            match total {
                Some(total) if total > 0 => {
                    let percent = (downloaded as f64 / total as f64) * 100.0;
                    println!("{:.1}% ({}/{} bytes, {:.1} MB/s)", percent, downloaded, total, speed_mb);
                }
                _ => println!("{} bytes downloaded ({:.1} MB/s)", downloaded, speed_mb),
            }
        }
    }

    fn on_task_finished(&self, task: &DownloadTask) {
        match task.status {
            TaskStatus::Completed => println!("Done: {}", task.message),
            _ => eprintln!("Failed: {} ({})", task.display_name, task.message),
        }
    }
}

/// Null progress reporter that does nothing
#[derive(Debug, Default)]
pub struct NullProgressReporter;

impl ProgressReporter for NullProgressReporter {}
