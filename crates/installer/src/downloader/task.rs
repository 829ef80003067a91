//! Download task state
//!
//! [`TaskRegistry`] is the only place task state is mutated. Observers get
//! [`DownloadTask`] snapshots, either by asking or through the event channel.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::downloader::core::{FailureKind, ProgressEvent};

/// Unique identifier of one download task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a task
///
/// `Pending -> Downloading -> Extracting -> Completed`, and any non-terminal
/// state may move to `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskStatus {
    Pending,
    Downloading,
    Extracting,
    Completed,
    Failed(FailureKind),
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed(_))
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        match (self, next) {
            (TaskStatus::Pending, TaskStatus::Downloading)
            | (TaskStatus::Downloading, TaskStatus::Extracting)
            | (TaskStatus::Extracting, TaskStatus::Completed) => true,
            (current, TaskStatus::Failed(_)) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Pending => write!(f, "pending"),
            TaskStatus::Downloading => write!(f, "downloading"),
            TaskStatus::Extracting => write!(f, "extracting"),
            TaskStatus::Completed => write!(f, "completed"),
            TaskStatus::Failed(kind) => write!(f, "failed ({kind})"),
        }
    }
}

/// Read-only snapshot of one task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadTask {
    pub id: TaskId,
    pub filename: String,
    pub display_name: String,
    pub catalog_id: Option<u64>,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub status: TaskStatus,
    pub message: String,
    /// Queued by a profile or modpack rather than a user pick
    pub batch: bool,
    pub created_at: DateTime<Utc>,
    pub folder: Option<PathBuf>,
    pub installed_count: usize,
}

impl DownloadTask {
    /// Byte progress in `0.0..=1.0`, when the size is known
    pub fn progress_fraction(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => Some((self.downloaded as f64 / total as f64).min(1.0)),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

struct TaskEntry {
    task: DownloadTask,
    cancel: CancellationToken,
    seq: u64,
}

#[derive(Default)]
struct RegistryState {
    entries: HashMap<TaskId, TaskEntry>,
    next_seq: u64,
}

/// Owner of all mutable task state
///
/// Every change is published on the event channel while the state lock is
/// held, so one task's events arrive in the order the changes were applied.
#[derive(Clone)]
pub struct TaskRegistry {
    state: Arc<Mutex<RegistryState>>,
    events: broadcast::Sender<ProgressEvent>,
    retention: Duration,
}

impl TaskRegistry {
    pub fn new(events: broadcast::Sender<ProgressEvent>, retention: Duration) -> Self {
        Self {
            state: Arc::new(Mutex::new(RegistryState::default())),
            events,
            retention,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: ProgressEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Register a `Pending` task and announce it
    pub fn register(
        &self,
        filename: String,
        display_name: String,
        catalog_id: Option<u64>,
        batch: bool,
    ) -> (TaskId, CancellationToken) {
        let id = TaskId::new();
        let cancel = CancellationToken::new();
        let task = DownloadTask {
            id,
            filename,
            display_name: display_name.clone(),
            catalog_id,
            downloaded: 0,
            total: None,
            status: TaskStatus::Pending,
            message: "Queued".to_string(),
            batch,
            created_at: Utc::now(),
            folder: None,
            installed_count: 0,
        };

        let mut state = self.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.entries.insert(
            id,
            TaskEntry {
                task,
                cancel: cancel.clone(),
                seq,
            },
        );
        self.publish(ProgressEvent::TaskQueued { id, display_name, batch });
        (id, cancel)
    }

    /// Apply a state change, ignoring ones the state machine forbids
    ///
    /// Returns whether the change was applied.
    pub fn transition<S: Into<String>>(&self, id: TaskId, status: TaskStatus, message: S) -> bool {
        let message = message.into();
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&id) else {
            warn!("Transition to {} for unknown task {}", status, id);
            return false;
        };

        if !entry.task.status.can_transition_to(status) {
            warn!("Ignoring illegal transition {} -> {} for task {}", entry.task.status, status, id);
            return false;
        }

        debug!("Task {}: {} -> {}", id, entry.task.status, status);
        entry.task.status = status;
        entry.task.message = message.clone();
        let finished = status.is_terminal().then(|| entry.task.clone());

        self.publish(ProgressEvent::StatusChanged { id, status, message });
        if let Some(task) = finished {
            self.publish(ProgressEvent::TaskFinished { task });
            drop(state);
            self.schedule_removal(id);
        }
        true
    }

    /// Record byte progress; counts never move backwards
    pub fn update_progress(&self, id: TaskId, downloaded: u64, total: Option<u64>, speed_bps: f64) {
        let mut state = self.lock();
        let Some(entry) = state.entries.get_mut(&id) else {
            return;
        };
        if entry.task.status != TaskStatus::Downloading || downloaded < entry.task.downloaded {
            return;
        }
        entry.task.downloaded = downloaded;
        entry.task.total = total;
        self.publish(ProgressEvent::DownloadProgress {
            id,
            downloaded,
            total,
            speed_bps,
        });
    }

    /// Attach the install result before the final transition
    pub fn set_installed(&self, id: TaskId, folder: PathBuf, count: usize) {
        if let Some(entry) = self.lock().entries.get_mut(&id) {
            entry.task.folder = Some(folder);
            entry.task.installed_count = count;
        }
    }

    pub fn get(&self, id: TaskId) -> Option<DownloadTask> {
        self.lock().entries.get(&id).map(|entry| entry.task.clone())
    }

    /// All retained tasks in registration order
    pub fn snapshot(&self) -> Vec<DownloadTask> {
        let state = self.lock();
        let mut entries: Vec<&TaskEntry> = state.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.task.clone()).collect()
    }

    /// Request cancellation; false when the task is unknown or finished
    pub fn cancel(&self, id: TaskId) -> bool {
        match self.lock().entries.get(&id) {
            Some(entry) if !entry.task.is_terminal() => {
                entry.cancel.cancel();
                true
            }
            _ => false,
        }
    }

    fn schedule_removal(&self, id: TaskId) {
        let state = Arc::downgrade(&self.state);
        let retention = self.retention;
        tokio::spawn(async move {
            tokio::time::sleep(retention).await;
            if let Some(state) = state.upgrade() {
                let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
                state.entries.remove(&id);
                debug!("Task {} removed after retention", id);
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(retention: Duration) -> (TaskRegistry, broadcast::Receiver<ProgressEvent>) {
        let (tx, rx) = broadcast::channel(64);
        (TaskRegistry::new(tx, retention), rx)
    }

    #[test]
    fn state_machine_allows_only_forward_moves() {
        use TaskStatus::*;
        assert!(Pending.can_transition_to(Downloading));
        assert!(Downloading.can_transition_to(Extracting));
        assert!(Extracting.can_transition_to(Completed));
        assert!(Pending.can_transition_to(Failed(FailureKind::Cancelled)));
        assert!(!Pending.can_transition_to(Completed));
        assert!(!Downloading.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Failed(FailureKind::FileSystem)));
        assert!(!Failed(FailureKind::NoInstallableFiles).can_transition_to(Downloading));
    }

    #[test]
    fn progress_fraction_is_clamped() {
        let (registry, _rx) = registry(Duration::from_secs(60));
        let (id, _) = registry.register("a.zip".into(), "A".into(), None, false);
        let mut task = registry.get(id).unwrap();
        assert_eq!(task.progress_fraction(), None);
        task.total = Some(100);
        task.downloaded = 50;
        assert_eq!(task.progress_fraction(), Some(0.5));
        task.downloaded = 150;
        assert_eq!(task.progress_fraction(), Some(1.0));
    }

    #[tokio::test]
    async fn events_follow_transitions_in_order() {
        let (registry, mut rx) = registry(Duration::from_secs(60));
        let (id, _) = registry.register("a.zip".into(), "A".into(), Some(7), true);

        assert!(registry.transition(id, TaskStatus::Downloading, "Downloading"));
        registry.update_progress(id, 10, Some(20), 1.0);
        registry.update_progress(id, 5, Some(20), 1.0);
        assert!(!registry.transition(id, TaskStatus::Completed, "skipped a stage"));
        assert!(registry.transition(id, TaskStatus::Extracting, "Extracting"));
        assert!(registry.transition(id, TaskStatus::Completed, "Installed"));

        let mut seen = Vec::new();
        while let Ok(event) = rx.try_recv() {
            seen.push(match event {
                ProgressEvent::TaskQueued { batch, .. } => format!("queued {batch}"),
                ProgressEvent::StatusChanged { status, .. } => status.to_string(),
                ProgressEvent::DownloadProgress { downloaded, .. } => format!("bytes {downloaded}"),
                ProgressEvent::TaskFinished { task } => format!("finished {}", task.status),
            });
        }
        assert_eq!(
            seen,
            vec![
                "queued true",
                "downloading",
                "bytes 10",
                "extracting",
                "completed",
                "finished completed"
            ]
        );
        assert_eq!(registry.get(id).unwrap().downloaded, 10);
    }

    #[tokio::test]
    async fn terminal_tasks_expire_after_retention() {
        let (registry, _rx) = registry(Duration::from_millis(20));
        let (id, _) = registry.register("a.zip".into(), "A".into(), None, false);
        registry.transition(id, TaskStatus::Failed(FailureKind::TransportFailure), "boom");
        assert!(registry.get(id).is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(registry.get(id).is_none());
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn cancel_only_reaches_live_tasks() {
        let (registry, _rx) = registry(Duration::from_secs(60));
        let (id, token) = registry.register("a.zip".into(), "A".into(), None, false);
        assert!(registry.cancel(id));
        assert!(token.is_cancelled());

        registry.transition(id, TaskStatus::Failed(FailureKind::Cancelled), "cancelled");
        assert!(!registry.cancel(id));
        assert!(!registry.cancel(TaskId::new()));
    }

    #[test]
    fn snapshot_keeps_registration_order() {
        let (registry, _rx) = registry(Duration::from_secs(60));
        let names: Vec<String> = (0..5).map(|i| format!("mod{i}")).collect();
        for name in &names {
            registry.register(format!("{name}.zip"), name.clone(), None, false);
        }
        let listed: Vec<String> = registry.snapshot().into_iter().map(|t| t.display_name).collect();
        assert_eq!(listed, names);
    }
}
