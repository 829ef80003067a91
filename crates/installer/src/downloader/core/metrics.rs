//! Counters for install activity
//!
//! Atomic counters updated by concurrent tasks, read through snapshots.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::downloader::core::FailureKind;

#[derive(Debug, Default)]
pub struct InstallMetrics {
    pub tasks_started: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub bytes_downloaded: AtomicU64,
    pub files_installed: AtomicU64,
    pub checksum_failures: AtomicU64,
    pub security_rejections: AtomicU64,
}

impl InstallMetrics {
    pub fn record_started(&self) {
        self.tasks_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_downloaded(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_completed(&self, files: u64) {
        self.tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.files_installed.fetch_add(files, Ordering::Relaxed);
    }

    pub fn record_failed(&self, kind: FailureKind) {
        self.tasks_failed.fetch_add(1, Ordering::Relaxed);
        match kind {
            FailureKind::ChecksumMismatch => {
                self.checksum_failures.fetch_add(1, Ordering::Relaxed);
            }
            FailureKind::PathSafetyViolation => {
                self.security_rejections.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
    }

    pub fn snapshot(&self) -> InstallMetricsSnapshot {
        InstallMetricsSnapshot {
            tasks_started: self.tasks_started.load(Ordering::Relaxed),
            tasks_completed: self.tasks_completed.load(Ordering::Relaxed),
            tasks_failed: self.tasks_failed.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            files_installed: self.files_installed.load(Ordering::Relaxed),
            checksum_failures: self.checksum_failures.load(Ordering::Relaxed),
            security_rejections: self.security_rejections.load(Ordering::Relaxed),
        }
    }
}

/// Immutable snapshot of install metrics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallMetricsSnapshot {
    pub tasks_started: u64,
    pub tasks_completed: u64,
    pub tasks_failed: u64,
    pub bytes_downloaded: u64,
    pub files_installed: u64,
    pub checksum_failures: u64,
    pub security_rejections: u64,
}

impl InstallMetricsSnapshot {
    /// Share of finished tasks that completed (0.0 to 1.0)
    pub fn success_rate(&self) -> f64 {
        let finished = self.tasks_completed + self.tasks_failed;
        if finished == 0 {
            0.0
        } else {
            self.tasks_completed as f64 / finished as f64
        }
    }
}
