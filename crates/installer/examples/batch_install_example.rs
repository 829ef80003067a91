//! Example demonstrating a profile-style batch install
//!
//! Installs several mods concurrently; every task is flagged as batch and
//! failures do not stop the others.
//!
//! Run this example with:
//! ```
//! cargo run --example batch_install_example
//! ```

use mod_installer::{
    scan_installed, DownloadManager, DownloadRequest, InstallerConfig, ProgressEvent, TaskStatus,
};
use std::time::Duration;
use tempfile::tempdir;

#[tokio::main]
async fn main() -> mod_installer::Result<()> {
    tracing_subscriber::fmt::init();

    let mods_dir = tempdir().unwrap();
    let config = InstallerConfig::new(mods_dir.path()).with_progress_interval(Duration::from_millis(250));
    let manager = DownloadManager::new(config)?;

    // Only terminal states, in the order they happen
    let mut events = manager.subscribe();
    let watcher = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let ProgressEvent::TaskFinished { task } = event {
                let mark = if task.status == TaskStatus::Completed { "ok" } else { "failed" };
                println!("[{}] {}: {}", mark, task.display_name, task.message);
            }
        }
    });

    let requests = vec![
        DownloadRequest::new("https://example.com/files/Graphics.zip", "HD Graphics Pack").with_catalog_id(101),
        DownloadRequest::new("https://example.com/files/Music.o2r", "Orchestral Music").with_catalog_id(102),
        DownloadRequest::new("https://example.com/files/Missing.zip", "Missing Mod").with_catalog_id(103),
    ];

    let results = manager.install_batch(requests, 2).await;
    let installed = results.iter().filter(|result| result.is_ok()).count();
    println!("{} of {} mods installed", installed, results.len());

    for entry in scan_installed(mods_dir.path())? {
        let id = entry.metadata.and_then(|meta| meta.catalog_id);
        println!("  {} (catalog id {:?})", entry.folder.display(), id);
    }

    let snapshot = manager.metrics();
    println!("Downloaded {} bytes, success rate {:.0}%", snapshot.bytes_downloaded, snapshot.success_rate() * 100.0);

    drop(manager);
    let _ = watcher.await;
    Ok(())
}
