//! Example demonstrating a single mod install
//!
//! Downloads an archive, verifies it and installs its mod files into a
//! temporary mods directory, printing progress as it goes.
//!
//! Run this example with:
//! ```
//! cargo run --example install_example -- <url> <name>
//! ```

use mod_installer::{
    spawn_reporter, ConsoleProgressReporter, DownloadManager, DownloadRequest, InstallerConfig,
};
use tempfile::tempdir;

#[tokio::main]
async fn main() -> mod_installer::Result<()> {
    tracing_subscriber::fmt::init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .unwrap_or_else(|| "https://example.com/files/CoolMod.zip".to_string());
    let name = args.next().unwrap_or_else(|| "CoolMod".to_string());

    let mods_dir = tempdir().unwrap();
    println!("Mods directory: {}", mods_dir.path().display());

    let manager = DownloadManager::new(InstallerConfig::new(mods_dir.path()))?;
    let reporter = spawn_reporter(manager.subscribe(), ConsoleProgressReporter::new(true));

    match manager.install(DownloadRequest::new(url, name)).await {
        Ok(outcome) => {
            println!("Installed into {}:", outcome.folder.display());
            for file in &outcome.installed {
                println!("  {}", file.display());
            }
        }
        Err(e) => println!("{}", e.detailed_report()),
    }

    drop(manager);
    let _ = reporter.await;
    Ok(())
}
