//! Command line front end for the mod installer

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mod_installer::install::ToolLocator;
use mod_installer::{
    scan_installed, spawn_reporter, ConsoleProgressReporter, DownloadManager, DownloadRequest, ExtractionTool,
    InstallerConfig, ToolPaths,
};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modinstall")]
#[command(about = "Download and install game mods")]
struct Args {
    /// Log pipeline detail
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Download a mod and install it into the mods directory
    Install {
        /// Direct download URL
        url: String,

        /// Mod name; also names the destination folder
        #[arg(long)]
        name: String,

        /// Catalog id recorded for update checks
        #[arg(long)]
        catalog_id: Option<u64>,

        /// Expected MD5 of the download
        #[arg(long, value_name = "HEX")]
        checksum: Option<String>,

        /// File name of the download (defaults to the URL's last segment)
        #[arg(long)]
        filename: Option<String>,

        /// Refuse downloads that have no checksum
        #[arg(long)]
        require_checksum: bool,

        /// Managed mods directory
        #[arg(long, default_value = "./mods")]
        mods_dir: PathBuf,
    },

    /// List installed mod folders and where they came from
    List {
        /// Managed mods directory
        #[arg(long, default_value = "./mods")]
        mods_dir: PathBuf,
    },

    /// Show which optional extraction tools were found
    Tools,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<()> {
    match args.command {
        Commands::Install {
            url,
            name,
            catalog_id,
            checksum,
            filename,
            require_checksum,
            mods_dir,
        } => {
            let config = InstallerConfig::new(mods_dir).with_require_checksum(require_checksum);
            let manager = DownloadManager::new(config).context("invalid installer configuration")?;
            let reporter = spawn_reporter(manager.subscribe(), ConsoleProgressReporter::new(args.verbose));

            let mut request = DownloadRequest::new(url, name);
            if let Some(id) = catalog_id {
                request = request.with_catalog_id(id);
            }
            if let Some(checksum) = checksum {
                request = request.with_checksum(checksum);
            }
            if let Some(filename) = filename {
                request = request.with_filename(filename);
            }

            let result = manager.install(request).await;

            // Closing the channel lets the reporter print the last events and exit
            drop(manager);
            reporter.await.context("progress reporter stopped unexpectedly")?;

            match result {
                Ok(outcome) => {
                    for path in &outcome.installed {
                        println!("  {}", path.display());
                    }
                    Ok(())
                }
                Err(e) => {
                    if let Some(suggestion) = e.suggestion() {
                        eprintln!("Hint: {}", suggestion);
                    }
                    Err(e.into())
                }
            }
        }
        Commands::List { mods_dir } => {
            let installed = scan_installed(&mods_dir)
                .with_context(|| format!("failed to read {}", mods_dir.display()))?;
            if installed.is_empty() {
                println!("No mods installed in {}", mods_dir.display());
            }
            for entry in installed {
                let folder = entry
                    .folder
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default();
                match entry.metadata {
                    Some(meta) => {
                        let id = meta.catalog_id.map_or_else(|| "-".to_string(), |id| id.to_string());
                        println!(
                            "{:<40} catalog {:<10} installed {}",
                            folder,
                            id,
                            meta.installed_at.format("%Y-%m-%d %H:%M")
                        );
                    }
                    None => println!("{:<40} (no metadata)", folder),
                }
            }
            Ok(())
        }
        Commands::Tools => {
            let locator = ToolLocator::new(ToolPaths::default());
            for tool in [ExtractionTool::SevenZip, ExtractionTool::Unar] {
                match locator.locate(tool) {
                    Some(path) => println!("{:<6} {}", tool.to_string(), path.display()),
                    None => println!("{:<6} not found ({})", tool.to_string(), tool.install_hint()),
                }
            }
            Ok(())
        }
    }
}
