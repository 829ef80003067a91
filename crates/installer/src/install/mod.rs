//! Installation module
//!
//! Everything that happens after the artifact is on disk: extraction, tree
//! validation, payload selection, placement into the mods directory and the
//! provenance sidecar.

pub mod classify;
pub mod extract;
pub mod metadata;
pub mod planner;
pub mod safety;
pub mod sanitize;
pub mod tools;

// Re-export commonly used types
pub use classify::{collect_mod_files, is_installable, MOD_EXTENSIONS};
pub use extract::{ArchiveExtractor, ArchiveKind};
pub use metadata::{read_metadata, scan_installed, write_metadata, InstalledMod, ModMetadata, METADATA_FILE_NAME};
pub use planner::install_files;
pub use safety::validate_extraction_root;
pub use sanitize::sanitize_folder_name;
pub use tools::{ExtractionTool, ToolLocator, ToolPaths};
