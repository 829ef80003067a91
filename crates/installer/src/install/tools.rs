//! Discovery of optional external extraction tools

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Optional tools some archive formats need
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExtractionTool {
    /// 7-Zip (`7zz` / `7z`), needed for .7z and tried first for .rar
    SevenZip,
    /// The Unarchiver CLI, fallback for RAR methods 7-Zip cannot decode
    Unar,
}

impl ExtractionTool {
    pub fn display_name(&self) -> &'static str {
        match self {
            ExtractionTool::SevenZip => "7-Zip",
            ExtractionTool::Unar => "unar",
        }
    }

    pub fn install_hint(&self) -> &'static str {
        match self {
            ExtractionTool::SevenZip => "Install 7-Zip (for example `brew install sevenzip`) and retry",
            ExtractionTool::Unar => "Install The Unarchiver CLI (for example `brew install unar`) and retry",
        }
    }
}

impl fmt::Display for ExtractionTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Ordered candidate locations probed for each tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub seven_zip: Vec<PathBuf>,
    pub unar: Vec<PathBuf>,
}

impl ToolPaths {
    /// No candidates at all; every tool reports as absent
    pub fn none() -> Self {
        Self {
            seven_zip: Vec::new(),
            unar: Vec::new(),
        }
    }

    fn candidates(&self, tool: ExtractionTool) -> &[PathBuf] {
        match tool {
            ExtractionTool::SevenZip => &self.seven_zip,
            ExtractionTool::Unar => &self.unar,
        }
    }
}

const TOOL_DIRS: [&str; 3] = ["/opt/homebrew/bin", "/usr/local/bin", "/usr/bin"];

impl Default for ToolPaths {
    fn default() -> Self {
        let in_tool_dirs = |names: &[&str]| {
            TOOL_DIRS
                .iter()
                .flat_map(|dir| names.iter().map(move |name| Path::new(dir).join(name)))
                .collect::<Vec<_>>()
        };

        Self {
            seven_zip: in_tool_dirs(&["7zz", "7z"]),
            unar: in_tool_dirs(&["unar"]),
        }
    }
}

/// Side-effect free lookup of installed tools
///
/// Probing is a handful of `stat` calls, cheap enough to repeat per extraction
/// so a tool installed while the app runs is picked up on the next attempt.
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    paths: ToolPaths,
}

impl ToolLocator {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    /// First existing candidate for `tool`, if any
    pub fn locate(&self, tool: ExtractionTool) -> Option<PathBuf> {
        self.paths
            .candidates(tool)
            .iter()
            .find(|candidate| candidate.is_file())
            .cloned()
    }

    pub fn is_available(&self, tool: ExtractionTool) -> bool {
        self.locate(tool).is_some()
    }
}
