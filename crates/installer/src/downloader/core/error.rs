//! Error types for the download/extract/install pipeline with context and remediation hints

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::install::tools::ExtractionTool;

/// Every way a pipeline stage can fail
///
/// Lower stages (fetch, extract, validate, install) return these and the
/// [`DownloadManager`](crate::downloader::DownloadManager) is the single place
/// that turns them into task state and user-visible messages.
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP transport failure (connection, TLS, body stream)
    #[error("HTTP request to '{url}' failed")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a non-success status
    #[error("Server returned HTTP {status} for '{url}'")]
    HttpStatus { url: String, status: u16 },

    /// Transfer exceeded the configured ceiling
    #[error("Request to '{url}' timed out after {duration_secs}s")]
    NetworkTimeout { url: String, duration_secs: u64 },

    /// Writing the artifact to scratch space failed mid-transfer
    #[error("Failed writing download to '{path}'")]
    DownloadIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// URL parsing errors
    #[error("Invalid URL '{url}'")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    /// Only http and https are fetched
    #[error("Unsupported URL scheme '{scheme}' in '{url}' (supported: http, https)")]
    UnsupportedUrl { url: String, scheme: String },

    /// Downloaded artifact did not hash to the expected value
    #[error("Checksum mismatch for '{file}': expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    /// Strict mode is on and the request carried no checksum
    #[error("No checksum supplied for '{url}' and checksums are required")]
    ChecksumRequired { url: String },

    /// The extraction tool ran but reported failure
    #[error("Failed to extract '{archive}': {reason}")]
    Extraction { archive: PathBuf, reason: String },

    /// An optional external extraction tool is not installed
    #[error("{tool} is required to extract this archive but was not found")]
    MissingExtractionCapability { tool: ExtractionTool },

    /// Extracted content resolves outside the extraction root
    #[error("Unsafe archive entry '{entry}': {reason}")]
    PathSafetyViolation { entry: PathBuf, reason: String },

    /// Nothing with an installable extension was found
    #[error("No mod files found in '{source_name}'")]
    NoInstallableFiles { source_name: String },

    /// Local file system errors outside the transfer itself
    #[error("Failed {operation} '{path}'")]
    FileSystem {
        path: PathBuf,
        operation: FileOperation,
        #[source]
        source: std::io::Error,
    },

    /// Catalog lookups failed
    #[error("Catalog request failed: {reason}")]
    Catalog { reason: String },

    /// Configuration errors
    #[error("Invalid configuration: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Task cancelled by the caller
    #[error("Download cancelled: {reason}")]
    Cancelled { reason: String },

    /// A background stage panicked or was aborted
    #[error("Background task failed: {reason}")]
    TaskFailed { reason: String },
}

/// Types of file operations for error context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOperation {
    Read,
    Write,
    Create,
    Delete,
    Move,
    Metadata,
    CreateDir,
}

impl fmt::Display for FileOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOperation::Read => write!(f, "reading"),
            FileOperation::Write => write!(f, "writing"),
            FileOperation::Create => write!(f, "creating"),
            FileOperation::Delete => write!(f, "deleting"),
            FileOperation::Move => write!(f, "moving"),
            FileOperation::Metadata => write!(f, "reading metadata of"),
            FileOperation::CreateDir => write!(f, "creating directory"),
        }
    }
}

/// Caller-facing failure taxonomy
///
/// Each kind is terminal; nothing is retried internally. Callers branch on
/// `MissingExtractionCapability` to offer installing the named tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    TransportFailure,
    ChecksumMismatch,
    ExtractionFailure,
    MissingExtractionCapability(ExtractionTool),
    PathSafetyViolation,
    NoInstallableFiles,
    FileSystem,
    InvalidRequest,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::TransportFailure => write!(f, "transport failure"),
            FailureKind::ChecksumMismatch => write!(f, "checksum mismatch"),
            FailureKind::ExtractionFailure => write!(f, "extraction failure"),
            FailureKind::MissingExtractionCapability(tool) => write!(f, "missing {tool}"),
            FailureKind::PathSafetyViolation => write!(f, "path safety violation"),
            FailureKind::NoInstallableFiles => write!(f, "no mod files found"),
            FailureKind::FileSystem => write!(f, "file system error"),
            FailureKind::InvalidRequest => write!(f, "invalid request"),
            FailureKind::Cancelled => write!(f, "cancelled"),
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;

impl DownloadError {
    /// Map to the caller-facing taxonomy
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::Transport { .. }
            | DownloadError::HttpStatus { .. }
            | DownloadError::NetworkTimeout { .. }
            | DownloadError::DownloadIo { .. }
            | DownloadError::Catalog { .. } => FailureKind::TransportFailure,
            DownloadError::ChecksumMismatch { .. } => FailureKind::ChecksumMismatch,
            DownloadError::Extraction { .. } => FailureKind::ExtractionFailure,
            DownloadError::MissingExtractionCapability { tool } => {
                FailureKind::MissingExtractionCapability(*tool)
            }
            DownloadError::PathSafetyViolation { .. } => FailureKind::PathSafetyViolation,
            DownloadError::NoInstallableFiles { .. } => FailureKind::NoInstallableFiles,
            DownloadError::FileSystem { .. } | DownloadError::TaskFailed { .. } => {
                FailureKind::FileSystem
            }
            DownloadError::InvalidUrl { .. }
            | DownloadError::UnsupportedUrl { .. }
            | DownloadError::ChecksumRequired { .. }
            | DownloadError::Configuration { .. } => FailureKind::InvalidRequest,
            DownloadError::Cancelled { .. } => FailureKind::Cancelled,
        }
    }

    /// True for rejections that indicate a potentially hostile archive
    pub fn is_security_violation(&self) -> bool {
        matches!(self, DownloadError::PathSafetyViolation { .. })
    }

    /// Get error category for metrics and logging
    pub fn category(&self) -> &'static str {
        match self {
            DownloadError::Transport { .. } => "transport",
            DownloadError::HttpStatus { .. } => "http_status",
            DownloadError::NetworkTimeout { .. } => "network_timeout",
            DownloadError::DownloadIo { .. } => "download_io",
            DownloadError::InvalidUrl { .. } => "invalid_url",
            DownloadError::UnsupportedUrl { .. } => "unsupported_url",
            DownloadError::ChecksumMismatch { .. } => "checksum_mismatch",
            DownloadError::ChecksumRequired { .. } => "checksum_required",
            DownloadError::Extraction { .. } => "extraction",
            DownloadError::MissingExtractionCapability { .. } => "missing_extraction_capability",
            DownloadError::PathSafetyViolation { .. } => "path_safety_violation",
            DownloadError::NoInstallableFiles { .. } => "no_installable_files",
            DownloadError::FileSystem { .. } => "file_system",
            DownloadError::Catalog { .. } => "catalog",
            DownloadError::Configuration { .. } => "configuration",
            DownloadError::Cancelled { .. } => "cancelled",
            DownloadError::TaskFailed { .. } => "task_failed",
        }
    }

    /// Get severity level for error prioritization
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            DownloadError::Transport { .. }
            | DownloadError::HttpStatus { .. }
            | DownloadError::NetworkTimeout { .. }
            | DownloadError::Catalog { .. } => ErrorSeverity::Medium,
            DownloadError::NoInstallableFiles { .. } | DownloadError::Cancelled { .. } => {
                ErrorSeverity::Low
            }
            DownloadError::PathSafetyViolation { .. } => ErrorSeverity::Critical,
            _ => ErrorSeverity::High,
        }
    }

    /// Get user-friendly suggestion for resolving the error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            DownloadError::NetworkTimeout { .. } | DownloadError::Transport { .. } => {
                Some("Check your internet connection and start the download again")
            }
            DownloadError::ChecksumMismatch { .. } => {
                Some("The file was corrupted or altered in transit; download it again")
            }
            DownloadError::MissingExtractionCapability { tool } => Some(tool.install_hint()),
            DownloadError::PathSafetyViolation { .. } => {
                Some("The archive tried to write outside its folder and was rejected; report it to the catalog")
            }
            DownloadError::NoInstallableFiles { .. } => {
                Some("The download contained no .otr or .o2r files; it may need manual installation")
            }
            _ => None,
        }
    }

    /// Create a detailed error report for debugging
    pub fn detailed_report(&self) -> String {
        let mut report = format!("Error: {}\n", self);
        report.push_str(&format!("Kind: {}\n", self.kind()));
        report.push_str(&format!("Category: {}\n", self.category()));
        report.push_str(&format!("Severity: {:?}\n", self.severity()));

        if let Some(suggestion) = self.suggestion() {
            report.push_str(&format!("Suggestion: {}\n", suggestion));
        }

        if let Some(source) = self.source() {
            report.push_str(&format!("Root cause: {}\n", source));
        }

        report
    }

    pub(crate) fn fs(path: impl Into<PathBuf>, operation: FileOperation, source: std::io::Error) -> Self {
        DownloadError::FileSystem {
            path: path.into(),
            operation,
            source,
        }
    }
}

/// Error severity levels for prioritization
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_tool_keeps_its_own_kind() {
        let err = DownloadError::MissingExtractionCapability {
            tool: ExtractionTool::SevenZip,
        };
        assert_eq!(
            err.kind(),
            FailureKind::MissingExtractionCapability(ExtractionTool::SevenZip)
        );
        assert_ne!(err.kind(), FailureKind::ExtractionFailure);
        assert_eq!(err.to_string(), "7-Zip is required to extract this archive but was not found");
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn http_errors_are_transport_failures() {
        let err = DownloadError::HttpStatus {
            url: "https://example.com/a.zip".into(),
            status: 404,
        };
        assert_eq!(err.kind(), FailureKind::TransportFailure);
        assert_eq!(err.category(), "http_status");
    }

    #[test]
    fn path_safety_is_critical() {
        let err = DownloadError::PathSafetyViolation {
            entry: PathBuf::from("../evil.otr"),
            reason: "escapes root".into(),
        };
        assert!(err.is_security_violation());
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.detailed_report().contains("path_safety_violation"));
    }

    #[test]
    fn file_system_error_reports_root_cause() {
        let err = DownloadError::fs(
            "/mods/CoolMod",
            FileOperation::CreateDir,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), FailureKind::FileSystem);
        assert!(err.to_string().contains("creating directory"));
        assert!(err.detailed_report().contains("Root cause: denied"));
    }
}
