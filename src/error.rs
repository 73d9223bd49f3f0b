use std::path::PathBuf;
use std::process::ExitStatus;

/// Failures of the scan pipeline and the document store.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("Unknown scan type: {0}")]
    UnknownScanType(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Command '{command}' returned non-zero exit status {status}: {stderr}")]
    ScannerFailed {
        command: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("XML output file not found")]
    MissingReport(PathBuf),
    #[error("malformed scanner report {path}: {source}")]
    Report {
        path: PathBuf,
        #[source]
        source: quick_xml::DeError,
    },
    #[error("invalid profile file {path}: {reason}")]
    Profiles { path: PathBuf, reason: String },
    #[error("No record found for hostname {0}")]
    UnknownHost(String),
    #[error("failed to read or write {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ScanError {
    /// Whether the failure was caused by the request rather than the host.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScanError::InvalidTarget(_))
    }
}

pub type Result<T, E = ScanError> = std::result::Result<T, E>;
