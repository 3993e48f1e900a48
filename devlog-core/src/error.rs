use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Bad caller input. Raised only while building a query, never afterwards.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),
    #[error("invalid device_id '{value}': only letters, digits, '_' and '-' are allowed (1-{max} characters)")]
    InvalidDeviceId { value: String, max: usize },
    #[error("keyword is {length} characters long, the maximum is {max}")]
    KeywordTooLong { length: usize, max: usize },
    #[error("lines must be an integer between 1 and {max}, got '{value}'")]
    InvalidLineCount { value: String, max: u32 },
    #[error("invalid {field}: {reason}")]
    InvalidTimeFormat { field: &'static str, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceResolutionError {
    #[error("unknown environment: {0}")]
    UnknownEnvironment(String),
    #[error("unknown log type '{name}' for environment '{environment}'")]
    UnknownLogSource { name: String, environment: String },
}

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("log file does not exist: {}", path.display())]
    SourceNotFound { path: PathBuf },
    #[error("cannot open log file {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("error while reading {}: {source}", path.display())]
    ScanFailed {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("scan of {} was cancelled", path.display())]
    Cancelled { path: PathBuf },
}

impl ScanError {
    pub fn path(&self) -> &PathBuf {
        match self {
            ScanError::SourceNotFound { path }
            | ScanError::SourceUnreadable { path, .. }
            | ScanError::ScanFailed { path, .. }
            | ScanError::Cancelled { path } => path,
        }
    }
}

/// Failures that abort a query. Analysis failures are deliberately absent:
/// they degrade the report instead.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Resolution(#[from] SourceResolutionError),
    #[error("{error}")]
    Scan {
        device_id: String,
        #[source]
        error: ScanError,
    },
}

impl QueryError {
    /// Caller-facing text, with remediation hints for scan failures.
    pub fn user_message(&self) -> String {
        match self {
            QueryError::Validation(e) => format!("❌ **Invalid parameter**: {}", e),
            QueryError::Resolution(e) => format!("❌ **Unknown target**: {}", e),
            QueryError::Scan { device_id, error } => format!(
                "❌ **Failed to read log file**\n\n\
                 **Log file**: {}\n\
                 **Device ID**: {}\n\
                 **Error**: {}\n\n\
                 **Suggestions**:\n\
                 - Check that the log file exists\n\
                 - Confirm the server may read it\n\
                 - Verify the device ID is correct",
                error.path().display(),
                device_id,
                error
            ),
        }
    }
}
