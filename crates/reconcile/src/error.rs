//! Error types for reconciliation.
//!
//! Every fatal condition stops the whole run. Errors are categorized so the
//! caller can tell a broken document apart from a failing backend.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed document, missing field, unresolvable reference.
    Input,
    /// Collector configuration does not match the collector's schema.
    Validation,
    /// The backend rejected a request or could not be reached.
    Remote,
    /// The token is not allowed to apply changes.
    Permission,
    /// Local file access failed.
    Io,
}

impl ErrorCategory {
    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Input => "Invalid input document",
            Self::Validation => "Invalid collector configuration",
            Self::Remote => "Remote call failed",
            Self::Permission => "Insufficient permissions",
            Self::Io => "File access failed",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::Input => "Fix the document and run again",
            Self::Validation => "Compare the configuration with the collector options",
            Self::Remote => "Check the API address, your connection and the response details",
            Self::Permission => "Use a token with asset and container management permissions",
            Self::Io => "Check the path and its permissions",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while reconciling a container.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error while reading a document or cache file.
    #[error("failed to read '{}': {source}", .path.display())]
    Io {
        /// Path involved in the error.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },

    /// The document could not be decoded.
    #[error("failed to parse '{}': {message}", .path.display())]
    Parse {
        /// Document path.
        path: PathBuf,
        /// Decoder message.
        message: String,
    },

    /// The document extension does not select a known format.
    #[error("expecting a .json or .yml/.yaml file: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    /// Fatal input error in the target document.
    #[error("{0}")]
    Invalid(String),

    /// A target asset with an ID does not exist in the current state.
    #[error("asset ID {asset_id} not found in container '{container}'")]
    AssetNotFound {
        /// Asset ID from the document.
        asset_id: u64,
        /// Container display name.
        container: String,
    },

    /// Collector configuration does not match the collector schema.
    #[error("collector '{collector}' on asset '{asset}' {message}")]
    Validation {
        /// Collector key.
        collector: String,
        /// Asset display name.
        asset: String,
        /// What is wrong.
        message: String,
    },

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Invalid response from the API.
    #[error("invalid API response: {0}")]
    InvalidResponse(String),

    /// A remote mutation failed.
    #[error("failed to {operation} ({message})")]
    Remote {
        /// What was attempted, e.g. "upsert zone 3".
        operation: String,
        /// Underlying failure.
        message: String,
    },

    /// The token misses permissions required for apply.
    #[error("token is missing the following permissions: {}", .0.join(", "))]
    MissingPermissions(Vec<String>),

    /// Reading a confirmation from the user failed.
    #[error("failed to read confirmation: {0}")]
    Prompt(#[source] io::Error),

    /// The executor halted on a change.
    #[error("change {index}/{total} failed ({description}): {source}")]
    ChangeFailed {
        /// One-based position of the change.
        index: usize,
        /// Number of changes in the run.
        total: usize,
        /// Change description.
        description: String,
        /// Underlying failure.
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Create an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an HTTP error.
    pub fn http(message: impl Into<String>, status: Option<u16>) -> Self {
        Self::Http {
            message: message.into(),
            status,
        }
    }

    /// Create a fatal input error.
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Create a remote mutation error.
    pub fn remote(operation: impl Into<String>, source: &Error) -> Self {
        Self::Remote {
            operation: operation.into(),
            message: source.to_string(),
        }
    }

    /// Get the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::Io { .. } | Error::Prompt(_) => ErrorCategory::Io,
            Error::Parse { .. }
            | Error::UnsupportedFormat(_)
            | Error::Invalid(_)
            | Error::AssetNotFound { .. } => ErrorCategory::Input,
            Error::Validation { .. } => ErrorCategory::Validation,
            Error::Http { .. } | Error::InvalidResponse(_) | Error::Remote { .. } => {
                ErrorCategory::Remote
            }
            Error::MissingPermissions(_) => ErrorCategory::Permission,
            Error::ChangeFailed { source, .. } => source.category(),
        }
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::http(format!("HTTP {code}"), Some(code)),
            other => Self::http(other.to_string(), None),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}
