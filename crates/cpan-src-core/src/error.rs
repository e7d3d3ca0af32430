//! Error types for cpan-src.
//!
//! Errors fall into two groups. Fatal errors abort the session: a missing
//! prerequisite, an unresolvable install root, or a watch subscription that
//! could not be established. Everything else is logged and absorbed by the
//! component that detected it, and only surfaces here so it can be logged
//! with a consistent message.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the cpan-src library.
#[derive(Debug, Error)]
pub enum CpanSrcError {
    // Startup errors
    #[error("you need to install {tool} in advance")]
    MissingPrerequisite { tool: String },

    #[error("failed to retrieve the install dir of Perl modules: {message}")]
    InstallRoot { message: String },

    // Watch errors
    #[error("failed to start watching {path:?}: {source}")]
    WatchSubscription {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },

    #[error("watch source error: {0}")]
    WatchSource(#[from] notify::Error),

    // Installer errors
    #[error("failed to spawn {program}: {source}")]
    InstallerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with status: {code}")]
    InstallerFailed { program: String, code: i32 },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    #[error("{0}")]
    Other(String),
}

/// Result type alias for cpan-src operations.
pub type Result<T> = std::result::Result<T, CpanSrcError>;

impl From<std::io::Error> for CpanSrcError {
    fn from(err: std::io::Error) -> Self {
        CpanSrcError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl CpanSrcError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        CpanSrcError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a watch subscription error for `path`.
    pub fn subscription(err: notify::Error, path: impl Into<PathBuf>) -> Self {
        CpanSrcError::WatchSubscription {
            path: path.into(),
            source: err,
        }
    }

    /// Whether this error terminates the session.
    ///
    /// A watch that cannot be established means events under that directory
    /// would be missed silently, so it is fatal alongside the startup errors.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CpanSrcError::MissingPrerequisite { .. }
                | CpanSrcError::InstallRoot { .. }
                | CpanSrcError::WatchSubscription { .. }
        )
    }
}
