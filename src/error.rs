//! Launcher error taxonomy
//!
//! Every pipeline component returns [`LauncherError`]. The orchestrator catches
//! these at the step boundary and turns them into a state transition plus a
//! message for the observer; nothing escapes a background task.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Result alias used by all pipeline components.
pub type Result<T, E = LauncherError> = std::result::Result<T, E>;

/// Coarse classification of a [`LauncherError`], used for status reporting and audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Io,
    Archive,
    PathTraversal,
    Spawn,
    Cancelled,
    Account,
}

/// Errors produced by the update and launch pipeline.
#[derive(Debug, Error)]
pub enum LauncherError {
    /// Connection, DNS, TLS or HTTP status failure.
    #[error("network request to {url} failed: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// No bytes arrived for longer than the inactivity timeout.
    #[error("no data received from {url} for {secs} seconds ({bytes_read} bytes read)")]
    Stalled {
        url: String,
        secs: u64,
        bytes_read: u64,
    },

    /// The body ended before the declared content length was reached.
    #[error("download from {url} ended after {bytes_read} of {expected} bytes")]
    Truncated {
        url: String,
        bytes_read: u64,
        expected: u64,
    },

    /// Filesystem failure.
    #[error("{operation} failed for {}: {source}", .path.display())]
    Io {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A persisted record could not be parsed or serialised.
    #[error("{operation} failed for {}: {source}", .path.display())]
    Json {
        operation: &'static str,
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Corrupt, truncated or unreadable archive.
    #[error("archive {} is unreadable: {reason}", .path.display())]
    Archive { path: PathBuf, reason: String },

    /// An archive entry would be written outside the extraction root.
    #[error("archive entry {entry:?} escapes the install directory")]
    PathTraversal { entry: String },

    /// An archive entry type the installer refuses to materialise (symlinks, devices).
    #[error("archive entry {entry:?} has unsupported type {kind}")]
    UnsupportedEntry { entry: String, kind: String },

    /// The child process could not be started.
    #[error("failed to start {}: {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The step was cancelled through its cancellation token.
    #[error("{operation} cancelled")]
    Cancelled { operation: &'static str },

    #[error("no account with id or name {0:?}")]
    UnknownAccount(String),

    #[error("invalid username {0:?}")]
    InvalidUsername(String),

    /// The remote version source returned something that is not a marker.
    #[error("version source {source_name} returned an unusable version: {reason}")]
    InvalidVersion {
        source_name: String,
        reason: &'static str,
    },
}

impl LauncherError {
    pub(crate) fn io(operation: &'static str, path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn json(
        operation: &'static str,
        path: impl AsRef<Path>,
        source: serde_json::Error,
    ) -> Self {
        Self::Json {
            operation,
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    pub(crate) fn archive(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::Archive {
            path: path.as_ref().to_path_buf(),
            reason: reason.to_string(),
        }
    }

    /// Map onto the pipeline's error taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Network { .. }
            | Self::Stalled { .. }
            | Self::Truncated { .. }
            | Self::InvalidVersion { .. } => ErrorKind::Network,
            Self::Io { .. } | Self::Json { .. } => ErrorKind::Io,
            Self::Archive { .. } | Self::UnsupportedEntry { .. } => ErrorKind::Archive,
            Self::PathTraversal { .. } => ErrorKind::PathTraversal,
            Self::Spawn { .. } => ErrorKind::Spawn,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::UnknownAccount(_) | Self::InvalidUsername(_) => ErrorKind::Account,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
