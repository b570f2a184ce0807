//! Error types for mirrorkit-core.

use std::time::Duration;

use miette::Diagnostic;
use mirrorkit_config::error::ConfigError;
use mirrorkit_db::error::DbError;
use mirrorkit_dl::error::DownloadError;
use mirrorkit_utils::error::{FileSystemError, HashError, LockError};
use thiserror::Error;

use crate::verify::VerifyError;

#[derive(Error, Diagnostic, Debug)]
pub enum MirrorError {
    #[error("[{mirror}] failed to retrieve {url}")]
    #[diagnostic(
        code(mirrorkit::transport),
        help("Check network access to the archive, then retry the update")
    )]
    Transport {
        mirror: String,
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("[{mirror}] signature check failed for {url}: {reason}")]
    #[diagnostic(
        code(mirrorkit::authenticity),
        help("Check the configured keyrings, or pass --ignore-signatures to skip verification")
    )]
    Authenticity {
        mirror: String,
        url: String,
        reason: String,
    },

    #[error("[{mirror}] malformed {location}: {reason}")]
    #[diagnostic(code(mirrorkit::parse))]
    Parse {
        mirror: String,
        location: String,
        reason: String,
    },

    #[error("[{mirror}] {kind} mismatch for {url}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(mirrorkit::checksum_mismatch),
        help("The archive may be mid-sync. Retry later, or pass --ignore-checksums")
    )]
    ChecksumMismatch {
        mirror: String,
        url: String,
        kind: &'static str,
        expected: String,
        actual: String,
    },

    #[error("Mirror `{0}` already exists")]
    #[diagnostic(
        code(mirrorkit::duplicate_name),
        help("Pick another name or drop the existing mirror first")
    )]
    DuplicateName(String),

    #[error("Mirror `{0}` not found")]
    #[diagnostic(code(mirrorkit::not_found), help("Run `mirrorkit mirror list`"))]
    NotFound(String),

    #[error("Mirror `{mirror}` is used by snapshots: {}", .snapshots.join(", "))]
    #[diagnostic(
        code(mirrorkit::referenced),
        help("Drop those snapshots first, or use --force")
    )]
    Referenced {
        mirror: String,
        snapshots: Vec<String>,
    },

    #[error("[{mirror}] failed to download package {package} from {url}")]
    #[diagnostic(code(mirrorkit::fetch))]
    Fetch {
        mirror: String,
        package: String,
        url: String,
        #[source]
        source: DownloadError,
    },

    #[error("Mirror `{0}` has no Release data yet")]
    #[diagnostic(code(mirrorkit::not_fetched), help("Fetch the mirror before downloading"))]
    NotFetched(String),

    #[error("Mirror `{0}` has not been downloaded yet")]
    #[diagnostic(
        code(mirrorkit::not_downloaded),
        help("Run `mirrorkit mirror update` first")
    )]
    NotDownloaded(String),

    #[error("[{mirror}] {kind} `{value}` is not in the Release file")]
    #[diagnostic(
        code(mirrorkit::unavailable),
        help("Available: {}", .available.join(", "))
    )]
    Unavailable {
        mirror: String,
        kind: &'static str,
        value: String,
        available: Vec<String>,
    },

    #[error("[{mirror}] download did not finish within {after:?}")]
    #[diagnostic(
        code(mirrorkit::timeout),
        help("Raise `update_deadline` in the configuration")
    )]
    Timeout { mirror: String, after: Duration },

    #[error("Invalid mirror: {0}")]
    #[diagnostic(code(mirrorkit::invalid_mirror))]
    InvalidMirror(String),

    #[error("Snapshot `{0}` already exists")]
    #[diagnostic(code(mirrorkit::duplicate_snapshot))]
    DuplicateSnapshot(String),

    #[error("Snapshot `{0}` not found")]
    #[diagnostic(code(mirrorkit::snapshot_not_found))]
    SnapshotNotFound(String),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Verifier(#[from] VerifyError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(code(mirrorkit::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(mirrorkit::hash))]
    Hash(#[from] HashError),

    #[error(transparent)]
    #[diagnostic(
        code(mirrorkit::lock),
        help("Another process may be updating the same mirror")
    )]
    Lock(#[from] LockError),

    #[error("Stored data is not valid JSON: {0}")]
    #[diagnostic(code(mirrorkit::json))]
    Json(#[from] serde_json::Error),

    #[error("Error while {action}")]
    #[diagnostic(code(mirrorkit::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to acquire lock")]
    #[diagnostic(code(mirrorkit::poison))]
    PoisonError,

    #[error("{0}")]
    #[diagnostic(code(mirrorkit::custom))]
    Custom(String),
}

impl From<diesel::result::Error> for MirrorError {
    fn from(err: diesel::result::Error) -> Self {
        MirrorError::Database(DbError::from(err))
    }
}

impl<T> From<std::sync::PoisonError<T>> for MirrorError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::PoisonError
    }
}

impl MirrorError {
    /// Name of the mirror the error is about, if any.
    pub fn mirror(&self) -> Option<&str> {
        match self {
            MirrorError::Transport { mirror, .. }
            | MirrorError::Authenticity { mirror, .. }
            | MirrorError::Parse { mirror, .. }
            | MirrorError::ChecksumMismatch { mirror, .. }
            | MirrorError::Referenced { mirror, .. }
            | MirrorError::Fetch { mirror, .. }
            | MirrorError::Unavailable { mirror, .. }
            | MirrorError::Timeout { mirror, .. } => Some(mirror),
            MirrorError::DuplicateName(mirror)
            | MirrorError::NotFound(mirror)
            | MirrorError::NotFetched(mirror)
            | MirrorError::NotDownloaded(mirror) => Some(mirror),
            _ => None,
        }
    }
}

pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, MirrorError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, MirrorError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            MirrorError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

pub type Result<T> = std::result::Result<T, MirrorError>;
