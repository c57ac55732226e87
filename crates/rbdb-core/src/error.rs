//! Library error handling
//!
//! Provides typed errors for every failure the access layer reports:
//! caller mistakes (validation, missing rows), unreadable or protected
//! files, and storage-engine failures during a unit of work.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

use crate::mirror::MirrorError;

/// Errors that can occur while opening or mutating a library database
#[derive(Error, Debug)]
pub enum Error {
    /// Caller supplied an invalid argument; nothing was staged
    #[error("Invalid argument: {0}")]
    Validation(String),

    /// A referenced row does not exist
    #[error("{kind} with ID '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// File exists but is not a usable library database
    #[error("Invalid database format in '{path}': {details}")]
    Format { path: PathBuf, details: String },

    /// The protected database could not be decrypted
    #[error("Failed to unlock database: {0}")]
    Decryption(String),

    /// The storage engine failed while committing a unit of work
    #[error("Transaction failed and was rolled back: {0}")]
    Transaction(#[source] rusqlite::Error),

    /// SQLite database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Master playlist mirror could not be read or written
    #[error("Playlist mirror error: {0}")]
    Mirror(#[from] MirrorError),

    /// Permission denied accessing path
    #[error("Permission denied: cannot access '{path}'. Check file permissions.")]
    PermissionDenied {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Disk is full or quota exceeded
    #[error(
        "Disk full or quota exceeded while writing to '{path}'. Free up disk space and try again."
    )]
    DiskFull {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to read file
    #[error("Failed to read '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Failed to write file
    #[error("Failed to write '{path}': {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// File not found (when expected to exist)
    #[error("File not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Create a not-found error for a row of the given kind
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an error from an I/O error with path context
    ///
    /// Classifies the error based on its kind (permission, disk full, etc.)
    pub fn from_io(error: io::Error, path: PathBuf) -> Self {
        match error.kind() {
            io::ErrorKind::PermissionDenied => Error::PermissionDenied {
                path,
                source: error,
            },
            io::ErrorKind::NotFound => Error::FileNotFound { path },
            _ if is_disk_full_error(&error) => Error::DiskFull {
                path,
                source: error,
            },
            _ => Error::WriteError {
                path,
                source: error,
            },
        }
    }

    /// Same as [`Error::from_io`] but reports unclassified errors as reads
    pub fn from_io_read(error: io::Error, path: PathBuf) -> Self {
        match Self::from_io(error, path) {
            Error::WriteError { path, source } => Error::ReadError { path, source },
            other => other,
        }
    }

    /// Whether the error was caused by the caller rather than the environment
    pub fn is_caller_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::NotFound { .. })
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Error::DiskFull { .. } => Some("Free up disk space and try again."),
            Error::PermissionDenied { .. } => {
                Some("Check file and directory permissions. The library may be open in another application.")
            }
            Error::Decryption(_) => {
                Some("Check the configured key (RBDB_KEY) or open the database without unlocking.")
            }
            Error::Transaction(_) => Some("No changes were applied. Retry the whole operation."),
            _ => None,
        }
    }
}

/// Check if an I/O error indicates disk full condition
fn is_disk_full_error(error: &io::Error) -> bool {
    let msg = error.to_string().to_lowercase();
    msg.contains("no space left")
        || msg.contains("disk full")
        || msg.contains("quota exceeded")
        || msg.contains("not enough space")
}

/// Result type for library operations
pub type Result<T> = std::result::Result<T, Error>;
