//! Error types for storage operations.

use std::io;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Attempted to read beyond the end of the medium.
    #[error("read beyond end of medium: offset {offset}, len {len}, size {size}")]
    ReadPastEnd {
        /// The requested read offset.
        offset: u64,
        /// The requested read length.
        len: usize,
        /// The current medium size.
        size: u64,
    },

    /// The medium does not exist.
    #[error("medium does not exist")]
    NotFound,

    /// The medium cannot provide the requested space.
    #[error("no space: requested {requested} bytes, limit {limit}")]
    NoSpace {
        /// The length that was requested.
        requested: u64,
        /// The maximum length the medium can hold.
        limit: u64,
    },

    /// Another process holds the storage directory.
    #[error("storage directory locked by another process")]
    Locked,
}

impl StorageError {
    /// Returns true if the error means the medium ran out of space.
    #[must_use]
    pub fn is_out_of_space(&self) -> bool {
        match self {
            Self::NoSpace { .. } => true,
            // ENOSPC on unix, ERROR_DISK_FULL on windows
            Self::Io(err) => matches!(err.raw_os_error(), Some(28) | Some(112)),
            _ => false,
        }
    }
}
