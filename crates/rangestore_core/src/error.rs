//! Error types for rangestore core.

use rangestore_storage::StorageError;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in rangestore core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage medium error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// The store does not exist and the operation requires it.
    #[error("store not found: {name}")]
    NotFound {
        /// Name of the store.
        name: String,
    },

    /// Offsets are malformed or out of bounds after resolution.
    #[error("invalid range [{start}, {end}) for store {name} of length {length}")]
    InvalidRange {
        /// Name of the store.
        name: String,
        /// Resolved start offset.
        start: i64,
        /// Resolved end offset, or `"∞"` when open-ended.
        end: String,
        /// Store length the offsets were resolved against.
        length: u64,
    },

    /// The medium could not grow or shrink the store.
    #[error("allocation of {requested} bytes failed for store {name}: {source}")]
    AllocationFailure {
        /// Name of the store.
        name: String,
        /// The length that was requested.
        requested: u64,
        /// The underlying storage failure.
        #[source]
        source: StorageError,
    },

    /// More bytes were offered than the bounded range permits.
    #[error("write overflow on store {name}: range holds {capacity} bytes")]
    WriteOverflow {
        /// Name of the store.
        name: String,
        /// Number of bytes the range holds.
        capacity: u64,
    },

    /// Lock acquisition did not complete within the configured timeout.
    #[error("timed out waiting for lock on store {name}")]
    LockTimeout {
        /// Name of the store.
        name: String,
    },

    /// The lock backing this stream was forcibly released.
    #[error("lock on store {name} was revoked")]
    LockRevoked {
        /// Name of the store.
        name: String,
    },

    /// The session already reached a terminal state.
    #[error("session is closed")]
    SessionClosed,

    /// The caller aborted the stream.
    #[error("aborted: {reason}")]
    Aborted {
        /// Reason given by the caller.
        reason: String,
    },

    /// A blocking I/O task panicked or was cancelled.
    #[error("I/O task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl CoreError {
    /// Creates a not found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Creates an invalid range error.
    pub fn invalid_range(
        name: impl Into<String>,
        start: i64,
        end: Option<i64>,
        length: u64,
    ) -> Self {
        Self::InvalidRange {
            name: name.into(),
            start,
            end: end.map_or_else(|| "∞".to_string(), |end| end.to_string()),
            length,
        }
    }

    /// Creates an allocation failure error.
    pub fn allocation_failure(
        name: impl Into<String>,
        requested: u64,
        source: StorageError,
    ) -> Self {
        Self::AllocationFailure {
            name: name.into(),
            requested,
            source,
        }
    }

    /// Creates a write overflow error.
    pub fn write_overflow(name: impl Into<String>, capacity: u64) -> Self {
        Self::WriteOverflow {
            name: name.into(),
            capacity,
        }
    }

    /// Creates a lock timeout error.
    pub fn lock_timeout(name: impl Into<String>) -> Self {
        Self::LockTimeout { name: name.into() }
    }

    /// Creates a lock revoked error.
    pub fn lock_revoked(name: impl Into<String>) -> Self {
        Self::LockRevoked { name: name.into() }
    }

    /// Creates an aborted error.
    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted {
            reason: reason.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    ///
    /// The core never retries on its own.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }
}
