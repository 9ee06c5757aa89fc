//! Byte medium trait definitions.

use crate::error::StorageResult;
use std::sync::Arc;
use std::time::SystemTime;

/// Metadata reported by a medium that exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediumMetadata {
    /// Current length in bytes.
    pub size: u64,
    /// When the medium was created.
    pub created: SystemTime,
    /// When the medium was last modified.
    pub modified: SystemTime,
}

/// A durable, named, dynamically sized byte sequence.
///
/// Media are **opaque byte stores**. They know nothing about locking or
/// streaming; the core serializes access to them and only ever calls these
/// methods from the blocking pool.
///
/// # Invariants
///
/// - `write_bytes` and `set_length` create the medium if it does not exist
/// - `set_length` zero-fills on growth and truncates on shrink
/// - `read_bytes` returns exactly the bytes previously written at that offset
/// - after `unlink`, `exists` is false until the next creating call
///
/// # Implementors
///
/// - [`super::InMemoryMedium`] - For testing and ephemeral stores
/// - [`super::FileMedium`] - For persistent storage
pub trait ByteMedium: Send + Sync {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The medium does not exist
    /// - The read would extend beyond the current length
    /// - An I/O error occurs
    fn read_bytes(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Writes `data` at `offset`, extending the medium if needed.
    ///
    /// Any gap between the old length and `offset` reads back as zeros.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot hold the data or an I/O
    /// error occurs.
    fn write_bytes(&self, offset: u64, data: &[u8]) -> StorageResult<()>;

    /// Grows (zero-filling) or shrinks the medium to exactly `len` bytes.
    ///
    /// On failure the length is left unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the space cannot be provided.
    fn set_length(&self, len: u64) -> StorageResult<()>;

    /// Returns the current length, or `None` if the medium does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the length cannot be determined.
    fn current_length(&self) -> StorageResult<Option<u64>>;

    /// Returns true if the medium exists.
    ///
    /// # Errors
    ///
    /// Returns an error if existence cannot be determined.
    fn exists(&self) -> StorageResult<bool> {
        Ok(self.current_length()?.is_some())
    }

    /// Removes the medium. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns an error if removal fails.
    fn unlink(&self) -> StorageResult<bool>;

    /// Returns size and timestamps, or `None` if the medium does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if metadata cannot be read.
    fn metadata(&self) -> StorageResult<Option<MediumMetadata>>;

    /// Syncs data and metadata to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync operation fails.
    fn sync(&self) -> StorageResult<()>;
}

/// Resolves store names to media.
///
/// Providers hand out the same medium instance for the same name, whether
/// or not it exists yet.
pub trait MediumProvider: Send + Sync {
    /// Returns the medium for `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be prepared.
    fn medium(&self, name: &str) -> StorageResult<Arc<dyn ByteMedium>>;
}
