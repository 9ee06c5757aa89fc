//! In-memory media for testing and ephemeral stores.

use crate::error::{StorageError, StorageResult};
use crate::medium::{ByteMedium, MediumMetadata, MediumProvider};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::SystemTime;

#[derive(Debug)]
struct MemoryState {
    data: Vec<u8>,
    created: SystemTime,
    modified: SystemTime,
}

impl MemoryState {
    fn new() -> Self {
        let now = SystemTime::now();
        Self {
            data: Vec::new(),
            created: now,
            modified: now,
        }
    }
}

/// An in-memory byte medium.
///
/// This medium keeps all data in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Ephemeral stores that don't need persistence
///
/// An optional capacity limit makes growth past the limit fail with
/// [`StorageError::NoSpace`], which is how allocation failures are
/// exercised in tests.
///
/// # Example
///
/// ```rust
/// use rangestore_storage::{ByteMedium, InMemoryMedium};
///
/// let medium = InMemoryMedium::new();
/// assert!(!medium.exists().unwrap());
///
/// medium.write_bytes(2, b"hi").unwrap();
/// assert_eq!(medium.read_bytes(0, 4).unwrap(), vec![0, 0, b'h', b'i']);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryMedium {
    state: RwLock<Option<MemoryState>>,
    capacity_limit: Option<u64>,
}

impl InMemoryMedium {
    /// Creates a new medium that does not exist yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a medium that refuses to grow past `limit` bytes.
    #[must_use]
    pub fn with_capacity_limit(limit: u64) -> Self {
        Self {
            state: RwLock::new(None),
            capacity_limit: Some(limit),
        }
    }

    /// Creates an existing medium with pre-existing data.
    #[must_use]
    pub fn with_data(data: Vec<u8>) -> Self {
        let mut state = MemoryState::new();
        state.data = data;
        Self {
            state: RwLock::new(Some(state)),
            capacity_limit: None,
        }
    }

    /// Returns a copy of all data, or `None` if the medium does not exist.
    #[must_use]
    pub fn data(&self) -> Option<Vec<u8>> {
        self.state.read().as_ref().map(|s| s.data.clone())
    }

    fn check_capacity(&self, requested: u64) -> StorageResult<()> {
        match self.capacity_limit {
            Some(limit) if requested > limit => Err(StorageError::NoSpace { requested, limit }),
            _ => Ok(()),
        }
    }
}

/// Resizes `data` to `len` bytes.
///
/// Growth the process cannot back fails with [`StorageError::NoSpace`]
/// and leaves `data` untouched.
fn resize_buffer(data: &mut Vec<u8>, len: u64) -> StorageResult<()> {
    let current = data.len();
    let no_space = || StorageError::NoSpace {
        requested: len,
        limit: current as u64,
    };

    let len = usize::try_from(len).map_err(|_| no_space())?;
    if len > current {
        data.try_reserve_exact(len - current).map_err(|_| no_space())?;
    }
    data.resize(len, 0);
    Ok(())
}

impl ByteMedium for InMemoryMedium {
    fn read_bytes(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let state = self.state.read();
        let state = state.as_ref().ok_or(StorageError::NotFound)?;
        let size = state.data.len() as u64;
        let end = offset.saturating_add(len as u64);

        if offset > size || end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        Ok(state.data[offset as usize..end as usize].to_vec())
    }

    fn write_bytes(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        let end = offset.saturating_add(data.len() as u64);
        self.check_capacity(end)?;

        let mut guard = self.state.write();
        let created = guard.is_none();
        let state = guard.get_or_insert_with(MemoryState::new);
        if end > state.data.len() as u64 {
            if let Err(err) = resize_buffer(&mut state.data, end) {
                if created {
                    *guard = None;
                }
                return Err(err);
            }
        }
        // The buffer now holds `end` bytes, so both bounds fit in usize
        let (start, end) = (offset as usize, end as usize);
        state.data[start..end].copy_from_slice(data);
        state.modified = SystemTime::now();
        Ok(())
    }

    fn set_length(&self, len: u64) -> StorageResult<()> {
        self.check_capacity(len)?;

        let mut guard = self.state.write();
        let created = guard.is_none();
        let state = guard.get_or_insert_with(MemoryState::new);
        if let Err(err) = resize_buffer(&mut state.data, len) {
            if created {
                *guard = None;
            }
            return Err(err);
        }
        state.modified = SystemTime::now();
        Ok(())
    }

    fn current_length(&self) -> StorageResult<Option<u64>> {
        Ok(self.state.read().as_ref().map(|s| s.data.len() as u64))
    }

    fn unlink(&self) -> StorageResult<bool> {
        Ok(self.state.write().take().is_some())
    }

    fn metadata(&self) -> StorageResult<Option<MediumMetadata>> {
        Ok(self.state.read().as_ref().map(|s| MediumMetadata {
            size: s.data.len() as u64,
            created: s.created,
            modified: s.modified,
        }))
    }

    fn sync(&self) -> StorageResult<()> {
        // Nothing is buffered outside the state itself
        Ok(())
    }
}

/// A provider that keeps every medium in memory.
///
/// Media are created on first lookup and live as long as the provider.
#[derive(Debug, Default)]
pub struct InMemoryProvider {
    media: Mutex<HashMap<String, Arc<InMemoryMedium>>>,
    capacity_limit: Option<u64>,
}

impl InMemoryProvider {
    /// Creates an empty provider.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a provider whose media refuse to grow past `limit` bytes.
    #[must_use]
    pub fn with_capacity_limit(limit: u64) -> Self {
        Self {
            media: Mutex::new(HashMap::new()),
            capacity_limit: Some(limit),
        }
    }

    /// Returns the concrete medium for `name`.
    pub fn memory_medium(&self, name: &str) -> Arc<InMemoryMedium> {
        let mut media = self.media.lock();
        Arc::clone(media.entry(name.to_string()).or_insert_with(|| {
            Arc::new(match self.capacity_limit {
                Some(limit) => InMemoryMedium::with_capacity_limit(limit),
                None => InMemoryMedium::new(),
            })
        }))
    }
}

impl MediumProvider for InMemoryProvider {
    fn medium(&self, name: &str) -> StorageResult<Arc<dyn ByteMedium>> {
        Ok(self.memory_medium(name))
    }
}
