//! Store registry: names to store handles.

use crate::error::{CoreError, CoreResult};
use crate::lock::{begin_io, Lease};
use crate::types::StoreStatus;
use bytes::Bytes;
use parking_lot::Mutex;
use rangestore_storage::{ByteMedium, MediumProvider, StorageError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A shared handle to one named store.
///
/// Handles are cheap to clone and all clones for a name share the same
/// medium and the same length gate, which the allocator uses to serialize
/// length changes.
///
/// Every medium call runs on the blocking pool. Calls made on behalf of a
/// lock holder register with its [`Lease`], so the lock cannot be released,
/// not even by revocation, while the call is still running. This holds even
/// if the awaiting future was dropped.
#[derive(Clone)]
pub struct StoreHandle {
    name: Arc<str>,
    medium: Arc<dyn ByteMedium>,
    length_gate: Arc<Mutex<()>>,
}

impl StoreHandle {
    fn new(name: Arc<str>, medium: Arc<dyn ByteMedium>) -> Self {
        Self {
            name,
            medium,
            length_gate: Arc::new(Mutex::new(())),
        }
    }

    /// Returns the store name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn length_gate(&self) -> Arc<Mutex<()>> {
        Arc::clone(&self.length_gate)
    }

    /// Runs `f` against the medium on the blocking pool.
    pub(crate) async fn blocking<T, F>(&self, lease: Option<&Lease>, f: F) -> CoreResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&dyn ByteMedium) -> CoreResult<T> + Send + 'static,
    {
        let medium = Arc::clone(&self.medium);
        let permit = lease.map(begin_io).transpose()?;
        tokio::task::spawn_blocking(move || {
            let result = f(medium.as_ref());
            drop(permit);
            result
        })
        .await?
    }

    /// Returns the current length, or `None` if the store does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot report its length.
    pub async fn length(&self) -> CoreResult<Option<u64>> {
        self.blocking(None, |medium| Ok(medium.current_length()?)).await
    }

    /// Returns true if the store exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot report existence.
    pub async fn exists(&self) -> CoreResult<bool> {
        self.blocking(None, |medium| Ok(medium.exists()?)).await
    }

    /// Returns size and timestamps, or `None` if the store does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot report metadata.
    pub async fn metadata(&self) -> CoreResult<Option<StoreStatus>> {
        self.blocking(None, |medium| Ok(medium.metadata()?.map(StoreStatus::from)))
            .await
    }

    pub(crate) async fn read_at(
        &self,
        offset: u64,
        len: usize,
        lease: &Lease,
    ) -> CoreResult<Bytes> {
        let name = Arc::clone(&self.name);
        self.blocking(Some(lease), move |medium| match medium.read_bytes(offset, len) {
            Ok(data) => Ok(Bytes::from(data)),
            Err(StorageError::NotFound) => Err(CoreError::not_found(&*name)),
            Err(err) => Err(err.into()),
        })
        .await
    }

    pub(crate) async fn write_at(
        &self,
        offset: u64,
        data: Bytes,
        lease: &Lease,
    ) -> CoreResult<()> {
        self.blocking(Some(lease), move |medium| {
            Ok(medium.write_bytes(offset, &data)?)
        })
        .await
    }

    pub(crate) async fn sync(&self, lease: &Lease) -> CoreResult<()> {
        self.blocking(Some(lease), |medium| Ok(medium.sync()?)).await
    }

    pub(crate) async fn unlink(&self, lease: &Lease) -> CoreResult<bool> {
        let gate = self.length_gate();
        self.blocking(Some(lease), move |medium| {
            let _gate = gate.lock();
            Ok(medium.unlink()?)
        })
        .await
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Maps store names to [`StoreHandle`]s.
///
/// A handle is created on first lookup and kept for the registry's
/// lifetime, including across delete and re-create, so every operation on
/// a name shares one medium and one length gate.
pub struct StoreRegistry {
    provider: Arc<dyn MediumProvider>,
    handles: Mutex<HashMap<Arc<str>, StoreHandle>>,
}

impl StoreRegistry {
    /// Creates a registry over `provider`.
    pub fn new(provider: Arc<dyn MediumProvider>) -> Self {
        Self {
            provider,
            handles: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the handle for `name`, whether or not the store exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot prepare a medium.
    pub fn handle(&self, name: &str) -> CoreResult<StoreHandle> {
        let mut handles = self.handles.lock();
        if let Some(handle) = handles.get(name) {
            return Ok(handle.clone());
        }

        let medium = self.provider.medium(name)?;
        let key: Arc<str> = Arc::from(name);
        let handle = StoreHandle::new(Arc::clone(&key), medium);
        handles.insert(key, handle.clone());
        Ok(handle)
    }

    /// Returns the number of names looked up so far.
    #[must_use]
    pub fn known_count(&self) -> usize {
        self.handles.lock().len()
    }
}

impl fmt::Debug for StoreRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreRegistry")
            .field("known_count", &self.known_count())
            .finish_non_exhaustive()
    }
}
