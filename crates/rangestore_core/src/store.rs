//! The store facade.

use crate::allocator::Allocator;
use crate::config::{Config, DeletePolicy, StatusPolicy};
use crate::error::{CoreError, CoreResult};
use crate::lock::{LockGuard, LockManager};
use crate::registry::{StoreHandle, StoreRegistry};
use crate::stream::{
    ReadStream, StoreWriter, TransformSession, TransformSink, TransformSource, WriteCursor,
    WriteSettings, WriteSummary,
};
use crate::types::{resolve_offset, ByteRange, LockMode, ReadOptions, StoreStatus, WriteOptions};
use rangestore_storage::{DirectoryProvider, InMemoryProvider, MediumProvider};
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

struct StoreInner {
    config: Config,
    registry: StoreRegistry,
    locks: LockManager,
    allocator: Allocator,
}

/// Streaming access to named byte stores with range locking.
///
/// `ByteStore` is the entry point for every operation. Each one resolves
/// its offsets, takes a lock on the byte range it touches, performs its
/// I/O in chunks and releases the lock when done. Overlapping writes never
/// interleave, readers never see a torn write, and waiting requests are
/// served in arrival order.
///
/// Clones share the same locks and media.
///
/// # Example
///
/// ```rust
/// use futures::TryStreamExt;
/// use rangestore_core::{ByteStore, ReadOptions, WriteOptions};
///
/// # tokio_test_block_on(async {
/// let store = ByteStore::open_in_memory();
///
/// let mut writer = store.write("greeting", WriteOptions::new()).await?;
/// writer.write(&b"hello world"[..]).await?;
/// writer.close().await?;
///
/// let chunks: Vec<_> = store
///     .read("greeting", ReadOptions::new().start(-5))
///     .await?
///     .try_collect()
///     .await?;
/// assert_eq!(chunks.concat(), b"world");
/// # Ok::<_, rangestore_core::CoreError>(())
/// # }).unwrap();
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct ByteStore {
    inner: Arc<StoreInner>,
}

impl ByteStore {
    /// Opens a store over `provider` with `config`.
    pub fn open(provider: Arc<dyn MediumProvider>, config: Config) -> Self {
        info!(
            read_chunk_size = config.read_chunk_size,
            acquire_timeout = ?config.acquire_timeout,
            "opening byte store"
        );
        Self {
            inner: Arc::new(StoreInner {
                locks: LockManager::with_acquire_timeout(config.acquire_timeout),
                registry: StoreRegistry::new(provider),
                allocator: Allocator::new(),
                config,
            }),
        }
    }

    /// Opens an in-memory store with the default configuration.
    #[must_use]
    pub fn open_in_memory() -> Self {
        Self::open(Arc::new(InMemoryProvider::new()), Config::default())
    }

    /// Opens a directory-backed store, one file per named store.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be created or another
    /// process already holds it.
    pub fn open_dir(path: &Path, config: Config) -> CoreResult<Self> {
        let provider = DirectoryProvider::open(path)?;
        Ok(Self::open(Arc::new(provider), config))
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Returns the lock manager, for diagnostics.
    #[must_use]
    pub fn lock_manager(&self) -> &LockManager {
        &self.inner.locks
    }

    fn handle(&self, name: &str) -> CoreResult<StoreHandle> {
        self.inner.registry.handle(name)
    }

    async fn acquire(&self, name: &str, range: ByteRange, mode: LockMode) -> CoreResult<LockGuard> {
        self.inner.locks.acquire(name, range, mode).await
    }

    async fn open_cursor(&self, handle: StoreHandle, guard: LockGuard) -> CoreResult<WriteCursor> {
        let settings = WriteSettings {
            interrupted_write: self.inner.config.interrupted_write,
            sync_on_close: self.inner.config.sync_on_close,
        };
        WriteCursor::open(handle, self.inner.allocator, Arc::new(guard), settings).await
    }

    /// Opens a read stream over a range of an existing store.
    ///
    /// Offsets are resolved against the length at call time. The stream
    /// holds a read lock until it ends, fails, or is dropped.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the store does not exist (including when
    ///   it is deleted while this call waits for its lock)
    /// - [`CoreError::InvalidRange`] if the resolved range is outside the
    ///   store
    pub async fn read(&self, name: &str, options: ReadOptions) -> CoreResult<ReadStream> {
        let handle = self.handle(name)?;
        let length = handle.length().await?.ok_or_else(|| CoreError::not_found(name))?;
        let range = options.resolve(name, length)?;

        let guard = self.acquire(name, range, LockMode::Read).await?;

        // The store may have shrunk or gone away while we waited
        let length = handle.length().await?.ok_or_else(|| CoreError::not_found(name))?;
        if range.end().is_some_and(|end| end > length) {
            return Err(CoreError::invalid_range(
                name,
                range.start() as i64,
                range.end().map(|end| end as i64),
                length,
            ));
        }

        debug!(store = %name, id = %guard.id(), %range, "read stream opened");
        Ok(ReadStream::spawn(
            handle,
            Arc::new(guard),
            self.inner.config.read_chunk_size,
            self.inner.config.read_ahead_chunks,
        ))
    }

    /// Opens a writer over a range, creating the store if needed.
    ///
    /// Offsets are resolved against the length at call time (0 for a missing
    /// store). Once the write lock is granted the store is grown to cover
    /// the range's end, or its start for an unbounded range.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidRange`] for malformed offsets
    /// - [`CoreError::AllocationFailure`] if the store cannot grow; no bytes
    ///   are accepted
    pub async fn write(&self, name: &str, options: WriteOptions) -> CoreResult<StoreWriter> {
        let handle = self.handle(name)?;
        let length = handle.length().await?.unwrap_or(0);
        let range = options.resolve(name, length)?;

        let guard = self.acquire(name, range, LockMode::Write).await?;
        let cursor = self.open_cursor(handle, guard).await?;
        Ok(StoreWriter::new(cursor))
    }

    /// Runs a read-modify-write over a range of an existing store.
    ///
    /// `f` receives a source streaming the range's current bytes and a sink
    /// accepting the replacement bytes. Replacement bytes never become
    /// visible to the source: writes aimed at positions not yet read are
    /// held until the source passes them. The session closes when `f`'s
    /// future completes; held bytes are flushed either way and committed
    /// bytes stay.
    ///
    /// # Errors
    ///
    /// Returns the error from `f` if it fails, otherwise the errors of
    /// [`ByteStore::write`], plus [`CoreError::NotFound`] for a missing store.
    pub async fn transform<F, Fut>(
        &self,
        name: &str,
        options: WriteOptions,
        f: F,
    ) -> CoreResult<WriteSummary>
    where
        F: FnOnce(TransformSource, TransformSink) -> Fut,
        Fut: Future<Output = CoreResult<()>>,
    {
        let handle = self.handle(name)?;
        let length = handle.length().await?.ok_or_else(|| CoreError::not_found(name))?;
        let range = options.resolve(name, length)?;

        let guard = self.acquire(name, range, LockMode::Write).await?;
        let length = handle.length().await?.ok_or_else(|| CoreError::not_found(name))?;

        let cursor = self.open_cursor(handle, guard).await?;
        let session = TransformSession::new(cursor, length, self.inner.config.read_chunk_size);
        let (source, sink) = session.split();

        match f(source, sink).await {
            Ok(()) => session.finish(true).await,
            Err(err) => {
                debug!(store = %name, error = %err, "transform failed");
                if let Err(finish_err) = session.finish(false).await {
                    warn!(
                        store = %name,
                        error = %finish_err,
                        "could not flush held bytes of failed transform"
                    );
                }
                Err(err)
            }
        }
    }

    /// Returns size and timestamps, or `None` for a missing store.
    ///
    /// Under [`StatusPolicy::AwaitWriters`] this waits for write locks that
    /// are held or queued ahead of it, so the reported size reflects every
    /// write that started first.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot report metadata.
    pub async fn status(&self, name: &str) -> CoreResult<Option<StoreStatus>> {
        let handle = self.handle(name)?;
        if !handle.exists().await? {
            return Ok(None);
        }

        let guard = match self.inner.config.status_policy {
            StatusPolicy::AwaitWriters => {
                Some(self.acquire(name, ByteRange::full(), LockMode::Read).await?)
            }
            StatusPolicy::BestEffort => None,
        };
        let status = handle.metadata().await;
        drop(guard);
        status
    }

    /// Returns true if the store exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot report existence.
    pub async fn exists(&self, name: &str) -> CoreResult<bool> {
        self.handle(name)?.exists().await
    }

    /// Sets the length of an existing store, truncating or zero-filling.
    ///
    /// A negative `end` counts back from the current length. Resize locks
    /// everything from the lower of the old and new lengths onward.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotFound`] if the store does not exist
    /// - [`CoreError::InvalidRange`] if `end` resolves below zero
    /// - [`CoreError::AllocationFailure`] if the medium cannot change length
    pub async fn resize(&self, name: &str, end: i64) -> CoreResult<()> {
        let handle = self.handle(name)?;
        let mut length = handle.length().await?.ok_or_else(|| CoreError::not_found(name))?;

        let target = resolve_offset(end, length);
        if target < 0 {
            return Err(CoreError::invalid_range(name, target, None, length));
        }
        let target = target as u64;

        loop {
            let floor = target.min(length);
            let guard = self.acquire(name, ByteRange::starting_at(floor), LockMode::Write).await?;

            let current = handle.length().await?.ok_or_else(|| CoreError::not_found(name))?;
            if current < floor {
                // Shrunk while we waited; the lock no longer covers the tail
                drop(guard);
                length = current;
                continue;
            }

            debug!(store = %name, from = current, to = target, "resizing store");
            let lease = Arc::new(guard);
            self.inner.allocator.set_length(&handle, target, &lease).await?;
            return Ok(());
        }
    }

    /// Deletes a store once no session overlaps it. Returns whether it
    /// existed.
    ///
    /// Under [`DeletePolicy::RevokeSessions`] live sessions are revoked
    /// first instead of awaited.
    ///
    /// # Errors
    ///
    /// Returns an error if the medium cannot be removed.
    pub async fn delete(&self, name: &str) -> CoreResult<bool> {
        let handle = self.handle(name)?;
        if self.inner.config.delete_policy == DeletePolicy::RevokeSessions {
            let revoked = self.inner.locks.revoke_store(name);
            if revoked > 0 {
                warn!(store = %name, revoked, "revoked sessions for delete");
            }
        }

        let guard = self.acquire(name, ByteRange::full(), LockMode::Write).await?;
        let existed = handle.unlink(&Arc::new(guard)).await?;
        info!(store = %name, existed, "store deleted");
        Ok(existed)
    }

    /// Forcibly releases every lock held on `name`.
    ///
    /// Sessions bound to a revoked lock fail their next step with
    /// [`CoreError::LockRevoked`]. A medium call already running under a
    /// revoked lock still finishes before anything overlapping is granted.
    /// Returns the number of revoked sessions.
    pub fn force_release(&self, name: &str) -> usize {
        self.inner.locks.revoke_store(name)
    }
}

impl std::fmt::Debug for ByteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteStore")
            .field("config", &self.inner.config)
            .field("registry", &self.inner.registry)
            .field("locks", &self.inner.locks)
            .finish()
    }
}
