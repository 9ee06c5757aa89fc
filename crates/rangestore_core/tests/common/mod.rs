//! Helpers shared by the integration tests.

#![allow(dead_code)]

use bytes::Bytes;
use futures::TryStreamExt;
use rangestore_core::{ByteStore, Config, CoreResult, ReadOptions, WriteOptions};
use rangestore_storage::{
    ByteMedium, InMemoryMedium, InMemoryProvider, MediumMetadata, MediumProvider, StorageResult,
};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

/// Opens an in-memory store with `config`.
pub fn memory_store(config: Config) -> ByteStore {
    ByteStore::open(Arc::new(InMemoryProvider::new()), config)
}

/// Opens an in-memory store whose media cannot grow past `limit` bytes.
pub fn limited_store(limit: u64) -> ByteStore {
    ByteStore::open(
        Arc::new(InMemoryProvider::with_capacity_limit(limit)),
        Config::default(),
    )
}

/// Reads a whole range into one buffer.
pub async fn read_all(
    store: &ByteStore,
    name: &str,
    options: ReadOptions,
) -> CoreResult<Vec<u8>> {
    let chunks: Vec<Bytes> = store.read(name, options).await?.try_collect().await?;
    Ok(chunks.concat())
}

/// Writes `data` from offset 0 in a single unbounded session.
pub async fn put(store: &ByteStore, name: &str, data: &[u8]) {
    let mut writer = store.write(name, WriteOptions::new()).await.unwrap();
    writer.write(data.to_vec()).await.unwrap();
    writer.close().await.unwrap();
}

/// Returns true if `fut` is still pending after a short grace period.
pub async fn stays_pending<F: Future + Unpin>(fut: &mut F) -> bool {
    tokio::time::timeout(Duration::from_millis(50), fut).await.is_err()
}

/// An in-memory provider whose writes stall for `delay` once armed.
pub struct SlowWriteProvider {
    inner: InMemoryProvider,
    armed: Arc<AtomicBool>,
    entered: Arc<Notify>,
    delay: Duration,
}

impl SlowWriteProvider {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: InMemoryProvider::new(),
            armed: Arc::new(AtomicBool::new(false)),
            entered: Arc::new(Notify::new()),
            delay,
        }
    }

    /// Makes every later write stall.
    pub fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    /// Resolves once a stalled write has started.
    pub async fn write_started(&self) {
        self.entered.notified().await;
    }
}

impl MediumProvider for SlowWriteProvider {
    fn medium(&self, name: &str) -> StorageResult<Arc<dyn ByteMedium>> {
        Ok(Arc::new(SlowWriteMedium {
            inner: self.inner.memory_medium(name),
            armed: Arc::clone(&self.armed),
            entered: Arc::clone(&self.entered),
            delay: self.delay,
        }))
    }
}

struct SlowWriteMedium {
    inner: Arc<InMemoryMedium>,
    armed: Arc<AtomicBool>,
    entered: Arc<Notify>,
    delay: Duration,
}

impl ByteMedium for SlowWriteMedium {
    fn read_bytes(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_bytes(offset, len)
    }

    fn write_bytes(&self, offset: u64, data: &[u8]) -> StorageResult<()> {
        if self.armed.load(Ordering::SeqCst) {
            self.entered.notify_one();
            std::thread::sleep(self.delay);
        }
        self.inner.write_bytes(offset, data)
    }

    fn set_length(&self, len: u64) -> StorageResult<()> {
        self.inner.set_length(len)
    }

    fn current_length(&self) -> StorageResult<Option<u64>> {
        self.inner.current_length()
    }

    fn unlink(&self) -> StorageResult<bool> {
        self.inner.unlink()
    }

    fn metadata(&self) -> StorageResult<Option<MediumMetadata>> {
        self.inner.metadata()
    }

    fn sync(&self) -> StorageResult<()> {
        self.inner.sync()
    }
}
