//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores
//! and common test scenarios.

use bytes::Bytes;
use futures::TryStreamExt;
use rangestore_core::{ByteStore, Config, ReadOptions, WriteOptions};
use rangestore_storage::InMemoryProvider;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: ByteStore,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates a new in-memory test store.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates a new in-memory test store with `config`.
    pub fn memory_with(config: Config) -> Self {
        Self {
            store: ByteStore::open(Arc::new(InMemoryProvider::new()), config),
            _temp_dir: None,
        }
    }

    /// Creates a new directory-backed test store.
    pub fn dir() -> Self {
        Self::dir_with(Config::default())
    }

    /// Creates a new directory-backed test store with `config`.
    pub fn dir_with(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let store =
            ByteStore::open_dir(temp_dir.path(), config).expect("Failed to open store directory");
        Self {
            store,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the directory if directory-backed, None if in-memory.
    pub fn path(&self) -> Option<&Path> {
        self._temp_dir.as_ref().map(TempDir::path)
    }

    /// Reads the whole of `name`, panicking on error.
    pub async fn read_all(&self, name: &str) -> Vec<u8> {
        read_range(&self.store, name, ReadOptions::new())
            .await
            .expect("Failed to read store")
    }

    /// Replaces the contents of `name` from offset 0, panicking on error.
    ///
    /// Bytes past `data.len()` in a longer store are left in place.
    pub async fn write_all(&self, name: &str, data: &[u8]) {
        write_range(&self.store, name, WriteOptions::new(), data)
            .await
            .expect("Failed to write store");
    }
}

impl std::ops::Deref for TestStore {
    type Target = ByteStore;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

/// Reads a range into a single buffer.
pub async fn read_range(
    store: &ByteStore,
    name: &str,
    options: ReadOptions,
) -> rangestore_core::CoreResult<Vec<u8>> {
    let chunks: Vec<Bytes> = store.read(name, options).await?.try_collect().await?;
    Ok(chunks.concat())
}

/// Writes `data` as one chunk in a single session.
pub async fn write_range(
    store: &ByteStore,
    name: &str,
    options: WriteOptions,
    data: &[u8],
) -> rangestore_core::CoreResult<rangestore_core::WriteSummary> {
    let mut writer = store.write(name, options).await?;
    writer.write(Bytes::copy_from_slice(data)).await?;
    writer.close().await
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust,ignore
/// use rangestore_testkit::with_temp_store;
///
/// #[tokio::test]
/// async fn my_test() {
///     with_temp_store(|store| async move {
///         store.delete("doc").await.unwrap();
///     })
///     .await;
/// }
/// ```
pub async fn with_temp_store<F, Fut, R>(f: F) -> R
where
    F: FnOnce(ByteStore) -> Fut,
    Fut: Future<Output = R>,
{
    let test_store = TestStore::memory();
    f(test_store.store.clone()).await
}

/// Runs a test with a temporary directory-backed store.
pub async fn with_dir_store<F, Fut, R>(f: F) -> R
where
    F: FnOnce(ByteStore, std::path::PathBuf) -> Fut,
    Fut: Future<Output = R>,
{
    let test_store = TestStore::dir();
    let path = test_store
        .path()
        .expect("Directory store should have a path")
        .to_path_buf();
    f(test_store.store.clone(), path).await
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store holding `count` stores named `store_{i}`, each filled
    /// with `size` copies of byte `i`.
    pub async fn populated_store(count: usize, size: usize) -> TestStore {
        let test_store = TestStore::memory();
        for i in 0..count {
            test_store
                .write_all(&format!("store_{i}"), &vec![i as u8; size])
                .await;
        }
        test_store
    }
}
