//! Model-checking harness.
//!
//! Drives a [`ByteStore`] while tracking the bytes each named store is
//! expected to hold, so any sequence of operations can be verified.

use crate::fixtures::{read_range, write_range};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use rangestore_core::{ByteStore, CoreError, ReadOptions, WriteOptions};
use std::collections::HashMap;

/// A test harness pairing a store with its expected contents.
pub struct StoreHarness {
    /// The store instance.
    pub store: ByteStore,
    /// Expected contents per store name.
    model: HashMap<String, Vec<u8>>,
}

impl StoreHarness {
    /// Creates a new harness over an in-memory store.
    pub fn new() -> Self {
        Self::with_store(ByteStore::open_in_memory())
    }

    /// Creates a harness over an empty `store`.
    pub fn with_store(store: ByteStore) -> Self {
        Self {
            store,
            model: HashMap::new(),
        }
    }

    /// Writes `data` at `offset` and tracks it.
    ///
    /// Offsets past the end grow the store with zeros first. An empty
    /// write is skipped.
    pub async fn write_at(&mut self, name: &str, offset: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let options = WriteOptions::new().start(offset as i64);
        write_range(&self.store, name, options, data)
            .await
            .expect("Failed to write");

        let expected = self.model.entry(name.to_string()).or_default();
        let end = offset as usize + data.len();
        if expected.len() < end {
            expected.resize(end, 0);
        }
        expected[offset as usize..end].copy_from_slice(data);
    }

    /// Resizes a store and tracks it; a missing store must report not found.
    pub async fn resize(&mut self, name: &str, len: u64) {
        let result = self.store.resize(name, len as i64).await;
        match self.model.get_mut(name) {
            Some(expected) => {
                result.expect("Failed to resize");
                expected.resize(len as usize, 0);
            }
            None => assert!(
                matches!(result, Err(CoreError::NotFound { .. })),
                "resize of missing {name:?} returned {result:?}"
            ),
        }
    }

    /// Deletes a store and tracks it.
    pub async fn delete(&mut self, name: &str) {
        let existed = self.store.delete(name).await.expect("Failed to delete");
        assert_eq!(
            existed,
            self.model.remove(name).is_some(),
            "delete of {name:?} disagreed with the model"
        );
    }

    /// Rewrites every byte of a store through `map` in one transform.
    pub async fn transform_map(&mut self, name: &str, map: fn(u8) -> u8) {
        let result = self
            .store
            .transform(name, WriteOptions::new(), |mut source, mut sink| async move {
                while let Some(chunk) = source.next().await {
                    let mapped: Vec<u8> = chunk?.iter().map(|&b| map(b)).collect();
                    sink.send(Bytes::from(mapped)).await?;
                }
                Ok(())
            })
            .await;

        match self.model.get_mut(name) {
            Some(expected) => {
                result.expect("Failed to transform");
                expected.iter_mut().for_each(|b| *b = map(*b));
            }
            None => assert!(matches!(result, Err(CoreError::NotFound { .. }))),
        }
    }

    /// Reads a store and checks it against the model.
    pub async fn read_and_verify(&self, name: &str) -> Option<Vec<u8>> {
        let actual = match read_range(&self.store, name, ReadOptions::new()).await {
            Ok(data) => Some(data),
            Err(CoreError::NotFound { .. }) => None,
            Err(e) => panic!("Failed to read {name:?}: {e}"),
        };
        assert_eq!(
            actual.as_ref(),
            self.model.get(name),
            "Store contents mismatch for {name:?}"
        );
        actual
    }

    /// Verifies every tracked store, including its reported size.
    pub async fn verify_all(&self) {
        for (name, expected) in &self.model {
            self.read_and_verify(name).await;
            let status = self
                .store
                .status(name)
                .await
                .expect("Failed to stat")
                .expect("Tracked store is missing");
            assert_eq!(status.size, expected.len() as u64, "Size mismatch for {name:?}");
        }
    }

    /// Returns the expected length of a store.
    pub fn expected_len(&self, name: &str) -> Option<u64> {
        self.model.get(name).map(|d| d.len() as u64)
    }

    /// Returns the count of tracked stores.
    pub fn tracked_count(&self) -> usize {
        self.model.len()
    }
}

impl Default for StoreHarness {
    fn default() -> Self {
        Self::new()
    }
}
