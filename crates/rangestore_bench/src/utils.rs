//! Benchmark utilities.

use bytes::Bytes;
use futures::TryStreamExt;
use rand::Rng;
use rangestore_core::{ByteStore, ReadOptions, WriteOptions};
use tokio::runtime::Runtime;

/// Generate random data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Split `total` random bytes into chunks of `chunk_size`.
pub fn random_chunks(total: usize, chunk_size: usize) -> Vec<Bytes> {
    random_data(total)
        .chunks(chunk_size.max(1))
        .map(Bytes::copy_from_slice)
        .collect()
}

/// Build a multi-threaded runtime for async benchmarks.
pub fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime")
}

/// Write `chunks` into `name` from offset 0 in one session.
pub async fn write_chunks(store: &ByteStore, name: &str, chunks: &[Bytes]) {
    let mut writer = store.write(name, WriteOptions::new()).await.unwrap();
    for chunk in chunks {
        writer.write(chunk.clone()).await.unwrap();
    }
    writer.close().await.unwrap();
}

/// Read all of `name`, returning the byte count.
pub async fn drain(store: &ByteStore, name: &str) -> usize {
    store
        .read(name, ReadOptions::new())
        .await
        .unwrap()
        .try_fold(0, |n, chunk| async move { Ok(n + chunk.len()) })
        .await
        .unwrap()
}
