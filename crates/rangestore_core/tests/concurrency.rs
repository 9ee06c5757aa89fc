//! Locking and interleaving tests across concurrent sessions.

mod common;

use common::{memory_store, put, read_all, stays_pending, SlowWriteProvider};
use futures::{pin_mut, poll, StreamExt};
use rangestore_core::{
    ByteRange, ByteStore, Config, CoreError, DeletePolicy, LockManager, LockMode, ReadOptions,
    WriteOptions,
};
use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

#[tokio::test]
async fn overlapping_write_waits_for_write() {
    let store = ByteStore::open_in_memory();

    let mut first = store.write("doc", WriteOptions::new().end(10)).await.unwrap();
    let second = store.write("doc", WriteOptions::new().start(5).end(15));
    tokio::pin!(second);
    assert!(stays_pending(&mut second).await);
    assert_eq!(store.lock_manager().snapshot("doc").waiting, 1);

    first.write(&b"0123456789"[..]).await.unwrap();

    let mut second = second.await.unwrap();
    second.write(&b"ABCDEFGHIJ"[..]).await.unwrap();
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new()).await.unwrap(),
        b"01234ABCDEFGHIJ"
    );
}

#[tokio::test]
async fn read_waits_for_overlapping_write() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"old old old").await;

    let mut writer = store.write("doc", WriteOptions::new().end(3)).await.unwrap();
    let read = read_all(&store, "doc", ReadOptions::new());
    tokio::pin!(read);
    assert!(stays_pending(&mut read).await);

    writer.write(&b"new"[..]).await.unwrap();
    assert_eq!(read.await.unwrap(), b"new old old");
}

#[tokio::test]
async fn disjoint_write_does_not_wait() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", &[0u8; 20]).await;

    let _held = store.write("doc", WriteOptions::new().end(10)).await.unwrap();
    let other = tokio::time::timeout(
        Duration::from_secs(5),
        store.write("doc", WriteOptions::new().start(10).end(20)),
    )
    .await
    .expect("disjoint write was blocked");
    assert!(other.is_ok());
}

#[tokio::test]
async fn overlapping_reads_run_together() {
    let store = memory_store(Config::new().read_chunk_size(1).read_ahead_chunks(1));
    put(&store, "doc", &[3u8; 64]).await;

    let _first = store.read("doc", ReadOptions::new().end(40)).await.unwrap();
    let _second = tokio::time::timeout(
        Duration::from_secs(5),
        store.read("doc", ReadOptions::new().start(20)),
    )
    .await
    .expect("overlapping read was blocked")
    .unwrap();

    assert_eq!(store.lock_manager().snapshot("doc").readers, 2);
}

#[tokio::test]
async fn queued_writer_is_served_before_later_reader() {
    let manager = LockManager::new();
    let held = manager
        .acquire("doc", ByteRange::bounded(0, 10), LockMode::Write)
        .await
        .unwrap();

    let w1 = manager.acquire("doc", ByteRange::bounded(0, 10), LockMode::Write);
    let w2 = manager.acquire("doc", ByteRange::bounded(5, 15), LockMode::Read);
    pin_mut!(w1);
    pin_mut!(w2);
    assert!(poll!(w1.as_mut()).is_pending());
    assert!(poll!(w2.as_mut()).is_pending());

    drop(held);

    // W2's conflict with the original holder is gone, but W1 arrived first
    assert!(poll!(w2.as_mut()).is_pending());
    let w1 = match poll!(w1.as_mut()) {
        Poll::Ready(guard) => guard.unwrap(),
        Poll::Pending => panic!("first waiter was not granted"),
    };
    assert!(poll!(w2.as_mut()).is_pending());

    drop(w1);
    let w2 = w2.await.unwrap();
    assert_eq!(w2.mode(), LockMode::Read);
}

#[tokio::test]
async fn reader_queues_behind_waiting_writer() {
    let manager = LockManager::new();
    let reader = manager
        .acquire("doc", ByteRange::bounded(0, 10), LockMode::Read)
        .await
        .unwrap();

    let writer = manager.acquire("doc", ByteRange::bounded(0, 10), LockMode::Write);
    pin_mut!(writer);
    assert!(poll!(writer.as_mut()).is_pending());

    // Compatible with the granted reader, but must not overtake the writer
    let late_reader = manager.acquire("doc", ByteRange::bounded(5, 15), LockMode::Read);
    pin_mut!(late_reader);
    assert!(poll!(late_reader.as_mut()).is_pending());

    drop(reader);
    let writer = writer.await.unwrap();
    assert!(poll!(late_reader.as_mut()).is_pending());

    drop(writer);
    assert!(late_reader.await.is_ok());
}

#[tokio::test]
async fn abandoned_wait_leaves_nothing_behind() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abc").await;

    let writer = store.write("doc", WriteOptions::new()).await.unwrap();
    let gave_up = tokio::time::timeout(
        Duration::from_millis(20),
        store.write("doc", WriteOptions::new()),
    )
    .await;
    assert!(gave_up.is_err());
    assert_eq!(store.lock_manager().snapshot("doc").waiting, 0);

    writer.close().await.unwrap();
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn readers_never_see_torn_writes() {
    const SIZE: usize = 64;
    let store = memory_store(Config::new().read_chunk_size(8));
    put(&store, "doc", &[0u8; SIZE]).await;

    let mut tasks = Vec::new();
    for writer_id in 1..=4u8 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..25 {
                let mut writer = store
                    .write("doc", WriteOptions::new().end(SIZE as i64))
                    .await
                    .unwrap();
                for _ in 0..SIZE / 8 {
                    writer.write(vec![writer_id; 8]).await.unwrap();
                    tokio::task::yield_now().await;
                }
            }
        }));
    }
    for _ in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            for _ in 0..50 {
                let data = read_all(&store, "doc", ReadOptions::new()).await.unwrap();
                assert_eq!(data.len(), SIZE);
                assert!(data.iter().all(|&b| b == data[0]), "torn read: {data:?}");
            }
        }));
    }

    for task in tasks {
        task.await.unwrap();
    }
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_writers_proceed_in_parallel() {
    let store = ByteStore::open_in_memory();

    let mut tasks = Vec::new();
    for slot in 0..8i64 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut writer = store
                .write("doc", WriteOptions::new().start(slot * 16).end(slot * 16 + 16))
                .await
                .unwrap();
            for _ in 0..4 {
                writer.write(vec![slot as u8 + 1; 4]).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let data = read_all(&store, "doc", ReadOptions::new()).await.unwrap();
    assert_eq!(data.len(), 128);
    for (slot, chunk) in data.chunks(16).enumerate() {
        assert!(chunk.iter().all(|&b| b == slot as u8 + 1), "slot {slot}: {chunk:?}");
    }
}

#[tokio::test]
async fn read_stream_applies_back_pressure() {
    let store = memory_store(Config::new().read_chunk_size(1).read_ahead_chunks(2));
    put(&store, "doc", &[9u8; 32]).await;

    let mut stream = store.read("doc", ReadOptions::new()).await.unwrap();
    // Give the producer time to fill its buffer and stall
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(store.lock_manager().snapshot("doc").readers, 1);

    let mut total = 0;
    while let Some(chunk) = stream.next().await {
        total += chunk.unwrap().len();
    }
    assert_eq!(total, 32);
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn read_queued_behind_delete_finds_nothing() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abcdef").await;

    let writer = store.write("doc", WriteOptions::new()).await.unwrap();
    let delete = store.delete("doc");
    tokio::pin!(delete);
    assert!(stays_pending(&mut delete).await);
    let read = store.read("doc", ReadOptions::new());
    tokio::pin!(read);
    assert!(stays_pending(&mut read).await);
    assert_eq!(store.lock_manager().snapshot("doc").waiting, 2);

    writer.close().await.unwrap();
    assert!(delete.await.unwrap());
    assert!(matches!(read.await, Err(CoreError::NotFound { .. })));
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn read_queued_behind_shrink_is_out_of_range() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abcdef").await;

    let writer = store.write("doc", WriteOptions::new()).await.unwrap();
    let resize = store.resize("doc", 2);
    tokio::pin!(resize);
    assert!(stays_pending(&mut resize).await);
    let read = store.read("doc", ReadOptions::new().end(6));
    tokio::pin!(read);
    assert!(stays_pending(&mut read).await);

    writer.close().await.unwrap();
    resize.await.unwrap();
    assert!(matches!(read.await, Err(CoreError::InvalidRange { .. })));
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new()).await.unwrap(),
        b"ab"
    );
}

#[tokio::test]
async fn resize_retries_after_shrink_while_waiting() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abcdef").await;

    let writer = store.write("doc", WriteOptions::new()).await.unwrap();
    // Locks [2, inf)
    let shrink = store.resize("doc", 2);
    tokio::pin!(shrink);
    assert!(stays_pending(&mut shrink).await);
    // Locks [6, inf), which no longer covers the tail once the shrink lands
    let grow = store.resize("doc", 8);
    tokio::pin!(grow);
    assert!(stays_pending(&mut grow).await);

    writer.close().await.unwrap();
    shrink.await.unwrap();
    grow.await.unwrap();

    assert_eq!(
        read_all(&store, "doc", ReadOptions::new()).await.unwrap(),
        b"ab\0\0\0\0\0\0"
    );
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn resize_waits_for_overlapping_reader() {
    let store = memory_store(Config::new().read_chunk_size(1).read_ahead_chunks(1));
    put(&store, "doc", b"abcdef").await;

    let mut stream = store.read("doc", ReadOptions::new()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap(), &b"a"[..]);

    let resize = store.resize("doc", 2);
    tokio::pin!(resize);
    assert!(stays_pending(&mut resize).await);

    drop(stream);
    resize.await.unwrap();
    assert_eq!(store.status("doc").await.unwrap().unwrap().size, 2);
}

#[tokio::test]
async fn revoking_delete_waits_for_in_flight_write() {
    let provider = Arc::new(SlowWriteProvider::new(Duration::from_millis(200)));
    let store = ByteStore::open(
        provider.clone(),
        Config::new().delete_policy(DeletePolicy::RevokeSessions),
    );
    put(&store, "doc", b"abc").await;
    provider.arm();

    let mut writer = store
        .write("doc", WriteOptions::new().start(3))
        .await
        .unwrap();
    let session = tokio::spawn(async move {
        let first = writer.write(&b"zzz"[..]).await;
        let second = writer.write(&b"!"[..]).await;
        (first, second)
    });
    provider.write_started().await;

    assert!(store.delete("doc").await.unwrap());
    assert!(!store.exists("doc").await.unwrap());

    let (first, second) = session.await.unwrap();
    assert!(first.is_ok());
    assert!(matches!(second, Err(CoreError::LockRevoked { .. })));

    // The stalled write landed before the delete, so nothing comes back
    assert!(store.status("doc").await.unwrap().is_none());
    assert!(store.lock_manager().snapshot("doc").is_idle());
}
