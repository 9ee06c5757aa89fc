//! End-to-end tests for store operations.

mod common;

use bytes::Bytes;
use common::{limited_store, memory_store, put, read_all, stays_pending, SlowWriteProvider};
use futures::{SinkExt, StreamExt, TryStreamExt};
use rangestore_core::{
    ByteStore, Config, CoreError, DeletePolicy, InterruptedWritePolicy, ReadOptions, StatusPolicy,
    WriteOptions,
};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Read / write
// ============================================================================

#[tokio::test]
async fn write_then_read() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"hello world").await;

    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"hello world");
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new().start(-5)).await.unwrap(),
        b"world"
    );
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new().start(2).end(-6)).await.unwrap(),
        b"llo"
    );
}

#[tokio::test]
async fn read_chunks_respect_chunk_size() {
    let store = memory_store(Config::new().read_chunk_size(4));
    put(&store, "doc", b"0123456789").await;

    let stream = store.read("doc", ReadOptions::new()).await.unwrap();
    let sizes: Vec<usize> = stream.map(|chunk| chunk.unwrap().len()).collect().await;
    assert_eq!(sizes, vec![4, 4, 2]);
}

#[tokio::test]
async fn empty_range_yields_no_chunks() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abc").await;

    let mut stream = store.read("doc", ReadOptions::new().start(3)).await.unwrap();
    assert!(stream.next().await.is_none());
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn read_missing_store_is_not_found() {
    let store = ByteStore::open_in_memory();
    let result = store.read("missing", ReadOptions::new()).await;
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn read_out_of_bounds_is_invalid_range() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abc").await;

    for options in [
        ReadOptions::new().end(4),
        ReadOptions::new().start(-4),
        ReadOptions::new().start(2).end(1),
    ] {
        let result = store.read("doc", options).await;
        assert!(matches!(result, Err(CoreError::InvalidRange { .. })), "{options:?}");
    }
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn write_negative_start_on_missing_store_is_invalid() {
    let store = ByteStore::open_in_memory();
    let result = store.write("doc", WriteOptions::new().start(-1)).await;
    assert!(matches!(result, Err(CoreError::InvalidRange { .. })));
    assert!(!store.exists("doc").await.unwrap());
}

#[tokio::test]
async fn write_overwrites_in_place() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"hello world").await;

    let mut writer = store.write("doc", WriteOptions::new().start(6)).await.unwrap();
    writer.write(&b"WORLD"[..]).await.unwrap();
    let summary = writer.close().await.unwrap();

    assert_eq!(summary.bytes_written, 5);
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"hello WORLD");
}

#[tokio::test]
async fn write_past_end_zero_fills_gap() {
    let store = ByteStore::open_in_memory();

    let mut writer = store.write("doc", WriteOptions::new().start(100)).await.unwrap();
    writer.write(&b"abc"[..]).await.unwrap();
    writer.close().await.unwrap();

    let status = store.status("doc").await.unwrap().unwrap();
    assert!(status.size >= 103);

    let gap = read_all(&store, "doc", ReadOptions::new().end(100)).await.unwrap();
    assert!(gap.iter().all(|&b| b == 0));
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new().start(100)).await.unwrap(),
        b"abc"
    );
}

#[tokio::test]
async fn bounded_write_allocates_up_front() {
    let store = memory_store(Config::new().status_policy(StatusPolicy::BestEffort));

    let writer = store.write("doc", WriteOptions::new().start(2).end(8)).await.unwrap();
    let status = store.status("doc").await.unwrap().unwrap();
    assert_eq!(status.size, 8);
    drop(writer);
}

#[tokio::test]
async fn unbounded_write_from_zero_creates_lazily() {
    let store = ByteStore::open_in_memory();

    let writer = store.write("doc", WriteOptions::new()).await.unwrap();
    writer.close().await.unwrap();
    assert!(!store.exists("doc").await.unwrap());
}

#[tokio::test]
async fn overflow_keeps_fitting_prefix() {
    let store = ByteStore::open_in_memory();

    let mut writer = store.write("doc", WriteOptions::new().start(0).end(5)).await.unwrap();
    let result = writer.write(&b"abcdef"[..]).await;
    assert!(matches!(result, Err(CoreError::WriteOverflow { capacity: 5, .. })));

    assert!(store.lock_manager().snapshot("doc").is_idle());
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abcde");
}

#[tokio::test]
async fn filled_range_releases_lock_and_rejects_more() {
    let store = ByteStore::open_in_memory();

    let mut writer = store.write("doc", WriteOptions::new().end(4)).await.unwrap();
    writer.write(&b"ab"[..]).await.unwrap();
    assert_eq!(store.lock_manager().snapshot("doc").writers, 1);

    writer.write(&b"cd"[..]).await.unwrap();
    assert!(store.lock_manager().snapshot("doc").is_idle());

    let result = writer.write(&b"e"[..]).await;
    assert!(matches!(result, Err(CoreError::WriteOverflow { .. })));

    let summary = writer.close().await.unwrap();
    assert!(summary.is_complete());
}

#[tokio::test]
async fn interrupted_write_retains_prior_bytes_by_default() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"xxxxxxxx").await;

    let mut writer = store.write("doc", WriteOptions::new().end(8)).await.unwrap();
    writer.write(&b"ab"[..]).await.unwrap();
    let summary = writer.close().await.unwrap();

    assert!(!summary.is_complete());
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abxxxxxx");
}

#[tokio::test]
async fn interrupted_write_can_zero_fill() {
    let store = memory_store(Config::new().interrupted_write(InterruptedWritePolicy::ZeroFill));
    put(&store, "doc", b"xxxxxxxx").await;

    let mut writer = store.write("doc", WriteOptions::new().end(6)).await.unwrap();
    writer.write(&b"ab"[..]).await.unwrap();
    writer.close().await.unwrap();

    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"ab\0\0\0\0xx");
}

#[tokio::test]
async fn allocation_failure_before_any_bytes() {
    let store = limited_store(8);

    let result = store.write("doc", WriteOptions::new().end(16)).await;
    assert!(matches!(result, Err(CoreError::AllocationFailure { requested: 16, .. })));
    assert!(!store.exists("doc").await.unwrap());
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn growth_beyond_memory_fails_with_allocation_failure() {
    let store = ByteStore::open_in_memory();

    let result = store.write("doc", WriteOptions::new().start(1 << 62)).await;
    assert!(matches!(result, Err(CoreError::AllocationFailure { .. })));
    assert!(!store.exists("doc").await.unwrap());
    assert!(store.lock_manager().snapshot("doc").is_idle());

    put(&store, "doc", b"abc").await;
    let result = store.resize("doc", 1 << 62).await;
    assert!(matches!(result, Err(CoreError::AllocationFailure { .. })));
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abc");
}

#[tokio::test]
async fn allocation_failure_mid_stream_keeps_committed_bytes() {
    let store = limited_store(8);

    let mut writer = store.write("doc", WriteOptions::new()).await.unwrap();
    writer.write(&b"abcdef"[..]).await.unwrap();
    let result = writer.write(&b"ghijkl"[..]).await;
    assert!(matches!(result, Err(CoreError::AllocationFailure { .. })));

    assert!(store.lock_manager().snapshot("doc").is_idle());
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abcdef");

    let result = writer.write(&b"x"[..]).await;
    assert!(matches!(result, Err(CoreError::SessionClosed)));
}

#[tokio::test]
async fn abort_releases_and_keeps_bytes() {
    let store = ByteStore::open_in_memory();

    let mut writer = store.write("doc", WriteOptions::new().end(10)).await.unwrap();
    writer.write(&b"abc"[..]).await.unwrap();
    let err = writer.abort("upstream failed");

    assert!(matches!(err, CoreError::Aborted { ref reason } if reason == "upstream failed"));
    assert!(store.lock_manager().snapshot("doc").is_idle());
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new().end(3)).await.unwrap(),
        b"abc"
    );
}

#[tokio::test]
async fn dropped_writer_releases_lock() {
    let store = ByteStore::open_in_memory();

    let mut writer = store.write("doc", WriteOptions::new()).await.unwrap();
    writer.write(&b"abc"[..]).await.unwrap();
    drop(writer);

    assert!(store.lock_manager().snapshot("doc").is_idle());
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abc");
}

#[tokio::test]
async fn dropped_read_stream_releases_lock() {
    let store = memory_store(Config::new().read_chunk_size(1).read_ahead_chunks(1));
    put(&store, "doc", &[7u8; 64]).await;

    let mut stream = store.read("doc", ReadOptions::new()).await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap().as_ref(), &[7]);
    drop(stream);

    // The producer notices the closed channel on its next send
    let mut writer = tokio::time::timeout(
        Duration::from_secs(5),
        store.write("doc", WriteOptions::new()),
    )
    .await
    .expect("write lock was not released")
    .unwrap();
    writer.write(&b"z"[..]).await.unwrap();
}

#[tokio::test]
async fn stream_forwards_into_sink() {
    let store = memory_store(Config::new().read_chunk_size(3));
    put(&store, "src", b"copy me across").await;

    let source = store.read("src", ReadOptions::new()).await.unwrap();
    let mut sink = store.write("dst", WriteOptions::new()).await.unwrap();
    source.forward(&mut sink).await.unwrap();

    assert!(store.lock_manager().snapshot("dst").is_idle());
    assert_eq!(
        read_all(&store, "dst", ReadOptions::new()).await.unwrap(),
        b"copy me across"
    );
}

#[tokio::test]
async fn writer_as_sink_feeds_all_chunks() {
    let store = ByteStore::open_in_memory();

    let mut writer = store.write("doc", WriteOptions::new()).await.unwrap();
    let mut chunks =
        futures::stream::iter(["ab", "cd", "ef"].map(|s| Ok::<_, CoreError>(Bytes::from(s))));
    writer.send_all(&mut chunks).await.unwrap();
    let summary = writer.close().await.unwrap();

    assert_eq!(summary.bytes_written, 6);
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abcdef");
}

// ============================================================================
// Transform
// ============================================================================

#[tokio::test]
async fn transform_requires_existing_store() {
    let store = ByteStore::open_in_memory();
    let result = store.transform("missing", WriteOptions::new(), |_, _| async { Ok(()) }).await;
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
    assert!(!store.exists("missing").await.unwrap());
}

#[tokio::test]
async fn transform_rewrites_in_place() {
    let store = memory_store(Config::new().read_chunk_size(4));
    put(&store, "doc", b"hello transform").await;

    let summary = store
        .transform("doc", WriteOptions::new(), |source, mut sink| async move {
            let mut source = source;
            while let Some(chunk) = source.try_next().await? {
                sink.write(chunk.to_ascii_uppercase()).await?;
            }
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(summary.bytes_written, 15);
    assert_eq!(
        read_all(&store, "doc", ReadOptions::new()).await.unwrap(),
        b"HELLO TRANSFORM"
    );
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn transform_source_never_sees_its_own_writes() {
    let store = memory_store(Config::new().read_chunk_size(1));
    put(&store, "doc", b"abcd").await;

    let seen = store
        .transform("doc", WriteOptions::new(), |mut source, mut sink| async move {
            let first = source.try_next().await?.unwrap_or_default();
            sink.write(&b"XY"[..]).await?;
            let second = source.try_next().await?.unwrap_or_default();
            assert_eq!(first.as_ref(), b"a");
            assert_eq!(second.as_ref(), b"b");
            Ok(())
        })
        .await;
    seen.unwrap();

    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"XYcd");
}

#[tokio::test]
async fn transform_writes_past_source_end_immediately() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"ab").await;

    store
        .transform("doc", WriteOptions::new(), |source, mut sink| async move {
            let original: Vec<_> = source.try_collect().await?;
            assert_eq!(original.concat(), b"ab");
            sink.write(&b"abcdef"[..]).await?;
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abcdef");
}

#[tokio::test]
async fn failed_transform_flushes_and_returns_error() {
    let store = memory_store(Config::new().read_chunk_size(1));
    put(&store, "doc", b"abcd").await;

    let result = store
        .transform("doc", WriteOptions::new(), |_source, mut sink| async move {
            // Nothing read yet, so these are held back
            sink.write(&b"XY"[..]).await?;
            Err(CoreError::aborted("changed my mind"))
        })
        .await;

    assert!(matches!(result, Err(CoreError::Aborted { .. })));
    assert!(store.lock_manager().snapshot("doc").is_idle());
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"XYcd");
}

#[tokio::test]
async fn dropped_transform_write_is_still_applied() {
    let provider = Arc::new(SlowWriteProvider::new(Duration::from_millis(100)));
    let store = ByteStore::open(provider.clone(), Config::new().read_chunk_size(2));
    put(&store, "doc", b"abcd").await;

    let slow = Arc::clone(&provider);
    let summary = store
        .transform("doc", WriteOptions::new(), |mut source, mut sink| async move {
            assert_eq!(source.try_next().await?.unwrap_or_default(), &b"ab"[..]);
            slow.arm();

            // "WX" is being committed and "YZ" is held when the caller gives up
            let gave_up =
                tokio::time::timeout(Duration::from_millis(20), sink.write(&b"WXYZ"[..])).await;
            assert!(gave_up.is_err());
            drop(sink);
            Ok(())
        })
        .await
        .unwrap();

    assert_eq!(summary.bytes_written, 4);
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"WXYZ");
    assert!(store.lock_manager().snapshot("doc").is_idle());
}

#[tokio::test]
async fn bounded_transform_overflows() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abcdef").await;

    let result = store
        .transform("doc", WriteOptions::new().start(1).end(3), |_source, mut sink| async move {
            sink.write(&b"XYZ"[..]).await
        })
        .await;

    assert!(matches!(result, Err(CoreError::WriteOverflow { capacity: 2, .. })));
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"aXYdef");
}

// ============================================================================
// Status / resize / delete
// ============================================================================

#[tokio::test]
async fn status_of_missing_store_is_none() {
    let store = ByteStore::open_in_memory();
    assert!(store.status("missing").await.unwrap().is_none());
}

#[tokio::test]
async fn status_reports_size_and_times() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"12345").await;

    let status = store.status("doc").await.unwrap().unwrap();
    assert_eq!(status.size, 5);
    assert!(status.modified >= status.created);
}

#[tokio::test]
async fn status_waits_for_writer() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abc").await;

    let mut writer = store.write("doc", WriteOptions::new().start(3)).await.unwrap();
    let status = store.status("doc");
    tokio::pin!(status);
    assert!(stays_pending(&mut status).await);

    writer.write(&b"def"[..]).await.unwrap();
    writer.close().await.unwrap();

    let status = status.await.unwrap().unwrap();
    assert_eq!(status.size, 6);
}

#[tokio::test]
async fn status_is_not_blocked_by_readers() {
    let store = memory_store(Config::new().read_chunk_size(1).read_ahead_chunks(1));
    put(&store, "doc", &[1u8; 32]).await;

    let _reader = store.read("doc", ReadOptions::new()).await.unwrap();
    let status = tokio::time::timeout(Duration::from_secs(5), store.status("doc"))
        .await
        .expect("status blocked behind a reader")
        .unwrap();
    assert_eq!(status.unwrap().size, 32);
}

#[tokio::test]
async fn shrink_then_grow_reads_zeros() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", &[0xAB; 100]).await;

    store.resize("doc", 50).await.unwrap();
    store.resize("doc", 200).await.unwrap();

    assert_eq!(store.status("doc").await.unwrap().unwrap().size, 200);
    let middle = read_all(&store, "doc", ReadOptions::new().start(60).end(70)).await.unwrap();
    assert_eq!(middle, vec![0; 10]);
    let head = read_all(&store, "doc", ReadOptions::new().end(50)).await.unwrap();
    assert_eq!(head, vec![0xAB; 50]);
}

#[tokio::test]
async fn resize_negative_end_counts_from_length() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abcdef").await;

    store.resize("doc", -2).await.unwrap();
    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"abcd");

    let result = store.resize("doc", -5).await;
    assert!(matches!(result, Err(CoreError::InvalidRange { .. })));
}

#[tokio::test]
async fn resize_missing_store_is_not_found() {
    let store = ByteStore::open_in_memory();
    let result = store.resize("missing", 10).await;
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn resize_failure_keeps_length() {
    let store = limited_store(8);
    put(&store, "doc", b"abc").await;

    let result = store.resize("doc", 9).await;
    assert!(matches!(result, Err(CoreError::AllocationFailure { .. })));
    assert_eq!(store.status("doc").await.unwrap().unwrap().size, 3);
}

#[tokio::test]
async fn delete_then_read() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abc").await;

    assert!(store.delete("doc").await.unwrap());
    assert!(!store.delete("doc").await.unwrap());
    assert!(!store.delete("never").await.unwrap());

    let result = store.read("doc", ReadOptions::new()).await;
    assert!(matches!(result, Err(CoreError::NotFound { .. })));
}

#[tokio::test]
async fn store_can_be_recreated_after_delete() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"first").await;
    store.delete("doc").await.unwrap();
    put(&store, "doc", b"2nd").await;

    assert_eq!(read_all(&store, "doc", ReadOptions::new()).await.unwrap(), b"2nd");
}

#[tokio::test]
async fn delete_waits_for_sessions() {
    let store = ByteStore::open_in_memory();
    put(&store, "doc", b"abc").await;

    let writer = store.write("doc", WriteOptions::new().start(3)).await.unwrap();
    let delete = store.delete("doc");
    tokio::pin!(delete);
    assert!(stays_pending(&mut delete).await);

    writer.close().await.unwrap();
    assert!(delete.await.unwrap());
}

#[tokio::test]
async fn delete_can_revoke_sessions() {
    let store = memory_store(Config::new().delete_policy(DeletePolicy::RevokeSessions));
    put(&store, "doc", b"abc").await;

    let mut writer = store.write("doc", WriteOptions::new().start(3)).await.unwrap();
    assert!(store.delete("doc").await.unwrap());

    let result = writer.write(&b"d"[..]).await;
    assert!(matches!(result, Err(CoreError::LockRevoked { .. })));
}

// ============================================================================
// Forced release and timeouts
// ============================================================================

#[tokio::test]
async fn force_release_fails_live_streams() {
    let store = memory_store(Config::new().read_chunk_size(1).read_ahead_chunks(1));
    put(&store, "doc", &[5u8; 16]).await;

    let mut stream = store.read("doc", ReadOptions::new()).await.unwrap();
    assert!(stream.next().await.unwrap().is_ok());

    assert_eq!(store.force_release("doc"), 1);
    let next = stream.next().await.unwrap();
    assert!(matches!(next, Err(CoreError::LockRevoked { .. })));
    assert!(stream.next().await.is_none());
}

#[tokio::test]
async fn acquire_timeout_fails_with_lock_timeout() {
    let store = memory_store(Config::new().acquire_timeout(Some(Duration::from_millis(20))));
    put(&store, "doc", b"abc").await;

    let _writer = store.write("doc", WriteOptions::new()).await.unwrap();
    let result = store.read("doc", ReadOptions::new()).await;

    let err = result.unwrap_err();
    assert!(matches!(err, CoreError::LockTimeout { .. }));
    assert!(err.is_retryable());
    assert_eq!(store.lock_manager().snapshot("doc").waiting, 0);
}

// ============================================================================
// Directory-backed stores
// ============================================================================

#[tokio::test]
async fn directory_store_persists() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = ByteStore::open_dir(dir.path(), Config::default()).unwrap();
        put(&store, "notes/today", b"persisted").await;
        store.resize("notes/today", 4).await.unwrap();
    }

    let store = ByteStore::open_dir(dir.path(), Config::default()).unwrap();
    assert_eq!(
        read_all(&store, "notes/today", ReadOptions::new()).await.unwrap(),
        b"pers"
    );
    assert!(store.delete("notes/today").await.unwrap());
    assert!(!store.exists("notes/today").await.unwrap());
}

#[tokio::test]
async fn directory_is_exclusive() {
    let dir = tempfile::tempdir().unwrap();
    let _store = ByteStore::open_dir(dir.path(), Config::default()).unwrap();

    let second = ByteStore::open_dir(dir.path(), Config::default());
    assert!(matches!(second, Err(CoreError::Storage(_))));
}
