//! Read streams.

use crate::error::CoreResult;
use crate::lock::Lease;
use crate::registry::StoreHandle;
use crate::types::ByteRange;
use bytes::Bytes;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// A stream of chunks from a locked byte range.
///
/// A background task reads the range in chunks of at most
/// `read_chunk_size` bytes and runs at most `read_ahead_chunks` ahead of the
/// consumer. The read lock is released once the stream ends, fails, or is
/// dropped.
pub struct ReadStream {
    chunks: mpsc::Receiver<CoreResult<Bytes>>,
    lease: Option<Lease>,
    range: ByteRange,
}

impl ReadStream {
    pub(crate) fn spawn(
        handle: StoreHandle,
        lease: Lease,
        chunk_size: usize,
        read_ahead: usize,
    ) -> Self {
        let range = lease.range();
        let (tx, rx) = mpsc::channel(read_ahead.max(1));
        tokio::spawn(produce(handle, Lease::clone(&lease), chunk_size.max(1), tx));
        Self {
            chunks: rx,
            lease: Some(lease),
            range,
        }
    }

    /// Returns the resolved range this stream covers.
    #[must_use]
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Stops reading and releases the lock.
    pub fn close(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        self.chunks.close();
        if let Some(lease) = self.lease.take() {
            trace!(store = %lease.store(), id = %lease.id(), "read stream finished");
        }
    }
}

impl Stream for ReadStream {
    type Item = CoreResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(lease) = &this.lease else {
            return Poll::Ready(None);
        };
        if let Err(err) = lease.check() {
            this.finish();
            return Poll::Ready(Some(Err(err)));
        }

        match this.chunks.poll_recv(cx) {
            Poll::Ready(Some(Ok(chunk))) => Poll::Ready(Some(Ok(chunk))),
            Poll::Ready(Some(Err(err))) => {
                this.finish();
                Poll::Ready(Some(Err(err)))
            }
            Poll::Ready(None) => {
                this.finish();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl std::fmt::Debug for ReadStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadStream")
            .field("range", &self.range)
            .field("open", &self.lease.is_some())
            .finish_non_exhaustive()
    }
}

type ChunkSender = mpsc::Sender<CoreResult<Bytes>>;

async fn produce(handle: StoreHandle, lease: Lease, chunk_size: usize, tx: ChunkSender) {
    read_range(&handle, &lease, chunk_size, &tx).await;
    // Release before the consumer can observe the end of the stream
    drop(lease);
    drop(tx);
}

async fn read_range(handle: &StoreHandle, lease: &Lease, chunk_size: usize, tx: &ChunkSender) {
    let range = lease.range();
    let end = range.end().unwrap_or(range.start());
    let mut position = range.start();

    while position < end {
        if let Err(err) = lease.check() {
            let _ = tx.send(Err(err)).await;
            return;
        }

        let len = usize::try_from(end - position).map_or(chunk_size, |left| left.min(chunk_size));
        let chunk = handle.read_at(position, len, lease).await;
        let failed = chunk.is_err();
        if tx.send(chunk).await.is_err() {
            trace!(store = %handle.name(), "read stream consumer went away");
            return;
        }
        if failed {
            return;
        }
        position += len as u64;
    }
}
