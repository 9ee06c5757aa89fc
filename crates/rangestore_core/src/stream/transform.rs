//! Read-modify-write sessions.
//!
//! A transform holds one write lock and exposes two ends: a source that
//! streams the range's current bytes and a sink that accepts replacement
//! bytes. Replacement bytes aimed at positions the source has not read yet
//! are held back until the source moves past them, so the source always
//! sees original content.

use super::write::{WriteCursor, WriteSummary};
use crate::error::{CoreError, CoreResult};
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{ready, Sink, Stream};
use std::collections::BTreeMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::Mutex;
use tracing::{debug, trace};

struct TransformState {
    cursor: WriteCursor,
    read_position: u64,
    read_end: u64,
    chunk_size: usize,
    pending: BTreeMap<u64, Bytes>,
}

impl TransformState {
    /// Reads the next source chunk, then flushes what it uncovered.
    async fn next_chunk(&mut self) -> Option<CoreResult<Bytes>> {
        if let Err(err) = self.cursor.check_open() {
            return Some(Err(err));
        }
        if self.read_position >= self.read_end {
            return None;
        }

        let left = self.read_end - self.read_position;
        let len = usize::try_from(left).map_or(self.chunk_size, |l| l.min(self.chunk_size));
        let chunk = match self.cursor.read(self.read_position, len).await {
            Ok(chunk) => chunk,
            Err(err) => return Some(Err(err)),
        };
        self.read_position += len as u64;

        if let Err(err) = self.flush_below(self.read_position).await {
            self.cursor.fail();
            return Some(Err(err));
        }
        Some(Ok(chunk))
    }

    /// Accepts replacement bytes at the write position.
    ///
    /// The position moves and every piece is queued before anything is
    /// committed, so a caller that stops waiting loses nothing: queued
    /// pieces are committed by the next flush.
    async fn write(&mut self, chunk: Bytes) -> CoreResult<()> {
        let (accepted, overflow) = self.cursor.admit(chunk)?;
        let offset = self.cursor.position();
        let end = offset + accepted.len() as u64;

        // [offset, end) splits into: already read, still unread, past the source
        let read_upto = self.read_position.clamp(offset, end);
        let source_end = self.read_end.clamp(read_upto, end);
        let cut = |at: u64| usize::try_from(at - offset).unwrap_or(usize::MAX);

        let held = accepted.slice(cut(read_upto)..cut(source_end));
        if !held.is_empty() {
            trace!(
                store = %self.cursor.name(),
                offset = read_upto,
                len = held.len(),
                "holding bytes for unread source"
            );
        }
        self.queue(offset, accepted.slice(..cut(read_upto)));
        self.queue(read_upto, held);
        self.queue(source_end, accepted.slice(cut(source_end)..));
        self.cursor.advance(accepted.len());

        if let Err(err) = self.flush_ready().await {
            self.cursor.fail();
            return Err(err);
        }

        if overflow {
            self.flush_below(u64::MAX).await?;
            self.cursor.fail();
            return Err(self.cursor.overflow());
        }
        Ok(())
    }

    fn queue(&mut self, offset: u64, data: Bytes) {
        if !data.is_empty() {
            self.pending.insert(offset, data);
        }
    }

    /// Commits every queued chunk clear of the unread source bytes.
    async fn flush_ready(&mut self) -> CoreResult<()> {
        self.flush_below(self.read_position).await?;
        loop {
            let Some((&offset, data)) = self.pending.range(self.read_end..).next() else {
                break;
            };
            let data = data.clone();
            self.cursor.commit(offset, data).await?;
            self.pending.remove(&offset);
        }
        Ok(())
    }

    /// Commits every queued chunk that starts below `limit`, splitting one
    /// that straddles it. A chunk leaves the queue only once committed.
    async fn flush_below(&mut self, limit: u64) -> CoreResult<()> {
        while let Some((&offset, data)) = self.pending.first_key_value() {
            if offset >= limit {
                break;
            }
            let mut data = data.clone();
            let fits = usize::try_from(limit - offset).unwrap_or(usize::MAX);
            if data.len() > fits {
                let rest = data.split_off(fits);
                self.pending.insert(offset, data.clone());
                self.pending.insert(limit, rest);
            }
            self.cursor.commit(offset, data).await?;
            self.pending.remove(&offset);
        }
        Ok(())
    }

    /// Ends the session, flushing held bytes while the lock is still held.
    async fn finish(&mut self, succeeded: bool) -> CoreResult<WriteSummary> {
        if let Err(err) = self.cursor.check_open() {
            if !self.pending.is_empty() {
                debug!(
                    store = %self.cursor.name(),
                    chunks = self.pending.len(),
                    "dropping held bytes, session already ended"
                );
            }
            self.pending.clear();
            self.cursor.fail();
            return match err {
                CoreError::SessionClosed => Ok(self.cursor.summary()),
                err => Err(err),
            };
        }

        if let Err(err) = self.flush_below(u64::MAX).await {
            self.cursor.fail();
            return Err(err);
        }
        if succeeded {
            self.cursor.close().await
        } else {
            let summary = self.cursor.summary();
            self.cursor.fail();
            Ok(summary)
        }
    }
}

type Shared = Arc<Mutex<TransformState>>;

/// An open transform session.
pub(crate) struct TransformSession {
    shared: Shared,
}

impl TransformSession {
    /// Starts a session over `cursor`.
    ///
    /// The source covers the cursor's range up to `length`, the store length
    /// when the session opened.
    pub fn new(cursor: WriteCursor, length: u64, chunk_size: usize) -> Self {
        let summary = cursor.summary();
        let read_end = summary.range.end().map_or(length, |end| end.min(length));
        let read_position = summary.range.start().min(read_end);

        Self {
            shared: Arc::new(Mutex::new(TransformState {
                cursor,
                read_position,
                read_end,
                chunk_size: chunk_size.max(1),
                pending: BTreeMap::new(),
            })),
        }
    }

    /// Returns the source and sink ends of the session.
    pub fn split(&self) -> (TransformSource, TransformSink) {
        (
            TransformSource {
                shared: Arc::clone(&self.shared),
                pending: None,
                done: false,
            },
            TransformSink {
                shared: Arc::clone(&self.shared),
                pending: None,
            },
        )
    }

    /// Flushes held bytes and closes the session.
    ///
    /// With `succeeded == false` the lock is released without applying the
    /// interrupted write policy.
    pub async fn finish(self, succeeded: bool) -> CoreResult<WriteSummary> {
        self.shared.lock().await.finish(succeeded).await
    }
}

async fn next_chunk(shared: Shared) -> Option<CoreResult<Bytes>> {
    shared.lock().await.next_chunk().await
}

async fn write_chunk(shared: Shared, chunk: Bytes) -> CoreResult<()> {
    shared.lock().await.write(chunk).await
}

/// The source end of a transform: the range's original bytes, in order.
///
/// Reading past a position releases any replacement bytes held for it.
pub struct TransformSource {
    shared: Shared,
    pending: Option<BoxFuture<'static, Option<CoreResult<Bytes>>>>,
    done: bool,
}

impl Stream for TransformSource {
    type Item = CoreResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        let pending = this
            .pending
            .get_or_insert_with(|| Box::pin(next_chunk(Arc::clone(&this.shared))));
        let item = ready!(pending.as_mut().poll(cx));
        this.pending = None;
        if !matches!(item, Some(Ok(_))) {
            this.done = true;
        }
        Poll::Ready(item)
    }
}

impl std::fmt::Debug for TransformSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformSource")
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

/// The sink end of a transform: replacement bytes, written sequentially
/// from the start of the range.
pub struct TransformSink {
    shared: Shared,
    pending: Option<BoxFuture<'static, CoreResult<()>>>,
}

impl TransformSink {
    /// Accepts one chunk of replacement bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteOverflow`] once a bounded range would be
    /// exceeded, or the storage error that ended the session.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> CoreResult<()> {
        futures::SinkExt::send(self, chunk.into()).await
    }

    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        let Some(pending) = &mut self.pending else {
            return Poll::Ready(Ok(()));
        };
        let result = ready!(pending.as_mut().poll(cx));
        self.pending = None;
        Poll::Ready(result)
    }
}

impl Sink<Bytes> for TransformSink {
    type Error = CoreError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        self.get_mut().poll_pending(cx)
    }

    fn start_send(self: Pin<&mut Self>, chunk: Bytes) -> CoreResult<()> {
        let this = self.get_mut();
        this.pending = Some(Box::pin(write_chunk(Arc::clone(&this.shared), chunk)));
        Ok(())
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        self.get_mut().poll_pending(cx)
    }

    // The session itself closes when the transform closure returns
    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        self.get_mut().poll_pending(cx)
    }
}

impl std::fmt::Debug for TransformSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformSink")
            .field("busy", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}
