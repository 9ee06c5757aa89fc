//! Write sessions.

use crate::allocator::Allocator;
use crate::config::InterruptedWritePolicy;
use crate::error::{CoreError, CoreResult};
use crate::lock::Lease;
use crate::registry::StoreHandle;
use crate::types::ByteRange;
use bytes::Bytes;
use futures::future::BoxFuture;
use futures::{ready, Sink, SinkExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::{debug, trace};

const ZERO_FILL_CHUNK: usize = 64 * 1024;

/// Outcome of a finished write or transform session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    /// The resolved range the session held.
    pub range: ByteRange,
    /// Bytes committed by the producer, not counting zero fill.
    pub bytes_written: u64,
}

impl WriteSummary {
    /// Returns true if a bounded range was written in full.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.range.len() == Some(self.bytes_written)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CursorState {
    Open,
    Closed,
    Failed,
}

/// Session settings taken from the store configuration.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WriteSettings {
    pub interrupted_write: InterruptedWritePolicy,
    pub sync_on_close: bool,
}

/// Position tracking and commit logic shared by writers and transforms.
pub(crate) struct WriteCursor {
    handle: StoreHandle,
    allocator: Allocator,
    lease: Option<Lease>,
    range: ByteRange,
    position: u64,
    allocated: u64,
    settings: WriteSettings,
    state: CursorState,
}

impl WriteCursor {
    /// Opens a session on a granted write lock.
    ///
    /// Allocates up front when the range reaches past the current length,
    /// so an allocation failure surfaces before any byte is accepted.
    pub async fn open(
        handle: StoreHandle,
        allocator: Allocator,
        lease: Lease,
        settings: WriteSettings,
    ) -> CoreResult<Self> {
        let range = lease.range();
        let length = handle.length().await?.unwrap_or(0);
        let target = range.end().unwrap_or(range.start());

        let allocated = if target > length {
            allocator.grow_to(&handle, target, &lease).await?
        } else {
            length
        };

        debug!(store = %handle.name(), id = %lease.id(), %range, "write session opened");
        Ok(Self {
            handle,
            allocator,
            range,
            position: range.start(),
            allocated,
            settings,
            state: CursorState::Open,
            lease: Some(lease),
        })
    }

    pub fn name(&self) -> &str {
        self.handle.name()
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    fn remaining(&self) -> Option<u64> {
        self.range.end().map(|end| end - self.position)
    }

    pub fn summary(&self) -> WriteSummary {
        WriteSummary {
            range: self.range,
            bytes_written: self.position - self.range.start(),
        }
    }

    /// Fails unless the session is open and its lock is intact.
    pub fn check_open(&self) -> CoreResult<()> {
        match (&self.state, &self.lease) {
            (CursorState::Open, Some(lease)) => lease.check(),
            _ => Err(CoreError::SessionClosed),
        }
    }

    /// Splits `chunk` into the part that fits and whether any was cut off.
    pub fn admit(&self, chunk: Bytes) -> CoreResult<(Bytes, bool)> {
        // A filled range stays closed to anything but empty chunks
        if self.state == CursorState::Closed && self.remaining() == Some(0) {
            return if chunk.is_empty() {
                Ok((chunk, false))
            } else {
                Err(self.overflow())
            };
        }
        self.check_open()?;

        Ok(match self.remaining() {
            Some(left) if chunk.len() as u64 > left => {
                let fit = usize::try_from(left).unwrap_or(usize::MAX);
                (chunk.slice(..fit), true)
            }
            _ => (chunk, false),
        })
    }

    pub fn overflow(&self) -> CoreError {
        CoreError::write_overflow(self.name(), self.range.len().unwrap_or(u64::MAX))
    }

    /// Writes `data` at `offset`, growing the store first if needed.
    pub async fn commit(&mut self, offset: u64, data: Bytes) -> CoreResult<()> {
        if data.is_empty() {
            return Ok(());
        }
        let lease = match &self.lease {
            Some(lease) => Lease::clone(lease),
            None => return Err(CoreError::SessionClosed),
        };
        lease.check()?;

        let needed = offset + data.len() as u64;
        if needed > self.allocated {
            self.allocated = self.allocator.grow_to(&self.handle, needed, &lease).await?;
        }
        self.handle.write_at(offset, data, &lease).await
    }

    pub fn advance(&mut self, len: usize) {
        self.position += len as u64;
    }

    /// Reads committed bytes under this session's lock.
    pub async fn read(&self, offset: u64, len: usize) -> CoreResult<Bytes> {
        let lease = self.lease.as_ref().ok_or(CoreError::SessionClosed)?;
        lease.check()?;
        self.handle.read_at(offset, len, lease).await
    }

    /// Writes a producer chunk at the current position.
    ///
    /// A bounded session completes and releases its lock as soon as the
    /// range is full. Bytes past the end fail with `WriteOverflow` after the
    /// fitting prefix is committed.
    pub async fn write_chunk(&mut self, chunk: Bytes) -> CoreResult<()> {
        let (accepted, overflow) = self.admit(chunk)?;
        if !accepted.is_empty() {
            let len = accepted.len();
            if let Err(err) = self.commit(self.position, accepted).await {
                self.fail();
                return Err(err);
            }
            self.advance(len);
            trace!(store = %self.name(), position = self.position, "chunk committed");
        }

        if overflow {
            self.fail();
            return Err(self.overflow());
        }
        if self.remaining() == Some(0) {
            self.close().await?;
        }
        Ok(())
    }

    /// Ends the session normally.
    ///
    /// Applies the interrupted write policy to an unfilled bounded range,
    /// syncs if configured and releases the lock. Closing again is a no-op.
    pub async fn close(&mut self) -> CoreResult<WriteSummary> {
        match self.state {
            CursorState::Closed => return Ok(self.summary()),
            CursorState::Failed => return Err(CoreError::SessionClosed),
            CursorState::Open => {}
        }

        if let Err(err) = self.finish_writes().await {
            self.fail();
            return Err(err);
        }

        self.state = CursorState::Closed;
        self.lease = None;
        let summary = self.summary();
        debug!(
            store = %self.name(),
            range = %summary.range,
            bytes = summary.bytes_written,
            "write session closed"
        );
        Ok(summary)
    }

    async fn finish_writes(&mut self) -> CoreResult<()> {
        self.check_open()?;

        let policy = self.settings.interrupted_write;
        if let (Some(left), InterruptedWritePolicy::ZeroFill) = (self.remaining(), policy) {
            if left > 0 {
                debug!(
                    store = %self.name(),
                    from = self.position,
                    bytes = left,
                    "zero-filling unwritten tail"
                );
                let mut offset = self.position;
                let mut left = left;
                while left > 0 {
                    let len =
                        usize::try_from(left).map_or(ZERO_FILL_CHUNK, |l| l.min(ZERO_FILL_CHUNK));
                    self.commit(offset, Bytes::from(vec![0u8; len])).await?;
                    offset += len as u64;
                    left -= len as u64;
                }
            }
        }

        if self.settings.sync_on_close {
            if let Some(lease) = &self.lease {
                self.handle.sync(lease).await?;
            }
        }
        Ok(())
    }

    /// Ends the session without further writes; committed bytes stay.
    pub fn fail(&mut self) {
        if self.state == CursorState::Open {
            self.state = CursorState::Failed;
        }
        if let Some(lease) = self.lease.take() {
            trace!(store = %self.name(), id = %lease.id(), "write session terminated");
        }
    }
}

type Pending = BoxFuture<'static, (WriteCursor, CoreResult<()>)>;

/// A sink that commits chunks into a locked byte range.
///
/// Use the async methods directly or drive it as a [`Sink<Bytes>`]. The
/// write lock is released when the range fills, on [`StoreWriter::close`],
/// on error, on [`StoreWriter::abort`], or when the writer is dropped.
/// Dropping the writer keeps whatever was committed.
pub struct StoreWriter {
    cursor: Option<WriteCursor>,
    pending: Option<Pending>,
    closing: bool,
}

impl StoreWriter {
    pub(crate) fn new(cursor: WriteCursor) -> Self {
        Self {
            cursor: Some(cursor),
            pending: None,
            closing: false,
        }
    }

    /// Commits one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::WriteOverflow`] once a bounded range would be
    /// exceeded, or the storage error that ended the session.
    pub async fn write(&mut self, chunk: impl Into<Bytes>) -> CoreResult<()> {
        self.send(chunk.into()).await
    }

    /// Ends the session and returns what was written.
    ///
    /// # Errors
    ///
    /// Returns an error if the session already failed or the final zero
    /// fill or sync fails.
    pub async fn close(mut self) -> CoreResult<WriteSummary> {
        SinkExt::close(&mut self).await?;
        self.cursor
            .as_ref()
            .map(WriteCursor::summary)
            .ok_or(CoreError::SessionClosed)
    }

    /// Ends the session because the producer failed.
    ///
    /// Committed bytes stay; the lock is released and the returned
    /// [`CoreError::Aborted`] carries `reason`.
    pub fn abort(mut self, reason: impl Into<String>) -> CoreError {
        let reason = reason.into();
        self.pending = None;
        if let Some(cursor) = &mut self.cursor {
            debug!(store = %cursor.name(), %reason, "write session aborted");
            cursor.fail();
        }
        CoreError::aborted(reason)
    }

    /// Returns what has been committed so far.
    #[must_use]
    pub fn summary(&self) -> Option<WriteSummary> {
        self.cursor.as_ref().map(WriteCursor::summary)
    }

    fn poll_pending(&mut self, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        let Some(pending) = &mut self.pending else {
            return Poll::Ready(Ok(()));
        };
        let (cursor, result) = ready!(pending.as_mut().poll(cx));
        self.pending = None;
        self.cursor = Some(cursor);
        Poll::Ready(result)
    }

    fn start(&mut self, op: impl FnOnce(WriteCursor) -> Pending) -> CoreResult<()> {
        let cursor = self.cursor.take().ok_or(CoreError::SessionClosed)?;
        self.pending = Some(op(cursor));
        Ok(())
    }
}

impl Sink<Bytes> for StoreWriter {
    type Error = CoreError;

    fn poll_ready(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        self.get_mut().poll_pending(cx)
    }

    fn start_send(self: Pin<&mut Self>, chunk: Bytes) -> CoreResult<()> {
        self.get_mut().start(|mut cursor| {
            Box::pin(async move {
                let result = cursor.write_chunk(chunk).await;
                (cursor, result)
            })
        })
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        self.get_mut().poll_pending(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<CoreResult<()>> {
        let this = self.get_mut();
        ready!(this.poll_pending(cx))?;
        if !this.closing {
            this.closing = true;
            this.start(|mut cursor| {
                Box::pin(async move {
                    let result = cursor.close().await.map(|_| ());
                    (cursor, result)
                })
            })?;
        }
        this.poll_pending(cx)
    }
}

impl std::fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreWriter")
            .field("summary", &self.summary())
            .field("busy", &self.pending.is_some())
            .finish_non_exhaustive()
    }
}
