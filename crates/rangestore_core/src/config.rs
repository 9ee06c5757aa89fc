//! Store configuration.

use std::time::Duration;

/// What happens to the rest of a bounded range when its producer stops early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptedWritePolicy {
    /// Leave unwritten bytes as allocated (zeros) or as their prior content.
    #[default]
    Retain,
    /// Zero the unwritten tail `[position, end)` before releasing the lock.
    ZeroFill,
}

/// How `status` interacts with in-flight writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Wait until no write lock is held on the store.
    #[default]
    AwaitWriters,
    /// Report whatever the medium says right now.
    BestEffort,
}

/// How `delete` treats sessions that still hold locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletePolicy {
    /// Wait for every session on the store to release.
    #[default]
    AwaitRelease,
    /// Revoke live sessions, then delete.
    RevokeSessions,
}

/// Configuration for a [`crate::ByteStore`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum bytes per chunk produced by a read stream.
    pub read_chunk_size: usize,

    /// Chunks a read producer may run ahead of its consumer.
    pub read_ahead_chunks: usize,

    /// Give up on lock acquisition after this long (`None` = wait forever).
    pub acquire_timeout: Option<Duration>,

    /// Policy for bounded writes whose producer closes early.
    pub interrupted_write: InterruptedWritePolicy,

    /// Policy for status during in-flight writes.
    pub status_policy: StatusPolicy,

    /// Policy for delete while sessions are live.
    pub delete_policy: DeletePolicy,

    /// Whether to sync the medium when a write session closes.
    pub sync_on_close: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            read_chunk_size: 64 * 1024, // 64 KiB
            read_ahead_chunks: 4,
            acquire_timeout: None,
            interrupted_write: InterruptedWritePolicy::Retain,
            status_policy: StatusPolicy::AwaitWriters,
            delete_policy: DeletePolicy::AwaitRelease,
            sync_on_close: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the maximum read chunk size. Zero is treated as one byte.
    #[must_use]
    pub const fn read_chunk_size(mut self, size: usize) -> Self {
        self.read_chunk_size = if size == 0 { 1 } else { size };
        self
    }

    /// Sets how many chunks a read producer may buffer. Zero is treated as one.
    #[must_use]
    pub const fn read_ahead_chunks(mut self, chunks: usize) -> Self {
        self.read_ahead_chunks = if chunks == 0 { 1 } else { chunks };
        self
    }

    /// Sets the lock acquisition timeout.
    #[must_use]
    pub const fn acquire_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Sets the interrupted write policy.
    #[must_use]
    pub const fn interrupted_write(mut self, policy: InterruptedWritePolicy) -> Self {
        self.interrupted_write = policy;
        self
    }

    /// Sets the status policy.
    #[must_use]
    pub const fn status_policy(mut self, policy: StatusPolicy) -> Self {
        self.status_policy = policy;
        self
    }

    /// Sets the delete policy.
    #[must_use]
    pub const fn delete_policy(mut self, policy: DeletePolicy) -> Self {
        self.delete_policy = policy;
        self
    }

    /// Sets whether to sync when a write session closes.
    #[must_use]
    pub const fn sync_on_close(mut self, value: bool) -> Self {
        self.sync_on_close = value;
        self
    }
}
