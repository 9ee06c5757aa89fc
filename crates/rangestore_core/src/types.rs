//! Core type definitions for rangestore.

use crate::error::{CoreError, CoreResult};
use rangestore_storage::MediumMetadata;
use std::fmt;
use std::time::SystemTime;

/// Unique identifier for a lock session.
///
/// Session IDs are monotonically increasing per lock manager and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionId(pub u64);

impl SessionId {
    /// Creates a new session ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session:{}", self.0)
    }
}

/// Access mode of a range lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    /// Shared; overlaps freely with other reads.
    Read,
    /// Exclusive; overlaps nothing.
    Write,
}

impl LockMode {
    /// Returns true if two locks in these modes may hold overlapping ranges.
    #[must_use]
    pub const fn compatible_with(self, other: Self) -> bool {
        matches!((self, other), (Self::Read, Self::Read))
    }
}

impl fmt::Display for LockMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

/// A half-open byte interval `[start, end)`.
///
/// `end == None` means open-ended: the range covers everything from `start`
/// on, including bytes that do not exist yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    start: u64,
    end: Option<u64>,
}

impl ByteRange {
    /// Creates a bounded range. `end` is clamped up to `start`.
    #[must_use]
    pub const fn bounded(start: u64, end: u64) -> Self {
        Self {
            start,
            end: Some(if end < start { start } else { end }),
        }
    }

    /// Creates an open-ended range starting at `start`.
    #[must_use]
    pub const fn starting_at(start: u64) -> Self {
        Self { start, end: None }
    }

    /// Creates a range covering every byte of a store.
    #[must_use]
    pub const fn full() -> Self {
        Self::starting_at(0)
    }

    /// Returns the first byte of the range.
    #[must_use]
    pub const fn start(&self) -> u64 {
        self.start
    }

    /// Returns the exclusive end, or `None` if open-ended.
    #[must_use]
    pub const fn end(&self) -> Option<u64> {
        self.end
    }

    /// Returns the number of bytes covered, or `None` if open-ended.
    #[must_use]
    pub const fn len(&self) -> Option<u64> {
        match self.end {
            Some(end) => Some(end - self.start),
            None => None,
        }
    }

    /// Returns true if the range is bounded and covers no bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        matches!(self.end, Some(end) if end == self.start)
    }

    /// Returns true if the ranges share at least one byte.
    ///
    /// `[a, b)` and `[c, d)` overlap iff `a < d && c < b`, where an open end
    /// compares greater than every offset.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        let below = |offset: u64, end: Option<u64>| end.map_or(true, |end| offset < end);
        below(self.start, other.end) && below(other.start, self.end)
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "[{}, {})", self.start, end),
            None => write!(f, "[{}, ∞)", self.start),
        }
    }
}

/// Resolves a possibly negative offset against `length`.
pub(crate) fn resolve_offset(offset: i64, length: u64) -> i64 {
    if offset < 0 {
        i64::try_from(length).unwrap_or(i64::MAX).saturating_add(offset)
    } else {
        offset
    }
}

/// Offsets for a read. Negative values count back from the store length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// First byte to read (default 0).
    pub start: Option<i64>,
    /// Exclusive end (default: store length).
    pub end: Option<i64>,
}

impl ReadOptions {
    /// Creates options covering the whole store.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Sets the start offset.
    #[must_use]
    pub const fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the end offset.
    #[must_use]
    pub const fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Resolves against the current length; reads must stay inside the store.
    pub(crate) fn resolve(&self, name: &str, length: u64) -> CoreResult<ByteRange> {
        let start = resolve_offset(self.start.unwrap_or(0), length);
        let end = match self.end {
            Some(end) => resolve_offset(end, length),
            None => i64::try_from(length).unwrap_or(i64::MAX),
        };

        let len = i64::try_from(length).unwrap_or(i64::MAX);
        if start < 0 || start > len || end < 0 || end > len || end < start {
            return Err(CoreError::invalid_range(name, start, Some(end), length));
        }
        Ok(ByteRange::bounded(start as u64, end as u64))
    }
}

/// Offsets for a write or transform.
///
/// Negative values count back from the store length (0 for a missing
/// store). Leaving `end` unset makes the range open-ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// First byte to write (default 0).
    pub start: Option<i64>,
    /// Exclusive end (default: unbounded).
    pub end: Option<i64>,
}

impl WriteOptions {
    /// Creates options for an unbounded write from offset 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            start: None,
            end: None,
        }
    }

    /// Sets the start offset.
    #[must_use]
    pub const fn start(mut self, start: i64) -> Self {
        self.start = Some(start);
        self
    }

    /// Sets the end offset.
    #[must_use]
    pub const fn end(mut self, end: i64) -> Self {
        self.end = Some(end);
        self
    }

    /// Resolves against the current length; writes may extend the store.
    pub(crate) fn resolve(&self, name: &str, length: u64) -> CoreResult<ByteRange> {
        let start = resolve_offset(self.start.unwrap_or(0), length);
        let end = self.end.map(|end| resolve_offset(end, length));

        let malformed = match end {
            Some(end) => start < 0 || end < 0 || end < start,
            None => start < 0,
        };
        if malformed {
            return Err(CoreError::invalid_range(name, start, end, length));
        }
        Ok(match end {
            Some(end) => ByteRange::bounded(start as u64, end as u64),
            None => ByteRange::starting_at(start as u64),
        })
    }
}

/// Size and timestamps of an existing store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreStatus {
    /// Current length in bytes.
    pub size: u64,
    /// When the store was created.
    pub created: SystemTime,
    /// When the store was last modified.
    pub modified: SystemTime,
}

impl From<MediumMetadata> for StoreStatus {
    fn from(meta: MediumMetadata) -> Self {
        Self {
            size: meta.size,
            created: meta.created,
            modified: meta.modified,
        }
    }
}
