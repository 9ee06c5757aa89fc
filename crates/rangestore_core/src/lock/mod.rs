//! Range lock management.
//!
//! Every read, write, transform, resize and delete runs under a lock on a
//! byte range of its store:
//!
//! - Read locks share with each other
//! - A write lock excludes every overlapping lock
//! - Waiting requests are served in arrival order
//!
//! Locks never upgrade or downgrade.

mod guard;
mod manager;
mod table;

pub use guard::LockGuard;
pub(crate) use guard::begin_io;
pub use manager::{LockManager, LockSnapshot};

use std::sync::Arc;

/// A shared hold on a granted lock.
///
/// Background I/O carries a clone, so the lock is released only once the
/// session and every call it started have finished.
pub(crate) type Lease = Arc<LockGuard>;
