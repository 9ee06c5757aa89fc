//! Lock guards.

use super::manager::LockManager;
use super::table::Hold;
use super::Lease;
use crate::error::{CoreError, CoreResult};
use crate::types::{ByteRange, LockMode, SessionId};
use std::fmt;
use std::sync::Arc;

/// A granted range lock.
///
/// The lock is released exactly once: by [`LockGuard::release`] or when the
/// guard is dropped, whichever comes first.
pub struct LockGuard {
    manager: LockManager,
    store: Arc<str>,
    id: SessionId,
    range: ByteRange,
    mode: LockMode,
    hold: Arc<Hold>,
    released: bool,
}

impl LockGuard {
    pub(crate) fn new(
        manager: LockManager,
        store: Arc<str>,
        id: SessionId,
        range: ByteRange,
        mode: LockMode,
        hold: Arc<Hold>,
    ) -> Self {
        Self {
            manager,
            store,
            id,
            range,
            mode,
            hold,
            released: false,
        }
    }

    /// Returns the session holding this lock.
    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Returns the store name.
    #[must_use]
    pub fn store(&self) -> &str {
        &self.store
    }

    /// Returns the locked range.
    #[must_use]
    pub fn range(&self) -> ByteRange {
        self.range
    }

    /// Returns the lock mode.
    #[must_use]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    /// Returns true if the lock was forcibly released.
    #[must_use]
    pub fn is_revoked(&self) -> bool {
        self.hold.is_revoked()
    }

    /// Fails with [`CoreError::LockRevoked`] if the lock was forcibly released.
    pub(crate) fn check(&self) -> CoreResult<()> {
        if self.is_revoked() {
            Err(CoreError::lock_revoked(&*self.store))
        } else {
            Ok(())
        }
    }

    /// Releases the lock now.
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.manager.release(&self.store, self.id);
        }
    }
}

/// A medium call running under a lock.
///
/// While any permit is alive a revoked lock stays in its table. Dropping
/// the last one of a revoked lock takes it out and wakes waiters.
pub(crate) struct IoPermit {
    lease: Lease,
}

/// Registers a medium call under `lease`.
///
/// Fails with [`CoreError::LockRevoked`] once the lock is revoked, so no
/// call starts after revocation.
pub(crate) fn begin_io(lease: &Lease) -> CoreResult<IoPermit> {
    if lease.hold.begin_io() {
        Ok(IoPermit {
            lease: Lease::clone(lease),
        })
    } else {
        Err(CoreError::lock_revoked(&*lease.store))
    }
}

impl Drop for IoPermit {
    fn drop(&mut self) {
        let lock = &self.lease;
        if lock.hold.end_io() {
            lock.manager.release(&lock.store, lock.id);
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("store", &self.store)
            .field("id", &self.id)
            .field("range", &self.range)
            .field("mode", &self.mode)
            .field("revoked", &self.is_revoked())
            .finish_non_exhaustive()
    }
}
