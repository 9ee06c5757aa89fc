//! The lock manager.

use super::guard::LockGuard;
use super::table::{Granted, Hold, LockTable, Waiter};
use crate::error::{CoreError, CoreResult};
use crate::types::{ByteRange, LockMode, SessionId};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

/// Point-in-time view of the locks on one store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockSnapshot {
    /// Granted read locks.
    pub readers: usize,
    /// Granted write locks.
    pub writers: usize,
    /// Queued requests.
    pub waiting: usize,
}

impl LockSnapshot {
    /// Returns true if nothing is granted or queued.
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.readers == 0 && self.writers == 0 && self.waiting == 0
    }
}

struct ManagerInner {
    tables: Mutex<HashMap<Arc<str>, LockTable>>,
    next_id: AtomicU64,
    acquire_timeout: Option<Duration>,
}

/// Grants read/write locks on byte ranges of named stores.
///
/// Read locks share; a write lock excludes every overlapping lock. Requests
/// that cannot be granted wait in arrival order, and a request is never
/// granted ahead of an earlier conflicting one. Each `ByteStore` owns one
/// manager; clones share state.
#[derive(Clone)]
pub struct LockManager {
    inner: Arc<ManagerInner>,
}

impl LockManager {
    /// Creates a manager that waits indefinitely.
    #[must_use]
    pub fn new() -> Self {
        Self::with_acquire_timeout(None)
    }

    /// Creates a manager whose acquisitions give up after `timeout`.
    #[must_use]
    pub fn with_acquire_timeout(timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(ManagerInner {
                tables: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                acquire_timeout: timeout,
            }),
        }
    }

    /// Acquires a lock, waiting until it can be granted.
    ///
    /// Dropping the returned future before it completes withdraws the
    /// request, or releases the lock if it was granted in the meantime.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::LockTimeout`] if an acquire timeout is configured
    /// and expires first.
    pub async fn acquire(
        &self,
        store: &str,
        range: ByteRange,
        mode: LockMode,
    ) -> CoreResult<LockGuard> {
        let store: Arc<str> = Arc::from(store);
        let id = SessionId::new(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let hold = Arc::new(Hold::default());

        let wake = {
            let mut tables = self.inner.tables.lock();
            let table = tables.entry(Arc::clone(&store)).or_default();
            if table.admits(&range, mode) {
                table.grant(Granted {
                    id,
                    range,
                    mode,
                    hold: Arc::clone(&hold),
                });
                trace!(store = %store, %id, %range, %mode, "lock granted");
                None
            } else {
                let (tx, rx) = oneshot::channel();
                table.enqueue(Waiter {
                    id,
                    range,
                    mode,
                    hold: Arc::clone(&hold),
                    wake: tx,
                });
                debug!(store = %store, %id, %range, %mode, "lock queued");
                Some(rx)
            }
        };

        if let Some(wake) = wake {
            let pending = PendingAcquire {
                manager: self.clone(),
                store: Arc::clone(&store),
                id,
                armed: true,
            };

            let woken = match self.inner.acquire_timeout {
                Some(timeout) => match tokio::time::timeout(timeout, wake).await {
                    Ok(woken) => woken,
                    Err(_) => {
                        debug!(store = %store, %id, ?timeout, "lock acquisition timed out");
                        return Err(CoreError::lock_timeout(&*store));
                    }
                },
                None => wake.await,
            };
            // The table only drops a waiter's sender unsent once its receiver is gone
            if woken.is_err() {
                return Err(CoreError::lock_revoked(&*store));
            }
            pending.disarm();
            trace!(store = %store, %id, "queued lock granted");
        }

        Ok(LockGuard::new(self.clone(), store, id, range, mode, hold))
    }

    /// Releases a granted lock and wakes whatever became eligible.
    pub(crate) fn release(&self, store: &str, id: SessionId) {
        let mut tables = self.inner.tables.lock();
        let Some(table) = tables.get_mut(store) else {
            return;
        };
        if table.remove_granted(id) {
            trace!(store = %store, %id, "lock released");
            let promoted = table.promote();
            if !promoted.is_empty() {
                trace!(store = %store, count = promoted.len(), "waiters promoted");
            }
        }
        if table.is_idle() {
            tables.remove(store);
        }
    }

    /// Withdraws a request whose acquiring future was dropped.
    fn cancel(&self, store: &str, id: SessionId) {
        let mut tables = self.inner.tables.lock();
        let Some(table) = tables.get_mut(store) else {
            return;
        };
        if table.remove_waiter(id) {
            debug!(store = %store, %id, "lock request withdrawn");
        } else if table.remove_granted(id) {
            debug!(store = %store, %id, "lock granted to abandoned request, releasing");
        }
        // Removing a waiter can unblock requests queued behind it
        table.promote();
        if table.is_idle() {
            tables.remove(store);
        }
    }

    /// Revokes every granted lock on `store` and wakes eligible waiters.
    ///
    /// Holders observe the revocation through [`LockGuard::is_revoked`];
    /// streams fail their next step with [`CoreError::LockRevoked`]. A
    /// revoked lock whose medium call is still running keeps blocking
    /// overlapping requests until that call returns. Returns the number of
    /// revoked sessions.
    pub fn revoke_store(&self, store: &str) -> usize {
        let mut tables = self.inner.tables.lock();
        let Some(table) = tables.get_mut(store) else {
            return 0;
        };
        let revoked = table.revoke_all();
        if !revoked.is_empty() {
            warn!(store = %store, count = revoked.len(), "locks revoked");
        }
        table.promote();
        if table.is_idle() {
            tables.remove(store);
        }
        revoked.len()
    }

    /// Returns the current lock counts for `store`.
    #[must_use]
    pub fn snapshot(&self, store: &str) -> LockSnapshot {
        let tables = self.inner.tables.lock();
        let Some(table) = tables.get(store) else {
            return LockSnapshot::default();
        };
        let (readers, writers) = table.granted().fold((0, 0), |(r, w), g| match g.mode {
            LockMode::Read => (r + 1, w),
            LockMode::Write => (r, w + 1),
        });
        LockSnapshot {
            readers,
            writers,
            waiting: table.waiting(),
        }
    }

    /// Returns the configured acquire timeout.
    #[must_use]
    pub fn acquire_timeout(&self) -> Option<Duration> {
        self.inner.acquire_timeout
    }
}

impl Default for LockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for LockManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockManager")
            .field("stores", &self.inner.tables.lock().len())
            .field("acquire_timeout", &self.inner.acquire_timeout)
            .finish_non_exhaustive()
    }
}

/// Cleans up a queued request if the acquiring future goes away.
struct PendingAcquire {
    manager: LockManager,
    store: Arc<str>,
    id: SessionId,
    armed: bool,
}

impl PendingAcquire {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for PendingAcquire {
    fn drop(&mut self) {
        if self.armed {
            self.manager.cancel(&self.store, self.id);
        }
    }
}
