//! Per-store lock table: granted locks plus an arrival-ordered wait queue.

use crate::types::{ByteRange, LockMode, SessionId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::oneshot;

#[derive(Debug, Default)]
struct HoldState {
    revoked: bool,
    in_flight: usize,
}

/// Revocation flag and in-flight medium call count of one lock.
///
/// A revoked lock stays in its table until the calls started under it have
/// finished, so nothing overlapping is granted alongside them.
#[derive(Debug, Default)]
pub(crate) struct Hold {
    state: Mutex<HoldState>,
}

impl Hold {
    pub fn is_revoked(&self) -> bool {
        self.state.lock().revoked
    }

    /// Marks the lock revoked. Returns true while calls are still running.
    pub fn revoke(&self) -> bool {
        let mut state = self.state.lock();
        state.revoked = true;
        state.in_flight > 0
    }

    /// Registers a medium call. Returns false once the lock is revoked.
    pub fn begin_io(&self) -> bool {
        let mut state = self.state.lock();
        if state.revoked {
            return false;
        }
        state.in_flight += 1;
        true
    }

    /// Ends a medium call. Returns true if it was the last one running
    /// under a revoked lock.
    pub fn end_io(&self) -> bool {
        let mut state = self.state.lock();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.revoked && state.in_flight == 0
    }
}

/// A lock currently held by a session.
#[derive(Debug)]
pub(crate) struct Granted {
    pub id: SessionId,
    pub range: ByteRange,
    pub mode: LockMode,
    pub hold: Arc<Hold>,
}

/// A queued request, woken through `wake` once granted.
#[derive(Debug)]
pub(crate) struct Waiter {
    pub id: SessionId,
    pub range: ByteRange,
    pub mode: LockMode,
    pub hold: Arc<Hold>,
    pub wake: oneshot::Sender<()>,
}

fn conflicts(a: (&ByteRange, LockMode), b: (&ByteRange, LockMode)) -> bool {
    a.0.overlaps(b.0) && !a.1.compatible_with(b.1)
}

/// Lock state for one store.
///
/// A request is admitted only if it conflicts with no granted lock and with
/// no request that arrived before it and is still waiting. This is what
/// keeps a stream of compatible readers from starving a queued writer.
#[derive(Debug, Default)]
pub(crate) struct LockTable {
    granted: Vec<Granted>,
    waiters: VecDeque<Waiter>,
}

impl LockTable {
    /// Returns true if a new request may be granted without queueing.
    pub fn admits(&self, range: &ByteRange, mode: LockMode) -> bool {
        let request = (range, mode);
        !self.granted.iter().any(|g| conflicts((&g.range, g.mode), request))
            && !self.waiters.iter().any(|w| conflicts((&w.range, w.mode), request))
    }

    pub fn grant(&mut self, granted: Granted) {
        self.granted.push(granted);
    }

    pub fn enqueue(&mut self, waiter: Waiter) {
        self.waiters.push_back(waiter);
    }

    /// Removes a granted lock. Returns false if it was not held (for example
    /// because it was revoked).
    pub fn remove_granted(&mut self, id: SessionId) -> bool {
        match self.granted.iter().position(|g| g.id == id) {
            Some(index) => {
                self.granted.swap_remove(index);
                true
            }
            None => false,
        }
    }

    /// Removes a queued request. Returns false if it is not queued.
    pub fn remove_waiter(&mut self, id: SessionId) -> bool {
        match self.waiters.iter().position(|w| w.id == id) {
            Some(index) => {
                self.waiters.remove(index);
                true
            }
            None => false,
        }
    }

    /// Grants every waiter that has become eligible, in arrival order.
    ///
    /// A waiter is eligible if it conflicts with no granted lock and with no
    /// earlier waiter that is still queued. Waiters whose requester has gone
    /// away are dropped. Returns the sessions granted.
    pub fn promote(&mut self) -> Vec<SessionId> {
        let mut promoted = Vec::new();
        let queue = std::mem::take(&mut self.waiters);

        for waiter in queue {
            if waiter.wake.is_closed() {
                continue;
            }

            let request = (&waiter.range, waiter.mode);
            let blocked = self.granted.iter().any(|g| conflicts((&g.range, g.mode), request))
                || self.waiters.iter().any(|w| conflicts((&w.range, w.mode), request));
            if blocked {
                self.waiters.push_back(waiter);
                continue;
            }

            let Waiter {
                id,
                range,
                mode,
                hold,
                wake,
            } = waiter;
            if wake.send(()).is_err() {
                continue;
            }
            self.granted.push(Granted {
                id,
                range,
                mode,
                hold,
            });
            promoted.push(id);
        }

        promoted
    }

    /// Marks every granted lock revoked.
    ///
    /// Locks with no medium call running leave the table at once; the rest
    /// keep conflicting until their last call ends. Returns the sessions
    /// newly revoked. Queued requests are untouched.
    pub fn revoke_all(&mut self) -> Vec<SessionId> {
        let mut revoked = Vec::new();
        self.granted.retain(|g| {
            if g.hold.is_revoked() {
                return true;
            }
            revoked.push(g.id);
            g.hold.revoke()
        });
        revoked
    }

    pub fn is_idle(&self) -> bool {
        self.granted.is_empty() && self.waiters.is_empty()
    }

    pub fn granted(&self) -> impl Iterator<Item = &Granted> {
        self.granted.iter()
    }

    pub fn waiting(&self) -> usize {
        self.waiters.len()
    }
}
