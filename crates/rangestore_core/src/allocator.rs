//! Store length management.
//!
//! All length changes for a store go through the [`Allocator`], which holds
//! the store's length gate for the duration of the medium call. Writers only
//! ever grow a store; resize is the only path that shrinks.

use crate::error::{CoreError, CoreResult};
use crate::lock::Lease;
use crate::registry::StoreHandle;
use rangestore_storage::{ByteMedium, StorageError};
use tracing::{debug, warn};

/// Grows and resizes stores on behalf of lock holders.
#[derive(Debug, Clone, Copy, Default)]
pub struct Allocator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Adjust {
    GrowOnly,
    Exact,
}

impl Allocator {
    /// Creates an allocator.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Makes the store at least `target` bytes long and returns its length.
    ///
    /// A missing store is created when `target` is non-zero. The length never
    /// decreases, so concurrent writers growing disjoint regions cannot undo
    /// each other.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AllocationFailure`] if the medium cannot grow; the
    /// store keeps its previous length.
    pub(crate) async fn grow_to(
        &self,
        handle: &StoreHandle,
        target: u64,
        lease: &Lease,
    ) -> CoreResult<u64> {
        self.adjust(handle, target, Adjust::GrowOnly, lease).await
    }

    /// Sets the store length to exactly `target`, zero-filling on growth.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::AllocationFailure`] if the medium cannot change
    /// length; the store keeps its previous length.
    pub(crate) async fn set_length(
        &self,
        handle: &StoreHandle,
        target: u64,
        lease: &Lease,
    ) -> CoreResult<u64> {
        self.adjust(handle, target, Adjust::Exact, lease).await
    }

    async fn adjust(
        &self,
        handle: &StoreHandle,
        target: u64,
        mode: Adjust,
        lease: &Lease,
    ) -> CoreResult<u64> {
        let gate = handle.length_gate();
        let name = handle.name().to_string();

        handle
            .blocking(Some(lease), move |medium| {
                let _gate = gate.lock();
                let current = medium.current_length()?;
                let length = current.unwrap_or(0);

                let unchanged = match mode {
                    Adjust::GrowOnly => target <= length,
                    Adjust::Exact => current == Some(target),
                };
                if unchanged {
                    return Ok(length);
                }

                if let Err(source) = medium.set_length(target) {
                    restore(medium, &name, current);
                    warn!(
                        store = %name,
                        from = length,
                        to = target,
                        error = %source,
                        "allocation failed"
                    );
                    return Err(CoreError::allocation_failure(name, target, source));
                }

                debug!(store = %name, from = length, to = target, "store length changed");
                Ok(target)
            })
            .await
    }
}

/// Puts the length back if a failed `set_length` left it changed.
fn restore(medium: &dyn ByteMedium, name: &str, previous: Option<u64>) {
    let Some(previous) = previous else {
        return;
    };
    match medium.current_length() {
        Ok(Some(now)) if now != previous => {
            if let Err(err) = medium.set_length(previous) {
                warn!(
                    store = %name,
                    error = %err,
                    "could not restore length after failed allocation"
                );
            }
        }
        Ok(_) => {}
        Err(StorageError::NotFound) => {}
        Err(err) => warn!(
            store = %name,
            error = %err,
            "could not check length after failed allocation"
        ),
    }
}
