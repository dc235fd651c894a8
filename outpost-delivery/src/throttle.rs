//! Concurrency ceiling for in-flight delivery attempts
//!
//! Capacity is taken as a [`Reservation`] before the store is asked for
//! work, and handed out one [`Permit`] per spawned attempt. Both wrap
//! semaphore permits: dropping a permit (normal completion, early return or
//! a panicking task) gives its slot back exactly once, and dropping a
//! reservation gives back whatever it still holds.
//!
//! ```text
//! ceiling 4, in flight 1
//!   reserve(10)  -> Reservation(3), in flight 4
//!   take() x2    -> 2 permits, reservation holds 1
//!   drop(res)    -> in flight 3
//!   drop(permit) -> in flight 2
//! ```

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore, TryAcquireError};

#[derive(Debug)]
pub struct Throttle {
    ceiling: usize,
    slots: Arc<Semaphore>,
}

impl Throttle {
    #[must_use]
    pub fn new(ceiling: usize) -> Self {
        let ceiling = ceiling.min(Semaphore::MAX_PERMITS);
        Self {
            ceiling,
            slots: Arc::new(Semaphore::new(ceiling)),
        }
    }

    pub const fn ceiling(&self) -> usize {
        self.ceiling
    }

    pub fn in_flight(&self) -> usize {
        self.ceiling.saturating_sub(self.available())
    }

    /// Free slots right now
    pub fn available(&self) -> usize {
        self.slots.available_permits()
    }

    /// Take up to `wanted` slots
    ///
    /// The returned reservation may hold fewer slots than asked for, down to
    /// none when the ceiling has been reached.
    pub fn reserve(&self, wanted: usize) -> Reservation {
        loop {
            let granted = u32::try_from(self.available().min(wanted)).unwrap_or(u32::MAX);
            if granted == 0 {
                return Reservation { permits: None };
            }

            match Arc::clone(&self.slots).try_acquire_many_owned(granted) {
                Ok(permits) => {
                    return Reservation {
                        permits: Some(permits),
                    };
                }
                // Another caller took slots first; recompute against the
                // fresh count
                Err(TryAcquireError::NoPermits) => {}
                Err(TryAcquireError::Closed) => return Reservation { permits: None },
            }
        }
    }
}

/// Slots taken from a [`Throttle`] but not yet bound to an attempt
#[derive(Debug)]
#[must_use = "dropping a reservation releases its slots immediately"]
pub struct Reservation {
    permits: Option<OwnedSemaphorePermit>,
}

impl Reservation {
    pub fn len(&self) -> usize {
        self.permits
            .as_ref()
            .map_or(0, OwnedSemaphorePermit::num_permits)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind one reserved slot to an attempt
    pub fn take(&mut self) -> Option<Permit> {
        self.permits
            .as_mut()
            .and_then(|permits| permits.split(1))
            .map(|slot| Permit { _slot: slot })
    }
}

/// One in-flight attempt's slot; released on drop
#[derive(Debug)]
pub struct Permit {
    _slot: OwnedSemaphorePermit,
}

impl Permit {
    /// Give the slot back
    pub fn release(self) {
        drop(self);
    }
}
