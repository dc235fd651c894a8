//! Retry policy applied once every provider has failed for an item.

use outpost_common::audit::Disposition;

/// Decides between scheduling another try and abandoning an item.
///
/// Only full provider exhaustion spends a retry credit; failing over to the
/// next provider is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retry credits an item may spend before it is abandoned.
    pub max_tries: u32,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_tries: u32) -> Self {
        Self { max_tries }
    }

    /// Check if an item that has spent `tries` credits may go back in the pool.
    #[must_use]
    pub const fn should_retry(&self, tries: u32) -> bool {
        tries < self.max_tries
    }

    /// Get the number of remaining retry credits.
    ///
    /// Returns `0` once `max_tries` has been reached.
    #[must_use]
    pub const fn remaining_tries(&self, tries: u32) -> u32 {
        self.max_tries.saturating_sub(tries)
    }

    /// What happens to an item with `tries` spent credits whose providers all failed.
    #[must_use]
    pub const fn disposition(&self, tries: u32) -> Disposition {
        if self.should_retry(tries) {
            Disposition::RetryScheduled
        } else {
            Disposition::Abandoned
        }
    }
}
