use std::time::Duration;

use async_trait::async_trait;

use crate::{ItemId, NewQueueItem, QueueItem};

/// Storage interface for the notification queue
///
/// Implementations own atomicity: between `claim_next` handing out an item
/// and the matching `delete` / `increment_retry`, no other caller may
/// observe that item as claimable.
#[async_trait]
pub trait Store: Send + Sync + std::fmt::Debug {
    /// Add a new notification to the queue
    ///
    /// # Errors
    /// If the item cannot be stored
    async fn push(&self, item: NewQueueItem) -> crate::Result<ItemId>;

    /// Clear the claim on every item claimed longer than `window` ago
    ///
    /// Retry credits are left untouched. Returns the number of items released.
    ///
    /// # Errors
    /// If the store cannot be reached
    async fn reclaim_stale(&self, window: Duration) -> crate::Result<u64>;

    /// Claim up to `limit` unclaimed items, oldest first
    ///
    /// Returns an empty list when nothing is pending.
    ///
    /// # Errors
    /// If the store cannot be reached
    async fn claim_next(&self, limit: usize) -> crate::Result<Vec<QueueItem>>;

    /// Remove an item. Removing an unknown id is not an error.
    ///
    /// # Errors
    /// If the store cannot be reached
    async fn delete(&self, id: ItemId) -> crate::Result<()>;

    /// Release the claim on an item and spend one retry credit
    ///
    /// # Errors
    /// If the store cannot be reached
    async fn increment_retry(&self, id: ItemId) -> crate::Result<()>;
}
