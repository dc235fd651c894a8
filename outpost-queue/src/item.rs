use chrono::{DateTime, Utc};
use outpost_common::ItemId;
use serde::{Deserialize, Serialize};

/// A notification waiting in the queue
///
/// The claim marker and the claim timestamp are one field, so an item can
/// never be claimed without a claim time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    /// Owner of the notification, used for the alert row on failure
    pub user_id: String,
    /// Destination address
    pub to: String,
    pub subject: String,
    /// Pre-rendered HTML body
    pub content: String,
    /// Set while a worker owns the item
    pub claimed_at: Option<DateTime<Utc>>,
    /// Retry credits spent so far; never decreases
    pub tries: u32,
}

impl QueueItem {
    #[must_use]
    pub const fn is_claimed(&self) -> bool {
        self.claimed_at.is_some()
    }
}

/// A notification as handed over by a producer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQueueItem {
    pub user_id: String,
    pub to: String,
    pub subject: String,
    pub content: String,
}

impl NewQueueItem {
    pub fn new(
        user_id: impl Into<String>,
        to: impl Into<String>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            to: to.into(),
            subject: subject.into(),
            content: content.into(),
        }
    }

    /// A fresh, unclaimed item with no retry credits spent
    #[must_use]
    pub fn into_item(self, id: ItemId) -> QueueItem {
        QueueItem {
            id,
            user_id: self.user_id,
            to: self.to,
            subject: self.subject,
            content: self.content,
            claimed_at: None,
            tries: 0,
        }
    }
}
