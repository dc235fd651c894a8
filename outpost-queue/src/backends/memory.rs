use std::{collections::BTreeMap, sync::Arc, time::Duration};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use crate::{ItemId, NewQueueItem, QueueItem, r#trait::Store};

#[derive(Debug, Default)]
struct Inner {
    items: BTreeMap<ItemId, QueueItem>,
    last_id: i64,
}

/// In-memory queue
///
/// Items live in a `BTreeMap` keyed by id, so iteration order is age order.
/// Every operation runs under a single lock, which makes `claim_next`
/// trivially exclusive. Intended for tests and local development; nothing
/// survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an item verbatim, claim state and retry credits included
    ///
    /// Later `push` calls continue numbering after the largest id seen.
    pub fn insert(&self, item: QueueItem) {
        let mut inner = self.inner.lock();
        inner.last_id = inner.last_id.max(item.id.get());
        inner.items.insert(item.id, item);
    }

    pub fn get(&self, id: ItemId) -> Option<QueueItem> {
        self.inner.lock().items.get(&id).cloned()
    }

    pub fn items(&self) -> Vec<QueueItem> {
        self.inner.lock().items.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn push(&self, item: NewQueueItem) -> crate::Result<ItemId> {
        let mut inner = self.inner.lock();
        inner.last_id += 1;
        let id = ItemId::new(inner.last_id);
        inner.items.insert(id, item.into_item(id));

        Ok(id)
    }

    async fn reclaim_stale(&self, window: Duration) -> crate::Result<u64> {
        let cutoff = super::stale_cutoff(Utc::now(), window)?;
        let mut reclaimed = 0;

        for item in self.inner.lock().items.values_mut() {
            if item.claimed_at.is_some_and(|claimed| claimed < cutoff) {
                item.claimed_at = None;
                reclaimed += 1;
            }
        }

        Ok(reclaimed)
    }

    async fn claim_next(&self, limit: usize) -> crate::Result<Vec<QueueItem>> {
        let now = Utc::now();
        let mut inner = self.inner.lock();

        Ok(inner
            .items
            .values_mut()
            .filter(|item| !item.is_claimed())
            .take(limit)
            .map(|item| {
                item.claimed_at = Some(now);
                item.clone()
            })
            .collect())
    }

    async fn delete(&self, id: ItemId) -> crate::Result<()> {
        self.inner.lock().items.remove(&id);
        Ok(())
    }

    async fn increment_retry(&self, id: ItemId) -> crate::Result<()> {
        if let Some(item) = self.inner.lock().items.get_mut(&id) {
            item.claimed_at = None;
            item.tries = item.tries.saturating_add(1);
        }

        Ok(())
    }
}
