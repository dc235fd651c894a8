//! Shared fixtures for the delivery tests
#![allow(dead_code)] // Not every test binary uses every fixture

pub mod mock_server;

use std::{
    collections::VecDeque,
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;
use outpost_common::audit::MemoryAuditSink;
use outpost_delivery::{
    DeliveryConfig, Dispatcher, OutboundMessage, ProviderConfig, SenderIdentity, Transport,
    TransportError,
};
use outpost_queue::{ItemId, MemoryStore, NewQueueItem, QueueItem, Store, StoreError};
use parking_lot::Mutex;
use tokio::sync::Semaphore;

pub fn sender() -> SenderIdentity {
    SenderIdentity::new("alerts@example.com", Some("Alerts".to_string()))
}

pub fn providers(count: usize) -> Vec<ProviderConfig> {
    (0..count)
        .map(|n| ProviderConfig::new(format!("provider-{n}"), format!("smtp{n}.example.com")))
        .collect()
}

pub fn config(providers: usize, max_concurrency: usize, max_tries: u32) -> DeliveryConfig {
    DeliveryConfig {
        max_concurrency,
        max_tries,
        providers: self::providers(providers),
        ..Default::default()
    }
}

pub fn message(n: usize) -> NewQueueItem {
    NewQueueItem::new(
        "17",
        format!("reader{n}@example.org"),
        "Price alert",
        "<p>Your item is on sale</p>",
    )
}

/// A pending item that has already spent `tries` retry credits
pub fn item_with_tries(id: i64, tries: u32) -> QueueItem {
    let mut item = message(0).into_item(ItemId::new(id));
    item.tries = tries;
    item
}

/// Transport that answers from a per-provider script
///
/// Each provider pops its next scripted outcome; once a script runs dry the
/// provider keeps returning its default. Every call is logged by provider
/// index.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    scripts: Mutex<Vec<VecDeque<bool>>>,
    defaults: Mutex<Vec<bool>>,
    calls: Mutex<Vec<usize>>,
}

impl ScriptedTransport {
    /// Every provider always succeeds (`true`) or always fails (`false`)
    pub fn always(outcomes: &[bool]) -> Self {
        Self {
            scripts: Mutex::new(vec![VecDeque::new(); outcomes.len()]),
            defaults: Mutex::new(outcomes.to_vec()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue one-off outcomes for a provider ahead of its default
    pub fn script(&self, provider: usize, outcomes: &[bool]) {
        self.scripts.lock()[provider].extend(outcomes);
    }

    pub fn set_default(&self, provider: usize, succeed: bool) {
        self.defaults.lock()[provider] = succeed;
    }

    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

fn index_of(provider: &ProviderConfig) -> usize {
    provider
        .name
        .trim_start_matches("provider-")
        .parse()
        .expect("provider fixtures are named provider-<n>")
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        provider: &ProviderConfig,
        _message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let index = index_of(provider);
        self.calls.lock().push(index);

        let scripted = self.scripts.lock()[index].pop_front();
        let succeed = scripted.unwrap_or_else(|| self.defaults.lock()[index]);

        if succeed {
            Ok(())
        } else {
            Err(TransportError::send(&provider.name, "550 mailbox unavailable"))
        }
    }
}

/// Transport whose sends block until the test lets them through
#[derive(Debug)]
pub struct GatedTransport {
    gate: Semaphore,
    started: Mutex<usize>,
}

impl GatedTransport {
    pub fn new() -> Self {
        Self {
            gate: Semaphore::new(0),
            started: Mutex::new(0),
        }
    }

    /// Let `count` blocked sends complete successfully
    pub fn open(&self, count: usize) {
        self.gate.add_permits(count);
    }

    pub fn started(&self) -> usize {
        *self.started.lock()
    }

    /// Wait until at least `count` sends have begun
    pub async fn wait_for_started(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.started() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("sends did not start in time");
    }
}

#[async_trait]
impl Transport for GatedTransport {
    async fn send(
        &self,
        _provider: &ProviderConfig,
        _message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        *self.started.lock() += 1;
        self.gate
            .acquire()
            .await
            .expect("gate is never closed")
            .forget();
        Ok(())
    }
}

/// Store whose queue is unreachable: every claim fails
#[derive(Debug, Default)]
pub struct FailingStore;

#[async_trait]
impl Store for FailingStore {
    async fn push(&self, _item: NewQueueItem) -> outpost_queue::Result<ItemId> {
        Err(StoreError::Internal("database is locked".to_string()))
    }

    async fn reclaim_stale(&self, _window: Duration) -> outpost_queue::Result<u64> {
        Ok(0)
    }

    async fn claim_next(&self, _limit: usize) -> outpost_queue::Result<Vec<QueueItem>> {
        Err(StoreError::Internal("database is locked".to_string()))
    }

    async fn delete(&self, _id: ItemId) -> outpost_queue::Result<()> {
        Err(StoreError::Internal("database is locked".to_string()))
    }

    async fn increment_retry(&self, _id: ItemId) -> outpost_queue::Result<()> {
        Err(StoreError::Internal("database is locked".to_string()))
    }
}

/// Store that hands out work from a memory queue but rejects every write
/// recording an outcome
#[derive(Debug, Default)]
pub struct ReadOnlyStore {
    pub queue: MemoryStore,
    pub rejected_writes: Mutex<usize>,
}

impl ReadOnlyStore {
    fn reject(&self) -> outpost_queue::Result<()> {
        *self.rejected_writes.lock() += 1;
        Err(StoreError::Internal("attempt to write a readonly database".to_string()))
    }
}

#[async_trait]
impl Store for ReadOnlyStore {
    async fn push(&self, item: NewQueueItem) -> outpost_queue::Result<ItemId> {
        self.queue.push(item).await
    }

    async fn reclaim_stale(&self, window: Duration) -> outpost_queue::Result<u64> {
        self.queue.reclaim_stale(window).await
    }

    async fn claim_next(&self, limit: usize) -> outpost_queue::Result<Vec<QueueItem>> {
        self.queue.claim_next(limit).await
    }

    async fn delete(&self, _id: ItemId) -> outpost_queue::Result<()> {
        self.reject()
    }

    async fn increment_retry(&self, _id: ItemId) -> outpost_queue::Result<()> {
        self.reject()
    }
}

/// A dispatcher over a fresh memory store and audit sink
pub struct Harness<T> {
    pub dispatcher: Arc<Dispatcher>,
    pub store: MemoryStore,
    pub audit: MemoryAuditSink,
    pub transport: Arc<T>,
}

impl<T: Transport + 'static> Harness<T> {
    pub fn new(config: &DeliveryConfig, transport: T) -> Self {
        let store = MemoryStore::new();
        let audit = MemoryAuditSink::new();
        let transport = Arc::new(transport);

        let dispatcher = Dispatcher::new(
            config,
            sender(),
            Arc::new(store.clone()),
            Arc::clone(&transport) as Arc<dyn Transport>,
            Arc::new(audit.clone()),
        )
        .expect("valid dispatcher configuration");

        Self {
            dispatcher: Arc::new(dispatcher),
            store,
            audit,
            transport,
        }
    }
}
