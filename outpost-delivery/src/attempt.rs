//! Resolution of a single queue item
//!
//! ```text
//!             send ok
//! Attempting(i) ───────────────────────────────▶ Delivered        (delete)
//!      │ send failed, i + 1 < providers
//!      ├──────────────────────▶ Attempting(i + 1)                 (warning: switched provider)
//!      │ send failed, last provider
//!      ▼
//!  Exhausted ── tries < max_tries ─────────────▶ RetryScheduled   (increment_retry)
//!            └─ tries >= max_tries ────────────▶ Abandoned        (delete)
//! ```
//!
//! Failover between providers is free; only exhaustion spends a retry
//! credit. Every attempt starts at the primary provider.

use std::sync::Arc;

use outpost_common::{
    ItemId,
    audit::{AuditEvent, AuditSink, Disposition},
    delivery,
};
use outpost_queue::{QueueItem, Store};
use tracing::{error, instrument};

use crate::{
    config::SenderIdentity,
    error::TransportError,
    provider::ProviderList,
    retry::RetryPolicy,
    transport::{OutboundMessage, Transport},
};

/// Terminal state of one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// Accepted by the provider at `provider` (index into the provider list)
    Delivered { id: ItemId, provider: usize },
    /// Every provider failed; the item is back in the pool with `tries` spent
    RetryScheduled {
        id: ItemId,
        tries: u32,
        error: TransportError,
    },
    /// Every provider failed and no retry credit was left; the item is gone
    Abandoned {
        id: ItemId,
        tries: u32,
        error: TransportError,
    },
}

impl AttemptOutcome {
    pub const fn id(&self) -> ItemId {
        match self {
            Self::Delivered { id, .. }
            | Self::RetryScheduled { id, .. }
            | Self::Abandoned { id, .. } => *id,
        }
    }

    pub const fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

enum State {
    Attempting(usize),
    Exhausted(TransportError),
}

/// Drives items through the provider list and the retry policy
#[derive(Debug)]
pub struct DeliveryAttempt {
    providers: ProviderList,
    transport: Arc<dyn Transport>,
    store: Arc<dyn Store>,
    audit: Arc<dyn AuditSink>,
    retry_policy: RetryPolicy,
    sender: SenderIdentity,
}

impl DeliveryAttempt {
    pub fn new(
        providers: ProviderList,
        transport: Arc<dyn Transport>,
        store: Arc<dyn Store>,
        audit: Arc<dyn AuditSink>,
        retry_policy: RetryPolicy,
        sender: SenderIdentity,
    ) -> Self {
        Self {
            providers,
            transport,
            store,
            audit,
            retry_policy,
            sender,
        }
    }

    /// Run `item` to a terminal state
    ///
    /// Never fails: transport errors are folded into the outcome, and store
    /// errors while recording the outcome are logged. An item whose outcome
    /// could not be recorded keeps its claim until the stale sweep frees it.
    #[instrument(level = "debug", skip_all, fields(item_id = %item.id, tries = item.tries))]
    pub async fn resolve(&self, item: QueueItem) -> AttemptOutcome {
        let message = OutboundMessage::for_item(&self.sender, &item);
        let mut state = State::Attempting(0);

        loop {
            state = match state {
                State::Attempting(index) => {
                    let Some(provider) = self.providers.get(index) else {
                        break self
                            .exhausted(&item, TransportError::Configuration {
                                provider: format!("#{index}"),
                                detail: "no such provider".to_string(),
                            })
                            .await;
                    };

                    match self.transport.send(provider, &message).await {
                        Ok(()) => break self.delivered(&item, index, &provider.name).await,
                        Err(e) => {
                            delivery!(
                                level = WARN,
                                item_id = %item.id,
                                provider = %provider.name,
                                error = %e,
                                "Provider failed to deliver"
                            );

                            match self.providers.get(index + 1) {
                                Some(next) => {
                                    self.audit
                                        .record(&AuditEvent::ProviderSwitched {
                                            item_id: item.id,
                                            provider: next.host.clone(),
                                        })
                                        .await;
                                    State::Attempting(index + 1)
                                }
                                None => State::Exhausted(e),
                            }
                        }
                    }
                }
                State::Exhausted(e) => break self.exhausted(&item, e).await,
            };
        }
    }

    async fn delivered(&self, item: &QueueItem, provider: usize, name: &str) -> AttemptOutcome {
        delivery!(
            level = INFO,
            item_id = %item.id,
            provider = %name,
            "Message delivered"
        );

        if let Err(e) = self.store.delete(item.id).await {
            error!(
                item_id = %item.id,
                error = %e,
                "Delivered message could not be removed from the queue"
            );
        }

        AttemptOutcome::Delivered {
            id: item.id,
            provider,
        }
    }

    async fn exhausted(&self, item: &QueueItem, error: TransportError) -> AttemptOutcome {
        let disposition = self.retry_policy.disposition(item.tries);

        let recorded = match disposition {
            Disposition::Abandoned => self.store.delete(item.id).await,
            Disposition::RetryScheduled => self.store.increment_retry(item.id).await,
        };
        if let Err(e) = recorded {
            error!(
                item_id = %item.id,
                disposition = %disposition,
                error = %e,
                "Failed to record delivery failure in the queue"
            );
        }

        let detail = error.to_string();
        self.audit
            .record(&AuditEvent::DeliveryAlert {
                user_id: item.user_id.clone(),
                detail: detail.clone(),
            })
            .await;
        self.audit
            .record(&AuditEvent::DeliveryFailed {
                item_id: item.id,
                user_id: item.user_id.clone(),
                detail,
                disposition,
            })
            .await;

        match disposition {
            Disposition::Abandoned => AttemptOutcome::Abandoned {
                id: item.id,
                tries: item.tries,
                error,
            },
            Disposition::RetryScheduled => AttemptOutcome::RetryScheduled {
                id: item.id,
                tries: item.tries.saturating_add(1),
                error,
            },
        }
    }
}
