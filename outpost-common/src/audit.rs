//! Audit events for the delivery worker
//!
//! The worker reports everything an operator needs to act on through an
//! [`AuditSink`]:
//!
//! - `Lifecycle`: process start (`info`) and abnormal stop (`error`)
//! - `ProviderSwitched`: a provider failed and the next one is being tried
//! - `DeliveryAlert`: the user-facing alert row written when every provider failed
//! - `DeliveryFailed`: the operator-facing record of the same failure
//!
//! Recording is infallible from the caller's point of view. Sinks that can
//! fail report their own errors through `tracing` and carry on.

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::ItemId;

/// Severity of an audit event, persisted as its lowercase name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to an item after every provider failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Put back into the pool with one more retry credit spent
    RetryScheduled,
    /// Out of retry credits and removed from the queue
    Abandoned,
}

impl Disposition {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RetryScheduled => "retry-scheduled",
            Self::Abandoned => "abandoned",
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditEvent {
    Lifecycle {
        severity: Severity,
        message: String,
    },
    ProviderSwitched {
        item_id: ItemId,
        provider: String,
    },
    DeliveryAlert {
        user_id: String,
        detail: String,
    },
    DeliveryFailed {
        item_id: ItemId,
        user_id: String,
        detail: String,
        disposition: Disposition,
    },
}

impl AuditEvent {
    pub fn started(message: impl Into<String>) -> Self {
        Self::Lifecycle {
            severity: Severity::Info,
            message: message.into(),
        }
    }

    pub fn stopped_abnormally(reason: impl fmt::Display) -> Self {
        Self::Lifecycle {
            severity: Severity::Error,
            message: format!("Stopped abnormally: {reason}"),
        }
    }

    #[must_use]
    pub const fn severity(&self) -> Severity {
        match self {
            Self::Lifecycle { severity, .. } => *severity,
            Self::ProviderSwitched { .. } | Self::DeliveryFailed { .. } => Severity::Warning,
            Self::DeliveryAlert { .. } => Severity::Error,
        }
    }

    /// Human readable line, as written to the application log table
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Lifecycle { message, .. } => message.clone(),
            Self::ProviderSwitched { provider, .. } => {
                format!("Changing email service provider to {provider}")
            }
            Self::DeliveryAlert { detail, .. } | Self::DeliveryFailed { detail, .. } => {
                detail.clone()
            }
        }
    }
}

/// Append-only destination for audit events
#[async_trait]
pub trait AuditSink: Send + Sync + fmt::Debug {
    async fn record(&self, event: &AuditEvent);
}

/// Emit an audit event as a structured `tracing` event
pub fn trace_event(event: &AuditEvent) {
    match event {
        AuditEvent::Lifecycle { severity, message } => match severity {
            Severity::Info => tracing::info!(event = "Lifecycle", "Audit: {message}"),
            Severity::Warning => tracing::warn!(event = "Lifecycle", "Audit: {message}"),
            Severity::Error => tracing::error!(event = "Lifecycle", "Audit: {message}"),
        },
        AuditEvent::ProviderSwitched { item_id, provider } => tracing::warn!(
            event = "ProviderSwitched",
            item_id = %item_id,
            provider = %provider,
            "Audit: Changing email service provider"
        ),
        AuditEvent::DeliveryAlert { user_id, detail } => tracing::error!(
            event = "DeliveryAlert",
            user_id = %user_id,
            detail = %detail,
            "Audit: Email could not be delivered"
        ),
        AuditEvent::DeliveryFailed {
            item_id,
            user_id,
            detail,
            disposition,
        } => tracing::warn!(
            event = "DeliveryFailed",
            item_id = %item_id,
            user_id = %user_id,
            detail = %detail,
            disposition = %disposition,
            "Audit: All providers failed"
        ),
    }
}

/// Sink that only reports through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, event: &AuditEvent) {
        trace_event(event);
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events at the given severity
    pub fn count(&self, severity: Severity) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|event| event.severity() == severity)
            .count()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, event: &AuditEvent) {
        trace_event(event);
        self.events.lock().push(event.clone());
    }
}
