//! Typed error handling for delivery operations.
//!
//! Failures fall into three groups:
//! - Transport failures: one provider could not deliver one message. Always
//!   recovered inside the attempt, either by failover or by the retry policy.
//! - Store failures: the queue could not be reached. Fatal to the current
//!   polling cycle only.
//! - Configuration errors: detected before the polling loop starts.

use outpost_queue::StoreError;
use thiserror::Error;

/// Top-level error surfaced by the dispatcher.
///
/// Per-item failures never appear here; they are resolved to a terminal
/// item state inside the attempt.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The queue store is unavailable; the current cycle is aborted.
    #[error("Store unavailable: {0}")]
    Store(#[from] StoreError),

    /// The delivery configuration is unusable.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// A single provider failed to deliver a message.
///
/// Every variant is treated the same way by the attempt: try the next
/// provider, or fall through to the retry policy after the last one.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Sender or recipient address could not be parsed.
    #[error("{provider}: invalid address: {detail}")]
    Address { provider: String, detail: String },

    /// The message could not be assembled.
    #[error("{provider}: could not build message: {detail}")]
    Message { provider: String, detail: String },

    /// Connection, authentication, timeout or rejection from the server.
    #[error("{provider}: {detail}")]
    Send { provider: String, detail: String },

    /// The transport for this provider could not be constructed.
    #[error("{provider}: misconfigured transport: {detail}")]
    Configuration { provider: String, detail: String },
}

impl TransportError {
    pub fn send(provider: &str, detail: impl ToString) -> Self {
        Self::Send {
            provider: provider.to_string(),
            detail: detail.to_string(),
        }
    }

    /// Name of the provider that failed
    #[must_use]
    pub fn provider(&self) -> &str {
        match self {
            Self::Address { provider, .. }
            | Self::Message { provider, .. }
            | Self::Send { provider, .. }
            | Self::Configuration { provider, .. } => provider,
        }
    }
}

/// Invalid delivery configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// No SMTP providers were configured.
    #[error("at least one provider must be configured")]
    NoProviders,

    /// A limit that must be positive was zero.
    #[error("`{0}` must be greater than zero")]
    ZeroLimit(&'static str),

    /// A provider has no host.
    #[error("provider `{0}` has an empty host")]
    MissingHost(String),

    /// Only one of username and password was given.
    #[error("provider `{0}` must set both username and password, or neither")]
    PartialCredentials(String),

    /// The sender address is not a valid mailbox.
    #[error("invalid sender address `{address}`: {detail}")]
    InvalidSender { address: String, detail: String },
}
