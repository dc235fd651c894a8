//! The send capability the attempt drives, one provider at a time

mod smtp;

use async_trait::async_trait;
use outpost_queue::QueueItem;

pub use smtp::SmtpTransport;

use crate::{
    config::{ProviderConfig, SenderIdentity},
    error::TransportError,
};

/// A fully addressed notification, ready to hand to a provider
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub from: SenderIdentity,
    pub to: String,
    pub subject: String,
    /// Pre-rendered HTML body
    pub html: String,
}

impl OutboundMessage {
    #[must_use]
    pub fn for_item(sender: &SenderIdentity, item: &QueueItem) -> Self {
        Self {
            from: sender.clone(),
            to: item.to.clone(),
            subject: item.subject.clone(),
            html: item.content.clone(),
        }
    }
}

/// Attempts one delivery through one provider
///
/// Implementations bound their own connect and command timeouts; the
/// attempt waits for whatever they return.
#[async_trait]
pub trait Transport: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Any failure to hand the message to the provider
    async fn send(
        &self,
        provider: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<(), TransportError>;
}
