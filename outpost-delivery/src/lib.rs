//! Delivery of queued notifications
//!
//! The [`Dispatcher`] polls the queue, claims as many items as the
//! concurrency ceiling allows and hands each one to a [`DeliveryAttempt`].
//! An attempt walks the configured providers in order until one accepts the
//! message; if none does, the [`RetryPolicy`] decides whether the item goes
//! back in the pool or is abandoned.

pub mod attempt;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod provider;
pub mod retry;
pub mod throttle;
pub mod transport;

pub use attempt::{AttemptOutcome, DeliveryAttempt};
pub use config::{DeliveryConfig, ProviderConfig, SenderIdentity, TlsMode};
pub use dispatcher::Dispatcher;
pub use error::{ConfigurationError, DeliveryError, TransportError};
pub use provider::ProviderList;
pub use retry::RetryPolicy;
pub use throttle::{Permit, Reservation, Throttle};
pub use transport::{OutboundMessage, SmtpTransport, Transport};
