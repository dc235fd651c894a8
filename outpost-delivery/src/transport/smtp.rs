use async_trait::async_trait;
use lettre::{
    Address, AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Mailbox, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use tracing::debug;

use super::{OutboundMessage, Transport};
use crate::{
    config::{ProviderConfig, TlsMode},
    error::TransportError,
};

/// SMTP client transport
///
/// Opens a new connection for every send and closes it afterwards; nothing
/// is pooled between attempts.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmtpTransport;

impl SmtpTransport {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn mailer(
        provider: &ProviderConfig,
    ) -> Result<AsyncSmtpTransport<Tokio1Executor>, TransportError> {
        let configuration = |e: lettre::transport::smtp::Error| TransportError::Configuration {
            provider: provider.name.clone(),
            detail: e.to_string(),
        };

        let builder = match provider.tls {
            TlsMode::None => {
                AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(provider.host.as_str())
            }
            TlsMode::StartTls => {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&provider.host)
                    .map_err(configuration)?
            }
            TlsMode::Tls => {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&provider.host).map_err(configuration)?
            }
        };

        let mut builder = builder
            .port(provider.port)
            .timeout(Some(provider.timeout()));

        if let Some((username, password)) = provider.credentials() {
            builder =
                builder.credentials(Credentials::new(username.to_owned(), password.to_owned()));
        }

        Ok(builder.build())
    }

    fn build_message(
        provider: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<Message, TransportError> {
        let address = |e: lettre::address::AddressError| TransportError::Address {
            provider: provider.name.clone(),
            detail: e.to_string(),
        };

        let from = Mailbox::new(
            message.from.name.clone(),
            message.from.address.parse::<Address>().map_err(address)?,
        );
        let to = message.to.parse::<Mailbox>().map_err(address)?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject.as_str())
            .header(ContentType::TEXT_HTML)
            .body(message.html.clone())
            .map_err(|e| TransportError::Message {
                provider: provider.name.clone(),
                detail: e.to_string(),
            })
    }
}

#[async_trait]
impl Transport for SmtpTransport {
    async fn send(
        &self,
        provider: &ProviderConfig,
        message: &OutboundMessage,
    ) -> Result<(), TransportError> {
        let email = Self::build_message(provider, message)?;
        let mailer = Self::mailer(provider)?;

        let response = mailer
            .send(email)
            .await
            .map_err(|e| TransportError::send(&provider.name, e))?;

        debug!(
            provider = %provider.name,
            code = %response.code(),
            "Message accepted"
        );

        Ok(())
    }
}
