//! Delivery configuration

use std::{fmt, time::Duration};

use lettre::Address;
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

const fn default_max_concurrency() -> usize {
    10
}

const fn default_max_tries() -> u32 {
    3
}

const fn default_poll_interval() -> u64 {
    10
}

const fn default_stale_claim() -> u64 {
    3 * 60 * 60 // 3 hours
}

const fn default_shutdown_timeout() -> u64 {
    30
}

const fn default_port() -> u16 {
    25
}

const fn default_provider_timeout() -> u64 {
    30
}

/// Settings for draining the queue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Maximum number of messages being sent at any one time
    ///
    /// Default: 10
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Retry credits an item may spend before it is abandoned
    ///
    /// Default: 3
    #[serde(default = "default_max_tries")]
    pub max_tries: u32,

    /// How often a polling cycle starts (in seconds)
    ///
    /// Default: 10 seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Claims older than this are presumed abandoned by a crashed worker
    /// (in seconds)
    ///
    /// Default: 10800 seconds (3 hours)
    #[serde(default = "default_stale_claim")]
    pub stale_claim_secs: u64,

    /// How long shutdown waits for in-flight sends (in seconds)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// SMTP providers, in failover order
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            max_tries: default_max_tries(),
            poll_interval_secs: default_poll_interval(),
            stale_claim_secs: default_stale_claim(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            providers: Vec::new(),
        }
    }
}

impl DeliveryConfig {
    /// Check every limit and provider
    ///
    /// # Errors
    /// The first invalid setting found
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_concurrency == 0 {
            return Err(ConfigurationError::ZeroLimit("max_concurrency"));
        }
        if self.max_tries == 0 {
            return Err(ConfigurationError::ZeroLimit("max_tries"));
        }
        if self.poll_interval_secs == 0 {
            return Err(ConfigurationError::ZeroLimit("poll_interval_secs"));
        }
        if self.stale_claim_secs == 0 {
            return Err(ConfigurationError::ZeroLimit("stale_claim_secs"));
        }
        if self.providers.is_empty() {
            return Err(ConfigurationError::NoProviders);
        }

        self.providers.iter().try_for_each(ProviderConfig::validate)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub const fn stale_claim_window(&self) -> Duration {
        Duration::from_secs(self.stale_claim_secs)
    }

    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// How the connection to a provider is secured
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TlsMode {
    /// Plain SMTP
    #[default]
    None,
    /// Plain connection upgraded with STARTTLS
    StartTls,
    /// Implicit TLS from the first byte
    Tls,
}

/// One SMTP sending endpoint
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Display name used in logs
    pub name: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub tls: TlsMode,
    /// Connection and command timeout enforced by the transport (in seconds)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_provider_timeout")]
    pub timeout_secs: u64,
}

impl ProviderConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            port: default_port(),
            username: None,
            password: None,
            tls: TlsMode::default(),
            timeout_secs: default_provider_timeout(),
        }
    }

    /// Username and password, when both are configured
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.username
            .as_deref()
            .zip(self.password.as_deref())
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// # Errors
    /// If the host is empty or the credentials are incomplete
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.host.trim().is_empty() {
            return Err(ConfigurationError::MissingHost(self.name.clone()));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigurationError::PartialCredentials(self.name.clone()));
        }

        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("tls", &self.tls)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// The from-address every notification is sent with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderIdentity {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

impl SenderIdentity {
    pub fn new(address: impl Into<String>, name: Option<String>) -> Self {
        Self {
            address: address.into(),
            name,
        }
    }

    /// # Errors
    /// If the address is not a valid mailbox address
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.address
            .parse::<Address>()
            .map(|_| ())
            .map_err(|e| ConfigurationError::InvalidSender {
                address: self.address.clone(),
                detail: e.to_string(),
            })
    }
}
