use std::{ops::Deref, sync::Arc};

use crate::{config::ProviderConfig, error::ConfigurationError};

/// Ordered, immutable list of providers
///
/// Position in the list is the failover order. The list is never empty.
#[derive(Debug, Clone)]
pub struct ProviderList(Arc<[ProviderConfig]>);

impl ProviderList {
    /// # Errors
    /// If the list is empty or any provider is invalid
    pub fn new(providers: Vec<ProviderConfig>) -> Result<Self, ConfigurationError> {
        if providers.is_empty() {
            return Err(ConfigurationError::NoProviders);
        }
        providers.iter().try_for_each(ProviderConfig::validate)?;

        Ok(Self(providers.into()))
    }
}

impl Deref for ProviderList {
    type Target = [ProviderConfig];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
