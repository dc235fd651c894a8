use std::sync::Arc;

use serde::Deserialize;

use crate::{MemoryStore, SqliteStore, StoreError, r#trait::Store};

const fn default_max_connections() -> u32 {
    2
}

/// Configuration for the queue store
///
/// SQLite-backed queue in RON config:
/// ```ron
/// Outpost (
///     store: Sqlite(
///         url: "sqlite:///var/lib/outpost/queue.db",
///         max_connections: 2,
///     ),
/// )
/// ```
///
/// Memory-backed queue for development:
/// ```ron
/// Outpost (
///     store: Memory,
/// )
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub enum StoreConfig {
    /// SQLite database (production)
    Sqlite {
        url: String,
        #[serde(default = "default_max_connections")]
        max_connections: u32,
    },
    /// Process-local queue (testing/development)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Open the configured store
    ///
    /// # Errors
    /// If the database cannot be opened or its schema created
    pub async fn open(&self) -> crate::Result<StoreType> {
        match self {
            Self::Sqlite { url, .. } if url.trim().is_empty() => Err(StoreError::Configuration(
                "Sqlite store url is empty".to_string(),
            )),
            Self::Sqlite {
                url,
                max_connections,
            } => Ok(StoreType::Sqlite(
                SqliteStore::connect(url, *max_connections).await?,
            )),
            Self::Memory => Ok(StoreType::Memory(MemoryStore::new())),
        }
    }
}

/// An opened store
#[derive(Debug, Clone)]
pub enum StoreType {
    Sqlite(SqliteStore),
    Memory(MemoryStore),
}

impl StoreType {
    /// The store as a trait object
    ///
    /// Both stores are cheap handles, so this clones the handle rather than
    /// the data.
    #[must_use]
    pub fn store(&self) -> Arc<dyn Store> {
        match self {
            Self::Sqlite(store) => Arc::new(store.clone()),
            Self::Memory(store) => Arc::new(store.clone()),
        }
    }

    #[must_use]
    pub const fn sqlite(&self) -> Option<&SqliteStore> {
        match self {
            Self::Sqlite(store) => Some(store),
            Self::Memory(_) => None,
        }
    }
}
