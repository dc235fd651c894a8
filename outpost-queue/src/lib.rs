//! The persistent queue of outbound notifications
//!
//! The delivery core only ever talks to the queue through [`Store`]. Two
//! backends are provided: [`SqliteStore`] for real deployments and
//! [`MemoryStore`] for tests and local development.

pub mod audit;
pub mod backends;
pub mod config;
pub mod error;
pub mod item;
pub mod r#trait;

pub use audit::SqliteAuditSink;
pub use backends::{MemoryStore, SqliteStore};
pub use config::{StoreConfig, StoreType};
pub use error::{Result, StoreError};
pub use item::{NewQueueItem, QueueItem};
pub use outpost_common::ItemId;
pub use r#trait::Store;
