//! Pieces shared by every outpost crate: logging bootstrap, the lifecycle
//! [`Signal`], queue identifiers and the audit event contract.

pub mod audit;
pub mod logging;
mod types;

pub use tracing;
pub use types::ItemId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
