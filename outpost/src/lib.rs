//! Process wiring for the outpost delivery worker: configuration loading,
//! store and audit sink selection, and signal handling around the
//! dispatcher.

pub mod controller;

pub use controller::{AuditConfig, Outpost, SHUTDOWN_BROADCAST, Service, locate_config};
