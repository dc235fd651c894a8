use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use anyhow::Context;
use outpost_common::{
    Signal,
    audit::{AuditEvent, AuditSink, TracingAuditSink},
    internal, tracing,
};
use outpost_delivery::{
    AttemptOutcome, DeliveryConfig, Dispatcher, SenderIdentity, SmtpTransport,
};
use outpost_queue::{SqliteAuditSink, Store, StoreConfig, StoreType};
use serde::Deserialize;
use tokio::sync::broadcast;

/// Lifecycle message recorded when the service comes up
pub const STARTED: &str = "Starting email service";

const CONFIG_ENV: &str = "OUTPOST_CONFIG";

const SHUTDOWN_REQUESTED: &str = "shutdown requested";

/// Where audit events end up
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum AuditConfig {
    /// Structured `tracing` events only
    #[default]
    Log,
    /// Rows in the SQLite store's `log` and `user_alerts` tables, plus
    /// `tracing`
    Database,
}

/// Top-level configuration
///
/// ```ron
/// Outpost (
///     store: Sqlite(url: "sqlite:///var/lib/outpost/queue.db"),
///     audit: Database,
///     sender: (address: "alerts@example.com", name: Some("Alerts")),
///     delivery: (
///         max_concurrency: 10,
///         providers: [
///             (name: "primary", host: "smtp.example.com", port: 587, tls: StartTls),
///         ],
///     ),
/// )
/// ```
#[derive(Debug, Deserialize)]
pub struct Outpost {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    pub sender: SenderIdentity,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

pub static SHUTDOWN_BROADCAST: LazyLock<broadcast::Sender<Signal>> = LazyLock::new(|| {
    let (sender, _receiver) = broadcast::channel(64);
    sender
});

/// Find the configuration file using the following precedence:
/// 1. An explicitly given path
/// 2. `OUTPOST_CONFIG` environment variable
/// 3. ./outpost.config.ron (current working directory)
/// 4. /etc/outpost/outpost.config.ron (system-wide config)
///
/// # Errors
/// If an explicit or environment path does not exist, or no default file
/// is found
pub fn locate_config(explicit: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    if let Some(path) = explicit {
        anyhow::ensure!(
            path.exists(),
            "Configuration file does not exist: {}",
            path.display()
        );
        return Ok(path);
    }

    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        let path = PathBuf::from(env_path);
        anyhow::ensure!(
            path.exists(),
            "{CONFIG_ENV} points to non-existent file: {}",
            path.display()
        );
        return Ok(path);
    }

    let default_paths = [
        PathBuf::from("./outpost.config.ron"),
        PathBuf::from("/etc/outpost/outpost.config.ron"),
    ];

    if let Some(path) = default_paths.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    anyhow::bail!(
        "No configuration file found. Tried:\n  - {CONFIG_ENV} environment variable\n{paths_tried}"
    )
}

impl Outpost {
    /// Read and parse a RON configuration file
    ///
    /// # Errors
    /// If the file cannot be read or parsed
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        ron::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Open the store and audit sink, and build the dispatcher
    ///
    /// # Errors
    /// If the store cannot be opened, the audit sink does not fit the store,
    /// or the delivery configuration is invalid. The last case is also
    /// recorded as an abnormal stop.
    pub async fn open(self) -> anyhow::Result<Service> {
        let store = self
            .store
            .open()
            .await
            .context("Failed to open the queue store")?;

        let audit: Arc<dyn AuditSink> = match (self.audit, store.sqlite()) {
            (AuditConfig::Log, _) => Arc::new(TracingAuditSink),
            (AuditConfig::Database, Some(sqlite)) => Arc::new(SqliteAuditSink::for_store(sqlite)),
            (AuditConfig::Database, None) => {
                anyhow::bail!("Database auditing requires a Sqlite store")
            }
        };

        let dispatcher = match Dispatcher::new(
            &self.delivery,
            self.sender,
            store.store(),
            Arc::new(SmtpTransport::new()),
            Arc::clone(&audit),
        ) {
            Ok(dispatcher) => dispatcher,
            Err(e) => {
                audit.record(&AuditEvent::stopped_abnormally(&e)).await;
                return Err(e).context("Invalid delivery configuration");
            }
        };

        internal!("Service configured");

        Ok(Service {
            store,
            audit,
            dispatcher: Arc::new(dispatcher),
        })
    }
}

/// A fully wired delivery worker
#[derive(Debug)]
pub struct Service {
    store: StoreType,
    audit: Arc<dyn AuditSink>,
    dispatcher: Arc<Dispatcher>,
}

impl Service {
    /// The queue this service drains
    pub fn store(&self) -> Arc<dyn Store> {
        self.store.store()
    }

    pub const fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Poll the queue until a signal or a broadcast shutdown arrives
    ///
    /// Any stop is recorded as abnormal: the worker is meant to run for
    /// the life of the host.
    ///
    /// # Errors
    /// If the signal handlers cannot be installed or the dispatcher task
    /// panics
    pub async fn serve(self) -> anyhow::Result<()> {
        self.audit.record(&AuditEvent::started(STARTED)).await;

        let mut serving = tokio::spawn(
            Arc::clone(&self.dispatcher).serve(SHUTDOWN_BROADCAST.subscribe()),
        );

        let reason = tokio::select! {
            reason = shutdown() => reason,
            joined = &mut serving => {
                // The dispatcher saw the broadcast before the signal watcher did
                let reason = match &joined {
                    Ok(()) => SHUTDOWN_REQUESTED.to_string(),
                    Err(e) => format!("dispatcher task failed: {e}"),
                };
                self.audit
                    .record(&AuditEvent::stopped_abnormally(&reason))
                    .await;

                joined.context("Dispatcher task failed")?;
                internal!(level = INFO, "Shutting down...");
                return Ok(());
            }
        };

        let reason = match reason {
            Ok(reason) => reason.to_string(),
            Err(e) => format!("{e:#}"),
        };
        self.audit
            .record(&AuditEvent::stopped_abnormally(&reason))
            .await;

        // Without receivers the dispatcher has already stopped
        let _ = SHUTDOWN_BROADCAST.send(Signal::Shutdown);

        tokio::select! {
            joined = serving => joined.context("Dispatcher task failed")?,
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("Forced shutdown, in-flight deliveries are left to the stale sweep");
            }
        }

        internal!(level = INFO, "Shutting down...");
        Ok(())
    }

    /// Run a single polling cycle and wait for its attempts
    ///
    /// # Errors
    /// If the store cannot be reached
    pub async fn drain(self) -> anyhow::Result<Vec<AttemptOutcome>> {
        self.audit.record(&AuditEvent::started(STARTED)).await;

        let outcomes = match self.dispatcher.drain().await {
            Ok(outcomes) => outcomes,
            Err(e) => {
                self.audit
                    .record(&AuditEvent::stopped_abnormally(&e))
                    .await;
                return Err(e.into());
            }
        };

        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        tracing::info!(
            delivered,
            failed = outcomes.len() - delivered,
            "Drained the queue once"
        );

        Ok(outcomes)
    }
}

/// Wait for CTRL+C, SIGTERM or a broadcast shutdown and name the cause
async fn shutdown() -> anyhow::Result<&'static str> {
    let mut terminate = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
    let mut receiver = SHUTDOWN_BROADCAST.subscribe();

    let reason = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            internal!(level = INFO, "CTRL+C entered -- Enter it again to force shutdown");
            "interrupted"
        }
        _ = terminate.recv() => {
            internal!(level = INFO, "Terminate Signal received, shutting down");
            "terminated"
        }
        _ = receiver.recv() => SHUTDOWN_REQUESTED,
    };

    Ok(reason)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let outpost: Outpost = ron::from_str(
            r#"Outpost (
                sender: (address: "alerts@example.com"),
                delivery: (providers: [(name: "primary", host: "smtp.example.com")]),
            )"#,
        )
        .unwrap_or_else(|e| panic!("config rejected: {e}"));

        assert!(matches!(outpost.store, StoreConfig::Memory));
        assert_eq!(outpost.audit, AuditConfig::Log);
        assert_eq!(outpost.sender.name, None);
        assert_eq!(outpost.delivery.max_concurrency, 10);
        assert_eq!(outpost.delivery.providers[0].port, 25);
    }

    #[tokio::test]
    async fn database_audit_needs_sqlite() {
        let outpost: Outpost = ron::from_str(
            r#"Outpost (
                store: Memory,
                audit: Database,
                sender: (address: "alerts@example.com"),
                delivery: (providers: [(name: "primary", host: "smtp.example.com")]),
            )"#,
        )
        .unwrap_or_else(|e| panic!("config rejected: {e}"));

        let error = outpost.open().await.err().map(|e| e.to_string());
        assert_eq!(
            error.as_deref(),
            Some("Database auditing requires a Sqlite store")
        );
    }

    #[test]
    fn explicit_config_path_must_exist() {
        let missing = PathBuf::from("/nonexistent/outpost.config.ron");
        let error = locate_config(Some(missing)).err().map(|e| e.to_string());

        assert_eq!(
            error.as_deref(),
            Some("Configuration file does not exist: /nonexistent/outpost.config.ron")
        );
    }
}
