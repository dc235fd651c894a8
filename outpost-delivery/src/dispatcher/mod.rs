//! The polling loop that drains the queue
//!
//! Every `poll_interval` a cycle is spawned. Cycles are not serialized
//! against each other: a slow cycle never delays the next tick, and the
//! shared [`Throttle`] keeps the total number of in-flight attempts at or
//! below `max_concurrency`.

mod cycle;

use std::{sync::Arc, time::Duration};

use futures_util::future::join_all;
use outpost_common::{Signal, audit::AuditSink, internal};
use outpost_queue::Store;
use tokio::{
    sync::broadcast,
    task::{JoinHandle, JoinSet},
    time::MissedTickBehavior,
};
use tracing::{debug, error, warn};

use crate::{
    attempt::{AttemptOutcome, DeliveryAttempt},
    config::{DeliveryConfig, SenderIdentity},
    error::{ConfigurationError, DeliveryError},
    provider::ProviderList,
    retry::RetryPolicy,
    throttle::Throttle,
    transport::Transport,
};

#[derive(Debug)]
pub struct Dispatcher {
    store: Arc<dyn Store>,
    attempt: Arc<DeliveryAttempt>,
    throttle: Arc<Throttle>,
    poll_interval: Duration,
    stale_claim_window: Duration,
    shutdown_timeout: Duration,
}

impl Dispatcher {
    /// # Errors
    /// If the configuration or the sender identity is invalid
    pub fn new(
        config: &DeliveryConfig,
        sender: SenderIdentity,
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        audit: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        sender.validate()?;

        let providers = ProviderList::new(config.providers.clone())?;
        let attempt = DeliveryAttempt::new(
            providers,
            transport,
            Arc::clone(&store),
            audit,
            RetryPolicy::new(config.max_tries),
            sender,
        );

        Ok(Self {
            store,
            attempt: Arc::new(attempt),
            throttle: Arc::new(Throttle::new(config.max_concurrency)),
            poll_interval: config.poll_interval(),
            stale_claim_window: config.stale_claim_window(),
            shutdown_timeout: config.shutdown_timeout(),
        })
    }

    pub const fn throttle(&self) -> &Arc<Throttle> {
        &self.throttle
    }

    /// Sweep stale claims, claim what fits under the ceiling and spawn an
    /// attempt per claimed item
    ///
    /// Returns as soon as the attempts are spawned; the handles resolve to
    /// each attempt's outcome.
    ///
    /// # Errors
    /// If the store cannot be reached. Nothing is claimed in that case.
    pub async fn run_cycle(&self) -> Result<Vec<JoinHandle<AttemptOutcome>>, DeliveryError> {
        cycle::run(self).await
    }

    /// Run a single cycle and wait for every attempt it started
    ///
    /// # Errors
    /// If the store cannot be reached
    pub async fn drain(&self) -> Result<Vec<AttemptOutcome>, DeliveryError> {
        let handles = self.run_cycle().await?;

        let outcomes = join_all(handles)
            .await
            .into_iter()
            .filter_map(|joined| {
                joined
                    .inspect_err(|e| error!(error = %e, "Delivery task failed"))
                    .ok()
            })
            .collect();

        Ok(outcomes)
    }

    /// Poll until a shutdown signal arrives
    ///
    /// ## Graceful Shutdown
    ///
    /// When a shutdown signal is received:
    /// 1. Stop starting new cycles
    /// 2. Wait for cycles that are still claiming work
    /// 3. Wait up to `shutdown_timeout` for in-flight attempts to finish
    ///
    /// Attempts still running after the timeout keep their claims; the stale
    /// sweep of the next process frees them.
    pub async fn serve(self: Arc<Self>, mut shutdown: broadcast::Receiver<Signal>) {
        internal!(level = INFO, "Dispatcher starting");

        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut cycles = JoinSet::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dispatcher = Arc::clone(&self);
                    cycles.spawn(async move {
                        dispatcher.run_cycle().await.map(|handles| handles.len())
                    });
                }
                Some(finished) = cycles.join_next(), if !cycles.is_empty() => {
                    Self::report_cycle(finished);
                }
                sig = shutdown.recv() => {
                    match sig {
                        Ok(Signal::Shutdown) => {
                            internal!(level = INFO, "Dispatcher received shutdown signal");
                        }
                        Err(e) => {
                            error!("Dispatcher shutdown channel error: {e}");
                        }
                    }
                    break;
                }
            }
        }

        while let Some(finished) = cycles.join_next().await {
            Self::report_cycle(finished);
        }

        self.wait_for_in_flight().await;
        internal!(level = INFO, "Dispatcher shutdown complete");
    }

    fn report_cycle(finished: Result<Result<usize, DeliveryError>, tokio::task::JoinError>) {
        match finished {
            Ok(Ok(0)) => {}
            Ok(Ok(started)) => debug!(started, "Cycle started deliveries"),
            Ok(Err(e)) => error!(error = %e, "Polling cycle aborted"),
            Err(e) => error!(error = %e, "Polling cycle task failed"),
        }
    }

    async fn wait_for_in_flight(&self) {
        let start = tokio::time::Instant::now();

        while self.throttle.in_flight() > 0 {
            if start.elapsed() >= self.shutdown_timeout {
                warn!(
                    in_flight = self.throttle.in_flight(),
                    "Shutdown timeout exceeded, remaining deliveries will be released by the stale sweep"
                );
                return;
            }

            debug!(
                "Waiting for {} in-flight deliveries ({:.1}s elapsed)...",
                self.throttle.in_flight(),
                start.elapsed().as_secs_f64()
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        internal!(level = INFO, "All in-flight deliveries completed");
    }
}
