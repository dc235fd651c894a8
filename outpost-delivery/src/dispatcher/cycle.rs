//! One polling cycle: sweep, reserve, claim, spawn

use std::sync::Arc;

use outpost_common::{delivery, internal};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use super::Dispatcher;
use crate::{attempt::AttemptOutcome, error::DeliveryError};

/// Run a single cycle
///
/// Capacity is reserved before the store is asked for work, so overlapping
/// cycles can never claim more than the free slots between them. A store
/// failure aborts the cycle before anything was claimed, and the reservation
/// is released on the way out.
#[instrument(level = "trace", skip_all)]
pub(super) async fn run(
    dispatcher: &Dispatcher,
) -> Result<Vec<JoinHandle<AttemptOutcome>>, DeliveryError> {
    let released = dispatcher
        .store
        .reclaim_stale(dispatcher.stale_claim_window)
        .await?;
    if released > 0 {
        info!(released, "Released stale claims back to the queue");
    }

    let mut reservation = dispatcher.throttle.reserve(dispatcher.throttle.ceiling());
    if reservation.is_empty() {
        internal!("Concurrency ceiling reached, skipping cycle");
        return Ok(Vec::new());
    }

    let items = dispatcher.store.claim_next(reservation.len()).await?;
    if items.is_empty() {
        debug!("Queue is empty");
        return Ok(Vec::new());
    }

    delivery!(level = DEBUG, claimed = items.len(), "Claimed items for delivery");

    let mut handles = Vec::with_capacity(items.len());
    for item in items {
        // The store never returns more than asked for
        let Some(permit) = reservation.take() else {
            break;
        };

        let attempt = Arc::clone(&dispatcher.attempt);
        handles.push(tokio::spawn(async move {
            let outcome = attempt.resolve(item).await;
            permit.release();
            outcome
        }));
    }

    Ok(handles)
}
