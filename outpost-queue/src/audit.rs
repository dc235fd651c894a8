//! Audit sink writing to the application log and user alert tables

use async_trait::async_trait;
use chrono::Utc;
use outpost_common::audit::{AuditEvent, AuditSink, trace_event};
use sqlx::SqlitePool;
use tracing::error;

use crate::SqliteStore;

/// Alert type recorded for every failed notification
const ALERT_TYPE: &str = "EMAIL";

/// Writes `DeliveryAlert` events to `user_alerts`, everything else to `log`
///
/// Every event is also emitted through `tracing`, so a database outage never
/// loses the event entirely.
#[derive(Debug, Clone)]
pub struct SqliteAuditSink {
    pool: SqlitePool,
}

impl SqliteAuditSink {
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn for_store(store: &SqliteStore) -> Self {
        Self::new(store.pool().clone())
    }

    async fn insert(&self, event: &AuditEvent) -> crate::Result<()> {
        let now = Utc::now().timestamp();

        match event {
            AuditEvent::DeliveryAlert { user_id, detail } => {
                sqlx::query(
                    "INSERT INTO user_alerts (user_id, alert_type, alert_message, alert_date) \
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .bind(user_id)
                .bind(ALERT_TYPE)
                .bind(detail)
                .bind(now)
                .execute(&self.pool)
                .await?;
            }
            _ => {
                sqlx::query(
                    "INSERT INTO log (registered, log_type, log, log_meta) VALUES (?1, ?2, ?3, '')",
                )
                .bind(now)
                .bind(event.severity().as_str())
                .bind(event.message())
                .execute(&self.pool)
                .await?;
            }
        }

        Ok(())
    }
}

#[async_trait]
impl AuditSink for SqliteAuditSink {
    async fn record(&self, event: &AuditEvent) {
        trace_event(event);

        if let Err(e) = self.insert(event).await {
            error!(error = %e, severity = %event.severity(), "Failed to persist audit event");
        }
    }
}
