mod memory;
mod sqlite;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::StoreError;

/// Claims taken before the returned instant are stale
pub(crate) fn stale_cutoff(now: DateTime<Utc>, window: Duration) -> crate::Result<DateTime<Utc>> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| StoreError::Internal(format!("Staleness window out of range: {window:?}")))
}
