//! Event store contract consumed by the reconciler and the stats aggregator
//!
//! Two adapters ship with the crate:
//! - `SqliteEventStore` - durable reference store (rusqlite, WAL)
//! - `InMemoryEventStore` - mutex-guarded map for tests and local runs
//!
//! The conditional upsert is the only place where the monotonic
//! `received_time` invariant is enforced. Callers' in-memory conflict checks
//! are advisory.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryEventStore;
pub use sqlite::SqliteEventStore;

use crate::ingest::types::StoredEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use thiserror::Error;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Arithmetic overflow: {0}")]
    Overflow(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Raw result of a per-machine window query
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowAggregate {
    pub event_count: u64,
    /// `None` when no event in the window carried a defect count
    pub defect_sum: Option<i64>,
}

/// Raw result row of a per-line grouped window query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineAggregate {
    pub line_id: String,
    pub defect_sum: Option<i64>,
    pub event_count: u64,
}

/// Durable keyed storage for machine events
///
/// Windows are half-open: `start <= event_time < end`.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Fetch stored rows for the subset of `ids` that exist
    ///
    /// Missing ids are absent from the map, not an error.
    async fn lookup_many(&self, ids: &[String]) -> Result<HashMap<String, StoredEvent>, StoreError>;

    /// Insert the row if absent, or replace it only if
    /// `event.received_time > stored.received_time`
    ///
    /// Returns `true` when the row changed, `false` for a no-op.
    /// Must be atomic per row under concurrent callers.
    async fn conditional_upsert(&self, event: &StoredEvent) -> Result<bool, StoreError>;

    /// Write a set of rows, each through the conditional upsert
    ///
    /// Returns the number of rows that changed. Adapters may override this to
    /// batch I/O but must keep the per-row condition.
    async fn write_many(&self, events: &[StoredEvent]) -> Result<usize, StoreError> {
        let mut applied = 0;
        for event in events {
            if self.conditional_upsert(event).await? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Event count and defect sum for one machine over `[start, end)`
    async fn window_aggregate(
        &self,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowAggregate, StoreError>;

    /// Per-line defect sums and event counts for one factory over `[from, to)`
    ///
    /// Ordered by defect sum descending (absent sums last), truncated to
    /// `limit` rows. Tie order is unspecified.
    async fn grouped_window_aggregate(
        &self,
        factory_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineAggregate>, StoreError>;

    /// Convenience single-row lookup
    async fn fetch(&self, event_id: &str) -> Result<Option<StoredEvent>, StoreError> {
        let mut rows = self.lookup_many(&[event_id.to_string()]).await?;
        Ok(rows.remove(event_id))
    }
}
