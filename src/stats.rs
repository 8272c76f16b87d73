//! Windowed stats over the event history
//!
//! Both queries are thin: validate the window, ask the store for a raw
//! aggregate, derive rate/status/percent as pure functions. Nothing derived
//! here is ever persisted.

use crate::store::{EventStore, LineAggregate, StoreError, WindowAggregate};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Machines at or above this many defects per hour are in `Warning`
pub const WARNING_DEFECT_RATE_PER_HOUR: f64 = 2.0;

#[derive(Error, Debug)]
pub enum StatsError {
    #[error("invalid window: start {start} must be at least one second before end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    #[error("limit must be at least 1")]
    InvalidLimit,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    Healthy,
    Warning,
}

impl HealthStatus {
    pub fn from_rate(rate_per_hour: f64) -> Self {
        if rate_per_hour < WARNING_DEFECT_RATE_PER_HOUR {
            HealthStatus::Healthy
        } else {
            HealthStatus::Warning
        }
    }
}

/// Per-machine health over `[start, end)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineStats {
    pub machine_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub event_count: u64,
    /// Sum of present defect counts, `None` if no event carried one
    pub defect_count: Option<i64>,
    pub avg_defect_rate_per_hour: Option<f64>,
    pub status: Option<HealthStatus>,
}

impl MachineStats {
    /// Derive rate and status from a raw aggregate
    ///
    /// The window must already have passed `check_rate_window`.
    pub fn from_aggregate(
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        aggregate: WindowAggregate,
    ) -> Self {
        let hours = hours_between(start, end);
        let avg_defect_rate_per_hour = aggregate.defect_sum.map(|sum| sum as f64 / hours);

        Self {
            machine_id: machine_id.to_string(),
            start,
            end,
            event_count: aggregate.event_count,
            defect_count: aggregate.defect_sum,
            avg_defect_rate_per_hour,
            status: avg_defect_rate_per_hour.map(HealthStatus::from_rate),
        }
    }
}

/// One line of the per-factory defect ranking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineDefectRanking {
    pub line_id: String,
    pub total_defects: Option<i64>,
    pub event_count: u64,
    pub defects_percent: Option<f64>,
}

impl From<LineAggregate> for LineDefectRanking {
    fn from(line: LineAggregate) -> Self {
        Self {
            defects_percent: defects_percent(line.defect_sum, line.event_count),
            line_id: line.line_id,
            total_defects: line.defect_sum,
            event_count: line.event_count,
        }
    }
}

/// Whole seconds between the instants, in hours
pub fn hours_between(start: DateTime<Utc>, end: DateTime<Utc>) -> f64 {
    (end - start).num_seconds() as f64 / 3600.0
}

/// `total * 100 / count` rounded to 2 decimals; not clamped to 100
pub fn defects_percent(total_defects: Option<i64>, event_count: u64) -> Option<f64> {
    if event_count == 0 {
        return None;
    }
    total_defects.map(|total| round2(total as f64 * 100.0 / event_count as f64))
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn check_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StatsError> {
    if end <= start {
        return Err(StatsError::InvalidWindow { start, end });
    }
    Ok(())
}

/// A rate needs a non-zero `hours_between`
fn check_rate_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StatsError> {
    check_window(start, end)?;
    if (end - start).num_seconds() == 0 {
        return Err(StatsError::InvalidWindow { start, end });
    }
    Ok(())
}

/// Read-side queries over an `EventStore`
#[derive(Clone)]
pub struct StatsAggregator {
    store: Arc<dyn EventStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Event count, defect sum, defect rate and health for one machine
    pub async fn machine_stats(
        &self,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<MachineStats, StatsError> {
        check_rate_window(start, end)?;

        let aggregate = self.store.window_aggregate(machine_id, start, end).await?;
        let stats = MachineStats::from_aggregate(machine_id, start, end, aggregate);

        log::debug!(
            "📊 Stats {}: events={} defects={:?} status={:?}",
            machine_id,
            stats.event_count,
            stats.defect_count,
            stats.status
        );
        Ok(stats)
    }

    /// Lines of a factory ranked by summed defects, at most `limit`
    pub async fn top_defect_lines(
        &self,
        factory_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineDefectRanking>, StatsError> {
        check_window(from, to)?;
        if limit == 0 {
            return Err(StatsError::InvalidLimit);
        }

        let lines = self
            .store
            .grouped_window_aggregate(factory_id, from, to, limit)
            .await?;

        Ok(lines.into_iter().map(LineDefectRanking::from).collect())
    }
}
