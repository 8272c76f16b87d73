//! Core data structures for batch ingestion
//!
//! - `MachineEvent` - incoming representation (as submitted by a caller)
//! - `StoredEvent` - persisted representation (one row per `event_id`)
//! - `BatchOutcome` - counters + itemised rejections returned per batch
//!
//! Field names on the wire are camelCase; `received_time` travels as
//! `receivedTime`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel meaning "defect count not measured"
pub const UNKNOWN_DEFECT_COUNT: i64 = -1;

/// Telemetry event as submitted in a batch
///
/// `received_time` is optional on input. When absent the reconciler stamps it
/// with the batch's `now`; when present it is treated as an explicit logical
/// receipt time (backfill/replay).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineEvent {
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_time: Option<DateTime<Utc>>,
    pub machine_id: String,
    pub duration_ms: i64,
    #[serde(default)]
    pub defect_count: Option<i64>,
    pub line_id: String,
    pub factory_id: String,
}

/// Event row as held by an `EventStore`
///
/// `received_time` is authoritative once persisted. `defect_count` is never
/// the `-1` sentinel here.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    pub event_id: String,
    pub event_time: DateTime<Utc>,
    pub received_time: DateTime<Utc>,
    pub machine_id: String,
    pub duration_ms: i64,
    pub defect_count: Option<i64>,
    pub line_id: String,
    pub factory_id: String,
}

impl StoredEvent {
    /// Build the row to persist from a normalized event and its receipt time
    pub fn from_event(event: MachineEvent, received_time: DateTime<Utc>) -> Self {
        Self {
            event_id: event.event_id,
            event_time: event.event_time,
            received_time,
            machine_id: event.machine_id,
            duration_ms: event.duration_ms,
            defect_count: event.defect_count,
            line_id: event.line_id,
            factory_id: event.factory_id,
        }
    }

    /// Field equality on every semantic attribute, ignoring `received_time`
    pub fn same_payload(&self, event: &MachineEvent) -> bool {
        self.event_time == event.event_time
            && self.machine_id == event.machine_id
            && self.duration_ms == event.duration_ms
            && self.defect_count == event.defect_count
            && self.line_id == event.line_id
            && self.factory_id == event.factory_id
    }
}

/// Stable per-event rejection reason code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RejectionReason {
    InvalidDuration,
    FutureEventTime,
    InvalidDefectCount,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::InvalidDuration => "INVALID_DURATION",
            RejectionReason::FutureEventTime => "FUTURE_EVENT_TIME",
            RejectionReason::InvalidDefectCount => "INVALID_DEFECT_COUNT",
        }
    }
}

impl std::fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rejected event of a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rejection {
    pub event_id: String,
    pub reason: RejectionReason,
}

/// Response to one batch submission (not persisted)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchOutcome {
    pub accepted: usize,
    pub deduped: usize,
    pub updated: usize,
    pub rejected: usize,
    pub rejections: Vec<Rejection>,
}
