#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use machine_telemetry::{MachineEvent, SqliteEventStore};
use tempfile::TempDir;

/// Fixed "wall clock" for deterministic batches
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 15, 18, 0, 0).unwrap()
}

pub fn make_event(
    id: &str,
    machine_id: &str,
    event_time: DateTime<Utc>,
    duration_ms: i64,
    defect_count: Option<i64>,
) -> MachineEvent {
    MachineEvent {
        event_id: id.to_string(),
        event_time,
        received_time: None,
        machine_id: machine_id.to_string(),
        duration_ms,
        defect_count,
        line_id: "L-01".to_string(),
        factory_id: "F-01".to_string(),
    }
}

/// Event one hour before `now()` on M-001
pub fn recent_event(id: &str, defect_count: Option<i64>) -> MachineEvent {
    make_event(id, "M-001", now() - Duration::hours(1), 1000, defect_count)
}

/// SQLite store in a fresh temp dir; keep the `TempDir` alive for the test
pub fn temp_sqlite_store() -> (TempDir, SqliteEventStore) {
    let dir = tempfile::tempdir().unwrap();
    let store = SqliteEventStore::open(dir.path().join("telemetry.db"), std::time::Duration::from_secs(5)).unwrap();
    (dir, store)
}
