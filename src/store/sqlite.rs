//! SQLite-backed `EventStore`
//!
//! Table `machine_events` (see `sql/01_machine_events.sql`), timestamps stored
//! as INTEGER microseconds. The conditional upsert is one statement:
//!
//! ```sql
//! INSERT ... ON CONFLICT(event_id) DO UPDATE SET ...
//! WHERE excluded.received_time > machine_events.received_time
//! ```
//!
//! so SQLite itself decides whether an older write may land, regardless of
//! what the calling reconciler believed when it read the row.

use super::{EventStore, LineAggregate, StoreError, WindowAggregate};
use crate::config::TelemetryConfig;
use crate::ingest::types::StoredEvent;
use crate::sqlite_pragma::apply_optimized_pragmas;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

const SCHEMA_SQL: &str = include_str!("../../sql/01_machine_events.sql");

/// Stay well below SQLITE_MAX_VARIABLE_NUMBER on old builds (999)
const LOOKUP_CHUNK: usize = 500;

const SELECT_COLUMNS: &str =
    "event_id, event_time, received_time, machine_id, duration_ms, defect_count, line_id, factory_id";

const CONDITIONAL_UPSERT_SQL: &str = r#"
    INSERT INTO machine_events (
        event_id, event_time, received_time, machine_id,
        duration_ms, defect_count, line_id, factory_id
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
    ON CONFLICT(event_id) DO UPDATE SET
        event_time = excluded.event_time,
        received_time = excluded.received_time,
        machine_id = excluded.machine_id,
        duration_ms = excluded.duration_ms,
        defect_count = excluded.defect_count,
        line_id = excluded.line_id,
        factory_id = excluded.factory_id
    WHERE excluded.received_time > machine_events.received_time
"#;

pub struct SqliteEventStore {
    conn: Mutex<Connection>,
}

impl SqliteEventStore {
    /// Open (or create) the database at `db_path` and apply the schema
    pub fn open(db_path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        apply_optimized_pragmas(&conn, busy_timeout)?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|e| StoreError::Schema(e.to_string()))?;

        log::info!("✅ SQLite event store ready: {}", db_path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn from_config(config: &TelemetryConfig) -> Result<Self, StoreError> {
        Self::open(
            &config.db_path,
            Duration::from_millis(config.sqlite_busy_timeout_ms),
        )
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("SQLite connection lock poisoned".to_string()))
    }

    /// Number of stored rows
    pub fn count(&self) -> Result<u64, StoreError> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM machine_events", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn to_micros(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

fn from_micros(idx: usize, micros: i64) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, micros))
}

fn row_to_event(row: &Row<'_>) -> rusqlite::Result<StoredEvent> {
    Ok(StoredEvent {
        event_id: row.get(0)?,
        event_time: from_micros(1, row.get(1)?)?,
        received_time: from_micros(2, row.get(2)?)?,
        machine_id: row.get(3)?,
        duration_ms: row.get(4)?,
        defect_count: row.get(5)?,
        line_id: row.get(6)?,
        factory_id: row.get(7)?,
    })
}

fn upsert(conn: &Connection, event: &StoredEvent) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        CONDITIONAL_UPSERT_SQL,
        params![
            event.event_id,
            to_micros(event.event_time),
            to_micros(event.received_time),
            event.machine_id,
            event.duration_ms,
            event.defect_count,
            event.line_id,
            event.factory_id,
        ],
    )?;
    Ok(changed > 0)
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn lookup_many(&self, ids: &[String]) -> Result<HashMap<String, StoredEvent>, StoreError> {
        let mut found = HashMap::with_capacity(ids.len());
        if ids.is_empty() {
            return Ok(found);
        }

        let conn = self.conn()?;
        for chunk in ids.chunks(LOOKUP_CHUNK) {
            let placeholders = vec!["?"; chunk.len()].join(", ");
            let sql = format!(
                "SELECT {} FROM machine_events WHERE event_id IN ({})",
                SELECT_COLUMNS, placeholders
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(rusqlite::params_from_iter(chunk.iter()), row_to_event)?;
            for row in rows {
                let event = row?;
                found.insert(event.event_id.clone(), event);
            }
        }

        log::debug!("📥 Looked up {} ids, {} stored", ids.len(), found.len());
        Ok(found)
    }

    async fn conditional_upsert(&self, event: &StoredEvent) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        Ok(upsert(&conn, event)?)
    }

    /// All rows in one transaction, each still guarded by the upsert condition
    async fn write_many(&self, events: &[StoredEvent]) -> Result<usize, StoreError> {
        if events.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut applied = 0;
        for event in events {
            if upsert(&tx, event)? {
                applied += 1;
            }
        }
        tx.commit()?;

        log::debug!("✅ Wrote {}/{} events to SQLite", applied, events.len());
        Ok(applied)
    }

    async fn window_aggregate(
        &self,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowAggregate, StoreError> {
        let conn = self.conn()?;
        let (count, defect_sum): (i64, Option<i64>) = conn.query_row(
            "SELECT COUNT(*), SUM(defect_count) FROM machine_events
             WHERE machine_id = ?1 AND event_time >= ?2 AND event_time < ?3",
            params![machine_id, to_micros(start), to_micros(end)],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(WindowAggregate {
            event_count: count as u64,
            defect_sum,
        })
    }

    async fn grouped_window_aggregate(
        &self,
        factory_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineAggregate>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT line_id, SUM(defect_count), COUNT(*) FROM machine_events
             WHERE factory_id = ?1 AND event_time >= ?2 AND event_time < ?3
             GROUP BY line_id
             ORDER BY SUM(defect_count) DESC NULLS LAST
             LIMIT ?4",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt.query_map(
            params![factory_id, to_micros(from), to_micros(to), limit],
            |row| {
                Ok(LineAggregate {
                    line_id: row.get(0)?,
                    defect_sum: row.get(1)?,
                    event_count: row.get::<_, i64>(2)? as u64,
                })
            },
        )?;

        let mut lines = Vec::new();
        for row in rows {
            lines.push(row?);
        }
        Ok(lines)
    }
}
