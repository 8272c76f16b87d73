//! In-memory `EventStore`
//!
//! A single `Mutex<HashMap>` makes every operation atomic, which is enough to
//! honour the per-row conditional write under concurrent reconcilers.

use super::{EventStore, LineAggregate, StoreError, WindowAggregate};
use crate::ingest::types::StoredEvent;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    rows: Mutex<HashMap<String, StoredEvent>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn rows(&self) -> Result<MutexGuard<'_, HashMap<String, StoredEvent>>, StoreError> {
        self.rows
            .lock()
            .map_err(|_| StoreError::Unavailable("in-memory store lock poisoned".to_string()))
    }

    /// Number of stored rows
    pub fn count(&self) -> Result<usize, StoreError> {
        Ok(self.rows()?.len())
    }
}

/// Absent counts are skipped; a sum past `i64::MAX` is an error, as in SQLite
fn add_defects(acc: Option<i64>, value: Option<i64>) -> Result<Option<i64>, StoreError> {
    match (acc, value) {
        (Some(a), Some(v)) => a
            .checked_add(v)
            .map(Some)
            .ok_or_else(|| StoreError::Overflow("defect_count sum".to_string())),
        (None, v) => Ok(v),
        (a, None) => Ok(a),
    }
}

fn in_window(event: &StoredEvent, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    event.event_time >= start && event.event_time < end
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn lookup_many(&self, ids: &[String]) -> Result<HashMap<String, StoredEvent>, StoreError> {
        let rows = self.rows()?;
        Ok(ids
            .iter()
            .filter_map(|id| rows.get(id).map(|row| (id.clone(), row.clone())))
            .collect())
    }

    async fn conditional_upsert(&self, event: &StoredEvent) -> Result<bool, StoreError> {
        let mut rows = self.rows()?;
        match rows.get(&event.event_id) {
            Some(stored) if event.received_time <= stored.received_time => Ok(false),
            _ => {
                rows.insert(event.event_id.clone(), event.clone());
                Ok(true)
            }
        }
    }

    async fn window_aggregate(
        &self,
        machine_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<WindowAggregate, StoreError> {
        let rows = self.rows()?;
        let aggregate = rows
            .values()
            .filter(|e| e.machine_id == machine_id && in_window(e, start, end))
            .try_fold(WindowAggregate::default(), |acc, e| {
                Ok::<_, StoreError>(WindowAggregate {
                    event_count: acc.event_count + 1,
                    defect_sum: add_defects(acc.defect_sum, e.defect_count)?,
                })
            })?;
        Ok(aggregate)
    }

    async fn grouped_window_aggregate(
        &self,
        factory_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<LineAggregate>, StoreError> {
        let rows = self.rows()?;

        let mut per_line: HashMap<&str, LineAggregate> = HashMap::new();
        for event in rows
            .values()
            .filter(|e| e.factory_id == factory_id && in_window(e, from, to))
        {
            let line = per_line
                .entry(event.line_id.as_str())
                .or_insert_with(|| LineAggregate {
                    line_id: event.line_id.clone(),
                    defect_sum: None,
                    event_count: 0,
                });
            line.event_count += 1;
            line.defect_sum = add_defects(line.defect_sum, event.defect_count)?;
        }

        let mut lines: Vec<LineAggregate> = per_line.into_values().collect();
        // Option orders None first, so reverse for "descending, absent last"
        lines.sort_by(|a, b| {
            b.defect_sum
                .cmp(&a.defect_sum)
                .then_with(|| a.line_id.cmp(&b.line_id))
        });
        lines.truncate(limit);
        Ok(lines)
    }
}
