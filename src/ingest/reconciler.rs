//! Batch reconciliation against the event store
//!
//! One call to `submit_batch` is a single sequential pass:
//!
//! 1. Validate every event (rejections keep input order)
//! 2. Keep the first occurrence of each `event_id` in the batch
//! 3. One bulk `lookup_many` for the surviving ids
//! 4. Decide per id: insert, update, duplicate or stale
//! 5. Stamp `received_time = now` unless the caller set one
//! 6. `write_many` through the store's conditional upsert
//! 7. Derive counters
//!
//! Step 4 only shapes the counters. Two reconcilers racing on the same id may
//! both decide "update"; the store's conditional upsert decides which write
//! actually lands (largest `received_time` wins).

use super::types::{BatchOutcome, MachineEvent, Rejection, StoredEvent};
use super::validation::{to_storage_precision, validate};
use super::IngestError;
use crate::config::TelemetryConfig;
use crate::store::EventStore;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Default upper bound on events per batch
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10_000;

/// Per-id outcome of conflict resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No stored row
    Insert,
    /// Stored row differs and the incoming event is not backdated
    Update,
    /// Stored row has the same payload
    Duplicate,
    /// Explicit `received_time` strictly older than the stored one
    Stale,
}

/// Decide what to do with one deduplicated, validated event
pub fn decide(incoming: &MachineEvent, stored: Option<&StoredEvent>) -> Decision {
    let Some(stored) = stored else {
        return Decision::Insert;
    };

    if stored.same_payload(incoming) {
        return Decision::Duplicate;
    }

    match incoming.received_time {
        Some(explicit) if explicit < stored.received_time => Decision::Stale,
        _ => Decision::Update,
    }
}

/// Keep the first event per `event_id`, preserving input order
fn first_occurrences(events: Vec<MachineEvent>) -> Vec<MachineEvent> {
    let mut seen = HashSet::with_capacity(events.len());
    events
        .into_iter()
        .filter(|event| seen.insert(event.event_id.clone()))
        .collect()
}

/// Rows to write plus the counters conflict resolution produced
#[derive(Debug, Default)]
struct Resolution {
    writes: Vec<StoredEvent>,
    updated: usize,
    deduped: usize,
}

fn resolve(
    candidates: Vec<MachineEvent>,
    existing: &HashMap<String, StoredEvent>,
    now: DateTime<Utc>,
) -> Resolution {
    let mut resolution = Resolution {
        writes: Vec::with_capacity(candidates.len()),
        ..Resolution::default()
    };

    for event in candidates {
        match decide(&event, existing.get(&event.event_id)) {
            Decision::Duplicate => resolution.deduped += 1,
            Decision::Stale => {
                log::debug!(
                    "⏪ Dropping backdated event {} (explicit receivedTime older than stored)",
                    event.event_id
                );
                resolution.deduped += 1;
            }
            decision => {
                if decision == Decision::Update {
                    resolution.updated += 1;
                }
                let received_time = event.received_time.unwrap_or(now);
                resolution.writes.push(StoredEvent::from_event(event, received_time));
            }
        }
    }

    resolution
}

/// Reconciles incoming batches against an `EventStore`
///
/// Holds no mutable state; share one instance (or clones of the store `Arc`)
/// across concurrent callers.
#[derive(Clone)]
pub struct BatchReconciler {
    store: Arc<dyn EventStore>,
    max_batch_size: usize,
}

impl BatchReconciler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self {
            store,
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
        }
    }

    pub fn from_config(store: Arc<dyn EventStore>, config: &TelemetryConfig) -> Self {
        Self::new(store).with_max_batch_size(config.max_batch_size)
    }

    pub fn with_max_batch_size(mut self, max_batch_size: usize) -> Self {
        self.max_batch_size = max_batch_size;
        self
    }

    /// Validate, deduplicate and reconcile one batch
    ///
    /// `now` is the batch's receipt instant: it bounds future event times and
    /// becomes the `received_time` of every written event that did not carry
    /// an explicit one.
    ///
    /// A store failure fails the whole call. Re-submitting the same batch is
    /// safe: already-applied events come back as `deduped`.
    pub async fn submit_batch(
        &self,
        events: Vec<MachineEvent>,
        now: DateTime<Utc>,
    ) -> Result<BatchOutcome, IngestError> {
        if events.len() > self.max_batch_size {
            return Err(IngestError::BatchTooLarge {
                size: events.len(),
                max: self.max_batch_size,
            });
        }

        let submitted = events.len();
        let now = to_storage_precision(now);

        let mut rejections = Vec::new();
        let mut valid = Vec::with_capacity(submitted);
        for event in events {
            let event_id = event.event_id.clone();
            match validate(event, now) {
                Ok(normalized) => valid.push(normalized),
                Err(reason) => rejections.push(Rejection { event_id, reason }),
            }
        }

        let candidates = first_occurrences(valid);
        let ids: Vec<String> = candidates.iter().map(|e| e.event_id.clone()).collect();

        let existing = if ids.is_empty() {
            HashMap::new()
        } else {
            self.store.lookup_many(&ids).await?
        };

        let resolution = resolve(candidates, &existing, now);

        if !resolution.writes.is_empty() {
            let applied = self.store.write_many(&resolution.writes).await?;
            if applied < resolution.writes.len() {
                // A concurrent writer got there first with a newer receivedTime
                log::warn!(
                    "⚠️  Store refused {} of {} writes (newer receivedTime already stored)",
                    resolution.writes.len() - applied,
                    resolution.writes.len()
                );
            }
        }

        let outcome = BatchOutcome {
            accepted: resolution.writes.len() - resolution.updated,
            deduped: resolution.deduped,
            updated: resolution.updated,
            rejected: rejections.len(),
            rejections,
        };

        log::debug!(
            "📦 Batch of {}: accepted={} updated={} deduped={} rejected={}",
            submitted,
            outcome.accepted,
            outcome.updated,
            outcome.deduped,
            outcome.rejected
        );

        Ok(outcome)
    }
}
