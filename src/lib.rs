//! # machine_telemetry
//!
//! Batch ingestion and windowed stats for factory machine telemetry.
//!
//! - `ingest` - validation, in-batch dedup, last-writer-wins reconciliation
//! - `store` - `EventStore` contract plus SQLite and in-memory adapters
//! - `stats` - per-machine health and per-line defect ranking
//! - `config` - environment-driven settings
//!
//! Exactly-once-effective over at-least-once delivery: a batch can be resent
//! any number of times, and a row's `receivedTime` never moves backwards
//! because every write goes through the store's conditional upsert.

pub mod config;
pub mod ingest;
pub mod sqlite_pragma;
pub mod stats;
pub mod store;

pub use config::TelemetryConfig;
pub use ingest::{BatchOutcome, BatchReconciler, IngestError, MachineEvent, Rejection, RejectionReason, StoredEvent};
pub use stats::{HealthStatus, LineDefectRanking, MachineStats, StatsAggregator, StatsError};
pub use store::{EventStore, InMemoryEventStore, SqliteEventStore, StoreError};
