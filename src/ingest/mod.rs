//! Batch ingestion: validation, in-batch dedup and reconciliation against
//! the event store.
//!
//! ```text
//! Vec<MachineEvent>
//!     ↓
//! validation::validate()        (per event, pure)
//!     ↓
//! BatchReconciler::submit_batch()
//!     ├─ EventStore::lookup_many()   (one bulk read)
//!     ├─ conflict resolution         (counters only)
//!     └─ EventStore::write_many()    (conditional upserts)
//!     ↓
//! BatchOutcome
//! ```

pub mod reconciler;
pub mod types;
pub mod validation;

pub use reconciler::BatchReconciler;
pub use types::{BatchOutcome, MachineEvent, Rejection, RejectionReason, StoredEvent};

use crate::store::StoreError;
use thiserror::Error;

/// Failure of a whole batch call
///
/// Per-event problems are never reported here; they become `Rejection`
/// entries of the `BatchOutcome`.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("batch of {size} events exceeds limit of {max}")]
    BatchTooLarge { size: usize, max: usize },

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}
