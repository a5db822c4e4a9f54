//! Collaborator contracts the core depends on but does not implement.
//!
//! Implementations are injected into the executor and scheduler at
//! construction. The core never buffers or retries on their behalf.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{IngestionBatch, JobId, SourceRecord, StageEvent, SyncState};

/// Audit trail and final-result persistence.
///
/// Implementations must make each individual write atomic; the core does not
/// serialize concurrent writes itself. Failures are reported as
/// [`IngestflowError::StoreUnavailable`](crate::IngestflowError::StoreUnavailable).
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Append one stage event. Events are never mutated or deleted.
    async fn append(&self, event: &StageEvent) -> Result<()>;

    /// Persist the final aggregate result of a job.
    async fn persist_result(&self, job_id: &JobId, result: &serde_json::Value) -> Result<()>;
}

/// Remote source of content records.
///
/// Failures are reported as
/// [`IngestflowError::SourceUnavailable`](crate::IngestflowError::SourceUnavailable).
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Fetch the ordered records of one date window.
    async fn fetch_batch(&self, batch: &IngestionBatch) -> Result<Vec<SourceRecord>>;
}

/// Persistence of date-window sync progress, one row per source.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get_sync_state(&self, source: &str) -> Result<Option<SyncState>>;

    /// Insert or replace the state of `state.source`.
    async fn save_sync_state(&self, state: &SyncState) -> Result<()>;
}
