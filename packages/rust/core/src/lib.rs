//! Pipeline orchestration for ingestflow.
//!
//! This crate ties the tool registry, the audit/result store and the source
//! fetcher together:
//! - [`PipelineExecutor`]: runs one job through an ordered list of tools
//! - [`IngestionScheduler`]: fans a fetched batch out into isolated jobs
//! - [`RangeSync`]: one batch per day over a date range, with resumable state

pub mod executor;
pub mod scheduler;
pub mod sync;

#[cfg(test)]
mod testing;

pub use executor::{Job, PERSIST_STAGE, PipelineExecutor, StageResult};
pub use scheduler::{
    BatchReport, BatchReporter, INGEST_STAGE, IngestionScheduler, SilentProgress,
};
pub use sync::{DEFAULT_SYNC_SOURCE, DaySync, RangeSync, SyncReport};
