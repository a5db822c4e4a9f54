//! Shared types, error model, configuration, and collaborator contracts for ingestflow.
//!
//! This crate is the foundation depended on by all other ingestflow crates.
//! It provides:
//! - [`IngestflowError`] and [`ToolFailure`]: the unified error model
//! - Domain types ([`JobId`], [`StageEvent`], [`SourceRecord`], [`IngestionBatch`])
//! - Configuration ([`AppConfig`], config loading)
//! - Boundary traits ([`AuditStore`], [`SourceFetcher`])

pub mod boundary;
pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use boundary::{AuditStore, SourceFetcher, SyncStateStore};
pub use config::{
    AppConfig, DuplicatePolicy, PipelineConfig, ScheduleConfig, SourceConfig, StoreConfig,
    ToolConfig,
    config_dir, config_file_path, init_config, load_config, load_config_from, source_api_key,
};
pub use error::{IngestflowError, Result, ToolFailure};
pub use types::{
    IngestionBatch, JobId, JobOutcome, JobResult, JobStatus, SourceRecord, StageEvent,
    StageStatus, SyncState,
};
