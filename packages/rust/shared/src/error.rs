//! Error types for ingestflow.
//!
//! Library crates use [`IngestflowError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ingestflow operations.
#[derive(Debug, thiserror::Error)]
pub enum IngestflowError {
    /// A value did not match a tool's input or output contract.
    #[error("validation error in '{tool}': {message}")]
    Validation { tool: String, message: String },

    /// No tool with this name is registered.
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The tool is registered but switched off in the `[tools]` config.
    #[error("tool is disabled: {0}")]
    ToolDisabled(String),

    /// A tool with this name is already registered and the policy rejects overwrites.
    #[error("tool already registered: {0}")]
    DuplicateTool(String),

    /// The tool body itself reported a failure.
    #[error("tool '{tool}' failed: {source}")]
    ToolExecution {
        tool: String,
        #[source]
        source: ToolFailure,
    },

    /// First fatal stage failure of a job.
    #[error("job {job_id} failed at stage '{stage}': {source}")]
    Pipeline {
        job_id: String,
        stage: String,
        #[source]
        source: Box<IngestflowError>,
    },

    /// The audit/result store could not be reached or rejected the write.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// The source fetcher could not produce a batch.
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, IngestflowError>;

/// Structured failure value returned by tool bodies.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ToolFailure {
    /// The input was well-formed but unusable (e.g. empty text).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Any other failure inside the tool.
    #[error("{0}")]
    Failed(String),
}

impl ToolFailure {
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }
}

impl IngestflowError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error attributed to `tool`.
    pub fn validation(tool: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::Validation {
            tool: tool.into(),
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap a stage failure for job `job_id`.
    pub fn pipeline(job_id: impl ToString, stage: impl Into<String>, source: IngestflowError) -> Self {
        Self::Pipeline {
            job_id: job_id.to_string(),
            stage: stage.into(),
            source: Box::new(source),
        }
    }

    /// Stable machine-readable kind, recorded in audit payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "validation",
            Self::UnknownTool(_) => "unknown_tool",
            Self::ToolDisabled(_) => "tool_disabled",
            Self::DuplicateTool(_) => "duplicate_tool",
            Self::ToolExecution { .. } => "tool_execution",
            Self::Pipeline { .. } => "pipeline",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::SourceUnavailable(_) => "source_unavailable",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
        }
    }

    /// For a [`IngestflowError::Pipeline`], the failing stage and its cause.
    pub fn stage_failure(&self) -> Option<(&str, &IngestflowError)> {
        match self {
            Self::Pipeline { stage, source, .. } => Some((stage.as_str(), source.as_ref())),
            _ => None,
        }
    }
}
