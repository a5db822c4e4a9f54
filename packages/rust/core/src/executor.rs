//! Pipeline executor: runs one job through an ordered list of tools.
//!
//! Stages are independent analyses of the same job input. Each stage emits a
//! `started` event followed by `succeeded` or `failed`; the first failure
//! aborts the job. Once every stage succeeds the merged aggregate is persisted.
//!
//! The audit trail is not transactional with result persistence: if
//! `persist_result` fails, the events already say `succeeded` but no result
//! exists. A persisted result is the only proof a job succeeded.

use std::sync::Arc;

use ingestflow_registry::ToolRegistry;
use ingestflow_shared::{
    AuditStore, IngestflowError, JobId, JobStatus, Result, StageEvent, StageStatus,
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tracing::{debug, info, instrument, warn};

/// Stage name reported when the final result cannot be persisted.
pub const PERSIST_STAGE: &str = "persist_result";

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

/// Output of one successful stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageResult {
    pub stage: String,
    pub output: Value,
}

/// One execution of the pipeline for a single input payload.
///
/// Mutated only by the executor running it.
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub input: Value,
    pub stage_results: Vec<StageResult>,
    pub status: JobStatus,
}

impl Job {
    /// A pending job with a freshly generated id.
    pub fn new(input: Value) -> Self {
        Self {
            id: JobId::new(),
            input,
            stage_results: Vec::new(),
            status: JobStatus::Pending,
        }
    }
}

// ---------------------------------------------------------------------------
// PipelineExecutor
// ---------------------------------------------------------------------------

/// Runs jobs against a shared registry, recording every transition in the store.
#[derive(Clone)]
pub struct PipelineExecutor {
    registry: Arc<ToolRegistry>,
    store: Arc<dyn AuditStore>,
}

impl PipelineExecutor {
    pub fn new(registry: Arc<ToolRegistry>, store: Arc<dyn AuditStore>) -> Self {
        Self { registry, store }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn AuditStore> {
        &self.store
    }

    /// Run `input` through `stages` as a new job and return the aggregate result.
    pub async fn execute(&self, stages: &[String], input: Value) -> Result<Value> {
        let mut job = Job::new(input);
        self.execute_job(&mut job, stages).await
    }

    /// Run a caller-created pending job through `stages`.
    ///
    /// On failure the job is left `failed` and the error is a
    /// [`IngestflowError::Pipeline`] naming the stage. Nothing is persisted
    /// for a failed job.
    #[instrument(skip_all, fields(job_id = %job.id, stages = stages.len()))]
    pub async fn execute_job(&self, job: &mut Job, stages: &[String]) -> Result<Value> {
        if job.status != JobStatus::Pending {
            return Err(IngestflowError::validation(
                "pipeline",
                format!("job {} is not pending", job.id),
            ));
        }
        job.status = JobStatus::Running;

        let mut aggregate = Map::new();

        for stage in stages {
            if let Err(e) = self.emit(job, stage, StageStatus::Started, Value::Null).await {
                return Err(fail(job, stage, e));
            }

            match self.registry.invoke(stage, job.input.clone()).await {
                Ok(output) => {
                    if let Err(e) = self
                        .emit(job, stage, StageStatus::Succeeded, output.clone())
                        .await
                    {
                        return Err(fail(job, stage, e));
                    }
                    merge_into(&mut aggregate, stage, output.clone());
                    job.stage_results.push(StageResult {
                        stage: stage.clone(),
                        output,
                    });
                    debug!(%stage, "stage succeeded");
                }
                Err(cause) => {
                    let detail = json!({ "kind": cause.kind(), "error": cause.to_string() });
                    if let Err(e) = self.emit(job, stage, StageStatus::Failed, detail).await {
                        warn!(%stage, error = %e, "failed to record stage failure");
                    }
                    return Err(fail(job, stage, cause));
                }
            }
        }

        let result = Value::Object(aggregate);
        if let Err(e) = self.store.persist_result(&job.id, &result).await {
            warn!(error = %e, "stages succeeded but the result was not persisted");
            return Err(fail(job, PERSIST_STAGE, e));
        }

        job.status = JobStatus::Succeeded;
        info!("job succeeded");
        Ok(result)
    }

    async fn emit(&self, job: &Job, stage: &str, status: StageStatus, payload: Value) -> Result<()> {
        self.store
            .append(&StageEvent::now(&job.id, stage, status, payload))
            .await
    }
}

fn fail(job: &mut Job, stage: &str, cause: IngestflowError) -> IngestflowError {
    job.status = JobStatus::Failed;
    warn!(%stage, kind = cause.kind(), error = %cause, "job failed");
    IngestflowError::pipeline(&job.id, stage, cause)
}

/// Object results are shallow-merged; anything else is stored under the stage name.
fn merge_into(aggregate: &mut Map<String, Value>, stage: &str, output: Value) {
    match output {
        Value::Object(fields) => aggregate.extend(fields),
        other => {
            aggregate.insert(stage.to_string(), other);
        }
    }
}
