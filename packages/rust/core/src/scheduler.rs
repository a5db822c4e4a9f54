//! Batch ingestion: fetch one date window and run the pipeline per record.
//!
//! A record whose pipeline run fails is dropped from the output and recorded
//! as a single `ingest/failed` event tagged with the record id. Only a failed
//! fetch fails the whole batch. Nothing is retried, and records are not
//! deduplicated across runs: every run generates fresh job ids.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use ingestflow_shared::{
    AuditStore, IngestflowError, IngestionBatch, JobId, JobOutcome, Result, SourceFetcher, SourceRecord,
    StageEvent, StageStatus, ToolFailure,
};
use serde_json::{Value, json};
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};

use crate::executor::{Job, PipelineExecutor};

/// Stage name of per-record failure events.
pub const INGEST_STAGE: &str = "ingest";

/// Summary of one batch run.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub fetched: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Progress callback for batch runs.
pub trait BatchReporter: Send + Sync {
    /// Called once the fetch returns.
    fn fetched(&self, total: usize);
    /// Called when a record's pipeline run finishes, in fetch order.
    fn record_finished(&self, record_id: &str, succeeded: bool, current: usize, total: usize);
    /// Called when the batch completes.
    fn done(&self, report: &BatchReport);
}

/// No-op reporter for headless/test usage.
pub struct SilentProgress;

impl BatchReporter for SilentProgress {
    fn fetched(&self, _total: usize) {}
    fn record_finished(&self, _record_id: &str, _succeeded: bool, _current: usize, _total: usize) {}
    fn done(&self, _report: &BatchReport) {}
}

// ---------------------------------------------------------------------------
// IngestionScheduler
// ---------------------------------------------------------------------------

/// Drives one pipeline run per fetched record.
pub struct IngestionScheduler {
    executor: PipelineExecutor,
    fetcher: Arc<dyn SourceFetcher>,
    stages: Arc<[String]>,
    concurrency: usize,
}

impl IngestionScheduler {
    /// Sequential scheduler running every record through `stages`.
    pub fn new(
        executor: PipelineExecutor,
        fetcher: Arc<dyn SourceFetcher>,
        stages: Vec<String>,
    ) -> Self {
        Self {
            executor,
            fetcher,
            stages: stages.into(),
            concurrency: 1,
        }
    }

    /// Run up to `concurrency` records at once. Output order is unaffected.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Process the records of one date window and return the successes in fetch order.
    pub async fn run_batch(
        &self,
        date: NaiveDate,
        timezone: &str,
        limit: u32,
    ) -> Result<Vec<JobOutcome>> {
        let batch = IngestionBatch {
            date,
            timezone: timezone.to_string(),
            limit,
        };
        self.run_batch_with_progress(&batch, &SilentProgress).await
    }

    #[instrument(skip_all, fields(date = %batch.date, timezone = %batch.timezone, limit = batch.limit))]
    pub async fn run_batch_with_progress(
        &self,
        batch: &IngestionBatch,
        progress: &dyn BatchReporter,
    ) -> Result<Vec<JobOutcome>> {
        let start = Instant::now();

        let records = self.fetcher.fetch_batch(batch).await?;
        let total = records.len();
        progress.fetched(total);
        info!(
            records = total,
            concurrency = self.concurrency,
            "starting batch"
        );

        let mut outcomes = Vec::new();
        let mut failed = 0;

        if self.concurrency == 1 {
            // Sequential: one job at a time, audit rows land in fetch order.
            for (position, record) in records.into_iter().enumerate() {
                let mut job = Job::new(record_input(&record));
                let outcome = self.executor.execute_job(&mut job, &self.stages).await;
                let settled = self.settle(&record, job.id, outcome).await;
                progress.record_finished(&record.id, settled.is_some(), position + 1, total);
                match settled {
                    Some(outcome) => outcomes.push(outcome),
                    None => failed += 1,
                }
            }
        } else {
            let semaphore = Arc::new(Semaphore::new(self.concurrency));
            let mut handles = Vec::with_capacity(total);

            for record in records {
                let job = Job::new(record_input(&record));
                let job_id = job.id.clone();
                let executor = self.executor.clone();
                let stages = self.stages.clone();
                let sem = semaphore.clone();

                let handle = tokio::spawn(async move {
                    let _permit = sem.acquire_owned().await.expect("semaphore closed");
                    let mut job = job;
                    executor.execute_job(&mut job, &stages).await
                });
                handles.push((record, job_id, handle));
            }

            // Collect by fetch position, not completion order.
            for (position, (record, job_id, handle)) in handles.into_iter().enumerate() {
                let outcome = match handle.await {
                    Ok(outcome) => outcome,
                    Err(e) => Err(IngestflowError::pipeline(
                        &job_id,
                        INGEST_STAGE,
                        IngestflowError::ToolExecution {
                            tool: INGEST_STAGE.to_string(),
                            source: ToolFailure::failed(format!("task aborted: {e}")),
                        },
                    )),
                };
                let settled = self.settle(&record, job_id, outcome).await;
                progress.record_finished(&record.id, settled.is_some(), position + 1, total);
                match settled {
                    Some(outcome) => outcomes.push(outcome),
                    None => failed += 1,
                }
            }
        }

        let report = BatchReport {
            fetched: total,
            succeeded: outcomes.len(),
            failed,
            elapsed: start.elapsed(),
        };
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis(),
            "batch complete"
        );
        progress.done(&report);

        Ok(outcomes)
    }

    /// Keep a successful run, or record the failure and drop the record.
    async fn settle(
        &self,
        record: &SourceRecord,
        job_id: JobId,
        outcome: Result<Value>,
    ) -> Option<JobOutcome> {
        match outcome {
            Ok(result) => Some(JobOutcome { job_id, result }),
            Err(e) => {
                self.record_failure(&job_id, record, &e).await;
                None
            }
        }
    }

    /// Emit the single tagged failure event for a record. Never fails the batch.
    async fn record_failure(&self, job_id: &JobId, record: &SourceRecord, err: &IngestflowError) {
        warn!(record_id = %record.id, %job_id, error = %err, "record failed");

        let (failed_stage, cause) = match err.stage_failure() {
            Some((stage, cause)) => (Value::from(stage), cause),
            None => (Value::Null, err),
        };
        let payload = json!({
            "record_id": record.id,
            "failed_stage": failed_stage,
            "kind": cause.kind(),
            "error": err.to_string(),
        });
        let event = StageEvent::now(job_id, INGEST_STAGE, StageStatus::Failed, payload)
            .with_source(record.id.clone());

        if let Err(e) = self.executor.store().append(&event).await {
            error!(record_id = %record.id, error = %e, "failed to record ingest failure");
        }
    }
}

fn record_input(record: &SourceRecord) -> Value {
    json!({ "text": record.content })
}
