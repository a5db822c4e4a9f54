//! Date-range and incremental ingestion.
//!
//! A range runs one batch per calendar day, oldest first. A day whose batch
//! fails is reported and skipped; later days still run. After every completed
//! day the sync state of the source is saved, so `resume` picks up from the
//! last completed day. Resuming re-runs that day, which is usually a partial
//! "today" from the previous run. Records are not deduplicated.

use std::sync::Arc;

use chrono::{Days, NaiveDate, Utc};
use ingestflow_shared::{
    IngestflowError, IngestionBatch, JobOutcome, Result, SyncState, SyncStateStore,
};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::scheduler::{BatchReporter, INGEST_STAGE, IngestionScheduler};

/// Sync state key used when none is configured.
pub const DEFAULT_SYNC_SOURCE: &str = "lifelogs";

/// Outcome of one day in a range.
#[derive(Debug, Clone, Serialize)]
pub struct DaySync {
    pub date: NaiveDate,
    pub outcomes: Vec<JobOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary of a range run.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    /// Successful jobs in this run.
    pub synced: u64,
    pub days: Vec<DaySync>,
    pub errors: Vec<String>,
}

impl SyncReport {
    pub fn failed_days(&self) -> usize {
        self.days.iter().filter(|d| d.error.is_some()).count()
    }
}

// ---------------------------------------------------------------------------
// RangeSync
// ---------------------------------------------------------------------------

/// Drives [`IngestionScheduler`] over a window of days and records progress.
pub struct RangeSync {
    scheduler: IngestionScheduler,
    state: Arc<dyn SyncStateStore>,
    source: String,
}

impl RangeSync {
    pub fn new(scheduler: IngestionScheduler, state: Arc<dyn SyncStateStore>) -> Self {
        Self {
            scheduler,
            state,
            source: DEFAULT_SYNC_SOURCE.to_string(),
        }
    }

    /// Key the sync state under `source` instead of the default.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    pub fn scheduler(&self) -> &IngestionScheduler {
        &self.scheduler
    }

    /// Run every day from `from` to `to`, both inclusive.
    #[instrument(skip_all, fields(source = %self.source, %from, %to))]
    pub async fn sync_range(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        timezone: &str,
        limit: u32,
        progress: &dyn BatchReporter,
    ) -> Result<SyncReport> {
        if from > to {
            return Err(IngestflowError::validation(
                INGEST_STAGE,
                format!("start date {from} is after end date {to}"),
            ));
        }

        let previous = self.state.get_sync_state(&self.source).await?;
        let mut total = previous.as_ref().map_or(0, |s| s.total_synced);
        let mut last_date = previous.map(|s| s.last_sync_date);

        let mut report = SyncReport {
            from,
            to,
            synced: 0,
            days: Vec::new(),
            errors: Vec::new(),
        };

        for date in from.iter_days().take_while(|d| *d <= to) {
            let batch = IngestionBatch {
                date,
                timezone: timezone.to_string(),
                limit,
            };

            let outcomes = match self.scheduler.run_batch_with_progress(&batch, progress).await {
                Ok(outcomes) => outcomes,
                Err(e) => {
                    warn!(%date, error = %e, "day failed");
                    report.errors.push(format!("error syncing {date}: {e}"));
                    report.days.push(DaySync {
                        date,
                        outcomes: Vec::new(),
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let synced = outcomes.len() as u64;
            report.synced += synced;
            total += synced;
            // A backfill never moves the resume point backwards.
            let marker = last_date.map_or(date, |d| d.max(date));
            last_date = Some(marker);

            let state = SyncState {
                source: self.source.clone(),
                last_sync_date: marker,
                total_synced: total,
                updated_at: Utc::now(),
            };
            let error = match self.state.save_sync_state(&state).await {
                Ok(()) => None,
                Err(e) => {
                    warn!(%date, error = %e, "failed to save sync state");
                    report
                        .errors
                        .push(format!("error saving sync state for {date}: {e}"));
                    Some(e.to_string())
                }
            };
            report.days.push(DaySync {
                date,
                outcomes,
                error,
            });
        }

        info!(
            days = report.days.len(),
            failed_days = report.failed_days(),
            synced = report.synced,
            "range complete"
        );
        Ok(report)
    }

    /// Run from the last completed day (or yesterday, on first use) up to `today`.
    pub async fn resume(
        &self,
        today: NaiveDate,
        timezone: &str,
        limit: u32,
        progress: &dyn BatchReporter,
    ) -> Result<SyncReport> {
        let from = match self.state.get_sync_state(&self.source).await? {
            Some(state) => state.last_sync_date.min(today),
            None => today.checked_sub_days(Days::new(1)).unwrap_or(today),
        };
        info!(source = %self.source, %from, %today, "resuming sync");
        self.sync_range(from, today, timezone, limit, progress).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::PipelineExecutor;
    use crate::scheduler::SilentProgress;
    use crate::testing::{FakeFetcher, MemorySyncState, RecordingStore, stages, test_registry};
    use ingestflow_shared::{AuditStore, SyncStateStore};
    use ingestflow_storage::Storage;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn range_sync(
        audit: Arc<dyn AuditStore>,
        fetcher: Arc<FakeFetcher>,
        state: Arc<dyn SyncStateStore>,
    ) -> RangeSync {
        let executor = PipelineExecutor::new(Arc::new(test_registry()), audit);
        let scheduler = IngestionScheduler::new(executor, fetcher, stages(&["upper"]));
        RangeSync::new(scheduler, state)
    }

    #[tokio::test]
    async fn range_runs_one_batch_per_day() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a", "b"]));
        let state = Arc::new(MemorySyncState::default());
        let sync = range_sync(
            Arc::new(RecordingStore::default()),
            fetcher.clone(),
            state.clone(),
        );

        let report = sync
            .sync_range(day(1), day(3), "UTC", 10, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(fetcher.requested_dates(), vec![day(1), day(2), day(3)]);
        assert_eq!(report.synced, 6);
        assert_eq!(report.failed_days(), 0);
        assert!(report.errors.is_empty());

        let saved = state.get(DEFAULT_SYNC_SOURCE).unwrap();
        assert_eq!(saved.last_sync_date, day(3));
        assert_eq!(saved.total_synced, 6);
    }

    #[tokio::test]
    async fn failing_day_does_not_stop_the_range() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a", "b"]).failing_on(day(2)));
        let state = Arc::new(MemorySyncState::default());
        let sync = range_sync(
            Arc::new(RecordingStore::default()),
            fetcher.clone(),
            state.clone(),
        );

        let report = sync
            .sync_range(day(1), day(3), "UTC", 10, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(fetcher.requested_dates(), vec![day(1), day(2), day(3)]);
        assert_eq!(report.synced, 4);
        assert_eq!(report.failed_days(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("2024-03-02"));
        assert!(report.days[1].outcomes.is_empty());
        assert_eq!(report.days[2].outcomes.len(), 2);

        let saved = state.get(DEFAULT_SYNC_SOURCE).unwrap();
        assert_eq!(saved.last_sync_date, day(3));
        assert_eq!(saved.total_synced, 4);
    }

    #[tokio::test]
    async fn reversed_range_is_rejected() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a"]));
        let sync = range_sync(
            Arc::new(RecordingStore::default()),
            fetcher.clone(),
            Arc::new(MemorySyncState::default()),
        );

        let err = sync
            .sync_range(day(3), day(1), "UTC", 10, &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "validation");
        assert!(fetcher.requested_dates().is_empty());
    }

    #[tokio::test]
    async fn resume_starts_from_last_synced_day() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a"]));
        let state = Arc::new(MemorySyncState::seeded(SyncState {
            source: DEFAULT_SYNC_SOURCE.into(),
            last_sync_date: day(2),
            total_synced: 5,
            updated_at: Utc::now(),
        }));
        let sync = range_sync(
            Arc::new(RecordingStore::default()),
            fetcher.clone(),
            state.clone(),
        );

        let report = sync.resume(day(4), "UTC", 10, &SilentProgress).await.unwrap();

        assert_eq!(fetcher.requested_dates(), vec![day(2), day(3), day(4)]);
        assert_eq!((report.from, report.to), (day(2), day(4)));
        let saved = state.get(DEFAULT_SYNC_SOURCE).unwrap();
        assert_eq!(saved.last_sync_date, day(4));
        assert_eq!(saved.total_synced, 8);
    }

    #[tokio::test]
    async fn first_resume_starts_yesterday() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a"]));
        let sync = range_sync(
            Arc::new(RecordingStore::default()),
            fetcher.clone(),
            Arc::new(MemorySyncState::default()),
        );

        sync.resume(day(10), "UTC", 10, &SilentProgress).await.unwrap();
        assert_eq!(fetcher.requested_dates(), vec![day(9), day(10)]);
    }

    #[tokio::test]
    async fn backfill_keeps_the_later_resume_point() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a"]));
        let state = Arc::new(MemorySyncState::seeded(SyncState {
            source: DEFAULT_SYNC_SOURCE.into(),
            last_sync_date: day(20),
            total_synced: 1,
            updated_at: Utc::now(),
        }));
        let sync = range_sync(Arc::new(RecordingStore::default()), fetcher, state.clone());

        sync.sync_range(day(1), day(2), "UTC", 10, &SilentProgress)
            .await
            .unwrap();

        let saved = state.get(DEFAULT_SYNC_SOURCE).unwrap();
        assert_eq!(saved.last_sync_date, day(20));
        assert_eq!(saved.total_synced, 3);
    }

    #[tokio::test]
    async fn unsaved_state_is_reported_per_day() {
        let fetcher = Arc::new(FakeFetcher::with_contents(&["a"]));
        let sync = range_sync(
            Arc::new(RecordingStore::default()),
            fetcher.clone(),
            Arc::new(MemorySyncState::failing_save()),
        );

        let report = sync
            .sync_range(day(1), day(2), "UTC", 10, &SilentProgress)
            .await
            .unwrap();

        assert_eq!(fetcher.requested_dates(), vec![day(1), day(2)]);
        assert_eq!(report.errors.len(), 2);
        assert_eq!(report.synced, 2);
        assert_eq!(report.days[0].outcomes.len(), 1);
        assert!(report.days[0].error.is_some());
    }

    #[tokio::test]
    async fn range_with_libsql_state() {
        let path = std::env::temp_dir().join(format!("if_test_{}.db", uuid::Uuid::now_v7()));
        let storage = Arc::new(Storage::open(&path).await.unwrap());

        let fetcher = Arc::new(FakeFetcher::with_contents(&["a", "b", "c"]).failing_on(day(2)));
        let sync = range_sync(storage.clone(), fetcher.clone(), storage.clone());

        let report = sync
            .sync_range(day(1), day(3), "UTC", 2, &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.synced, 4);
        assert_eq!(report.failed_days(), 1);

        let saved = storage
            .get_sync_state(DEFAULT_SYNC_SOURCE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.last_sync_date, day(3));
        assert_eq!(saved.total_synced, 4);

        // The next run resumes at the last completed day.
        let report = sync.resume(day(4), "UTC", 2, &SilentProgress).await.unwrap();
        assert_eq!(report.from, day(3));
        assert_eq!(
            fetcher.requested_dates(),
            vec![day(1), day(2), day(3), day(3), day(4)]
        );
        let saved = storage
            .get_sync_state(DEFAULT_SYNC_SOURCE)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(saved.total_synced, 8);
        assert_eq!(
            storage.list_results(100).await.unwrap().len(),
            8
        );
    }
}
