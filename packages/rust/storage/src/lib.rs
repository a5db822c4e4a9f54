//! libSQL storage layer for the audit trail and job results.
//!
//! The [`Storage`] struct wraps a local libSQL database holding append-only
//! stage events, one immutable result row per successful job, and the resume
//! point of date-range ingestion. It implements [`AuditStore`] and
//! [`SyncStateStore`] so it can be injected into the executor and scheduler.
//!
//! **Lifecycle:**
//! - [`Storage::open`]: read-write, applies migrations
//! - [`Storage::open_readonly`]: inspection only, rejects writes
//! - [`Storage::close`]: every later call fails with `StoreUnavailable`

mod migrations;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use ingestflow_shared::{
    AuditStore, IngestflowError, JobId, JobResult, Result, StageEvent, StageStatus, SyncState,
    SyncStateStore,
};
use libsql::{Connection, Database, params};

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
    closed: AtomicBool,
}

fn store_err(e: impl std::fmt::Display) -> IngestflowError {
    IngestflowError::StoreUnavailable(e.to_string())
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    #[tracing::instrument(skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| IngestflowError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(store_err)?;

        let conn = db.connect().map_err(store_err)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
            closed: AtomicBool::new(false),
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` for inspection only.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(IngestflowError::StoreUnavailable(format!(
                "database not found at {}",
                path.display()
            )));
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(store_err)?;

        let conn = db.connect().map_err(store_err)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
            closed: AtomicBool::new(false),
        })
    }

    /// Close the store. Later reads and writes fail with `StoreUnavailable`.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        if !self.readonly {
            // Best effort; the data is already durable.
            if let Err(e) = self.conn.execute("PRAGMA optimize", params![]).await {
                tracing::debug!(error = %e, "PRAGMA optimize on close failed");
            }
        }
        tracing::info!("store closed");
        Ok(())
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn.execute_batch(migration.sql).await.map_err(|e| {
                    IngestflowError::StoreUnavailable(format!(
                        "migration v{} failed: {e}",
                        migration.version
                    ))
                })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(IngestflowError::StoreUnavailable("store is closed".into()));
        }
        Ok(())
    }

    /// Ensure we're open and in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        self.check_open()?;
        if self.readonly {
            return Err(IngestflowError::StoreUnavailable(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Stage events
    // -----------------------------------------------------------------------

    /// Append a stage event.
    pub async fn append_event(&self, event: &StageEvent) -> Result<()> {
        self.check_writable()?;
        let payload = serde_json::to_string(&event.payload).map_err(store_err)?;
        self.conn
            .execute(
                "INSERT INTO stage_events (job_id, stage, status, payload, source_id, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.job_id.to_string(),
                    event.stage.as_str(),
                    event.status.as_str(),
                    payload,
                    event.source_id.as_deref(),
                    event.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// All events of a job, in append order.
    pub async fn list_events(&self, job_id: &JobId) -> Result<Vec<StageEvent>> {
        self.query_events(
            "SELECT job_id, stage, status, payload, source_id, created_at
             FROM stage_events WHERE job_id = ?1 ORDER BY id",
            job_id.to_string(),
        )
        .await
    }

    /// All events tagged with a source record id, in append order.
    pub async fn list_events_for_source(&self, source_id: &str) -> Result<Vec<StageEvent>> {
        self.query_events(
            "SELECT job_id, stage, status, payload, source_id, created_at
             FROM stage_events WHERE source_id = ?1 ORDER BY id",
            source_id.to_string(),
        )
        .await
    }

    async fn query_events(&self, sql: &str, key: String) -> Result<Vec<StageEvent>> {
        self.check_open()?;
        let mut rows = self.conn.query(sql, params![key]).await.map_err(store_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            results.push(row_to_event(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Job results
    // -----------------------------------------------------------------------

    /// Persist the final result of a job. A job's result can be written once.
    pub async fn persist_job_result(&self, job_id: &JobId, result: &serde_json::Value) -> Result<()> {
        self.check_writable()?;
        let result_json = serde_json::to_string(result).map_err(store_err)?;
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO job_results (job_id, result, created_at) VALUES (?1, ?2, ?3)",
                params![job_id.to_string(), result_json, now],
            )
            .await
            .map_err(|e| {
                IngestflowError::StoreUnavailable(format!("persist result for job {job_id}: {e}"))
            })?;
        Ok(())
    }

    /// Get the persisted result of a job, if any.
    pub async fn get_result(&self, job_id: &JobId) -> Result<Option<JobResult>> {
        self.check_open()?;
        let mut rows = self
            .conn
            .query(
                "SELECT job_id, result, created_at FROM job_results WHERE job_id = ?1",
                params![job_id.to_string()],
            )
            .await
            .map_err(store_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_result(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(store_err(e)),
        }
    }

    /// Most recent results first.
    pub async fn list_results(&self, limit: u32) -> Result<Vec<JobResult>> {
        self.check_open()?;
        let mut rows = self
            .conn
            .query(
                "SELECT job_id, result, created_at FROM job_results
                 ORDER BY created_at DESC, job_id DESC LIMIT ?1",
                params![limit],
            )
            .await
            .map_err(store_err)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(store_err)? {
            results.push(row_to_result(&row)?);
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Sync state
    // -----------------------------------------------------------------------

    /// Insert or replace the resume point of `state.source`.
    pub async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        self.check_writable()?;
        self.conn
            .execute(
                "INSERT INTO sync_state (source, last_sync_date, total_synced, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(source) DO UPDATE SET
                    last_sync_date = excluded.last_sync_date,
                    total_synced = excluded.total_synced,
                    updated_at = excluded.updated_at",
                params![
                    state.source.as_str(),
                    state.last_sync_date.to_string(),
                    state.total_synced as i64,
                    state.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(store_err)?;
        Ok(())
    }

    /// Get the resume point of a source, if it has ever synced.
    pub async fn get_sync_state(&self, source: &str) -> Result<Option<SyncState>> {
        self.check_open()?;
        let mut rows = self
            .conn
            .query(
                "SELECT source, last_sync_date, total_synced, updated_at
                 FROM sync_state WHERE source = ?1",
                params![source],
            )
            .await
            .map_err(store_err)?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(row_to_sync_state(&row)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(store_err(e)),
        }
    }
}

#[async_trait]
impl AuditStore for Storage {
    async fn append(&self, event: &StageEvent) -> Result<()> {
        self.append_event(event).await
    }

    async fn persist_result(&self, job_id: &JobId, result: &serde_json::Value) -> Result<()> {
        self.persist_job_result(job_id, result).await
    }
}

#[async_trait]
impl SyncStateStore for Storage {
    async fn get_sync_state(&self, source: &str) -> Result<Option<SyncState>> {
        Storage::get_sync_state(self, source).await
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        Storage::save_sync_state(self, state).await
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn parse_job_id(s: &str) -> Result<JobId> {
    s.parse()
        .map_err(|e| IngestflowError::StoreUnavailable(format!("invalid job id '{s}': {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| IngestflowError::StoreUnavailable(format!("invalid date: {e}")))
}

fn parse_json(s: &str) -> Result<serde_json::Value> {
    serde_json::from_str(s)
        .map_err(|e| IngestflowError::StoreUnavailable(format!("invalid JSON column: {e}")))
}

/// Convert a database row to a [`StageEvent`].
fn row_to_event(row: &libsql::Row) -> Result<StageEvent> {
    let status: String = row.get(2).map_err(store_err)?;
    Ok(StageEvent {
        job_id: parse_job_id(&row.get::<String>(0).map_err(store_err)?)?,
        stage: row.get::<String>(1).map_err(store_err)?,
        status: status
            .parse::<StageStatus>()
            .map_err(IngestflowError::StoreUnavailable)?,
        payload: parse_json(&row.get::<String>(3).map_err(store_err)?)?,
        source_id: row.get::<String>(4).ok(),
        timestamp: parse_timestamp(&row.get::<String>(5).map_err(store_err)?)?,
    })
}

/// Convert a database row to a [`JobResult`].
fn row_to_result(row: &libsql::Row) -> Result<JobResult> {
    Ok(JobResult {
        job_id: parse_job_id(&row.get::<String>(0).map_err(store_err)?)?,
        result: parse_json(&row.get::<String>(1).map_err(store_err)?)?,
        created_at: parse_timestamp(&row.get::<String>(2).map_err(store_err)?)?,
    })
}

fn row_to_sync_state(row: &libsql::Row) -> Result<SyncState> {
    let date: String = row.get(1).map_err(store_err)?;
    Ok(SyncState {
        source: row.get::<String>(0).map_err(store_err)?,
        last_sync_date: date
            .parse::<NaiveDate>()
            .map_err(|e| IngestflowError::StoreUnavailable(format!("invalid sync date '{date}': {e}")))?,
        total_synced: row.get::<i64>(2).map_err(store_err)?.max(0) as u64,
        updated_at: parse_timestamp(&row.get::<String>(3).map_err(store_err)?)?,
    })
}
