//! SQL migration definitions for the ingestflow database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
        description: "Initial schema: stage_events, job_results",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Append-only audit trail of stage transitions
CREATE TABLE IF NOT EXISTS stage_events (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    job_id     TEXT NOT NULL,
    stage      TEXT NOT NULL,
    status     TEXT NOT NULL CHECK (status IN ('started', 'succeeded', 'failed')),
    payload    TEXT NOT NULL,
    source_id  TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_stage_events_job ON stage_events(job_id);
CREATE INDEX IF NOT EXISTS idx_stage_events_source ON stage_events(source_id);

-- Final job results; one row per job, never updated
CREATE TABLE IF NOT EXISTS job_results (
    job_id     TEXT PRIMARY KEY,
    result     TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_job_results_created ON job_results(created_at);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
        },
        Migration {
            version: 2,
            description: "Sync state for date-range ingestion",
            sql: r#"
-- Resume point per source; one row per source, upserted after each day
CREATE TABLE IF NOT EXISTS sync_state (
    source         TEXT PRIMARY KEY,
    last_sync_date TEXT NOT NULL,
    total_synced   INTEGER NOT NULL DEFAULT 0,
    updated_at     TEXT NOT NULL
);

INSERT INTO schema_migrations (version) VALUES (2);
"#,
        },
    ]
}
