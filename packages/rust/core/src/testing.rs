//! Fakes shared by the executor and scheduler tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use ingestflow_registry::{Contract, FnTool, Params, ToolDescriptor, ToolRegistry};
use ingestflow_shared::{
    AuditStore, IngestflowError, IngestionBatch, JobId, Result, SourceFetcher, SourceRecord,
    StageEvent, SyncState, SyncStateStore, ToolFailure,
};
use serde_json::{Value, json};

pub(crate) fn stages(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn text_contract() -> Contract {
    Contract::object().field("text", Contract::String).into()
}

fn text_of(input: &Value) -> &str {
    input["text"].as_str().unwrap_or_default()
}

/// Registry with `upper`, `fail`, `fail_on_bad`, `length`, `count_words`
/// and a call-counting `counter`.
pub(crate) fn registry_with_counter() -> (ToolRegistry, Arc<AtomicUsize>) {
    let mut registry = ToolRegistry::new();

    registry
        .register(
            ToolDescriptor::new("upper", "1.0")
                .input(text_contract())
                .output(text_contract()),
            FnTool::new(|input: &Value, _: &Params| {
                Ok(json!({ "text": text_of(input).to_uppercase() }))
            }),
        )
        .expect("register upper");

    registry
        .register(
            ToolDescriptor::new("fail", "1.0"),
            FnTool::new(|_: &Value, _: &Params| Err(ToolFailure::failed("always fails"))),
        )
        .expect("register fail");

    registry
        .register(
            ToolDescriptor::new("fail_on_bad", "1.0").input(text_contract()),
            FnTool::new(|input: &Value, _: &Params| {
                if text_of(input).contains("bad") {
                    Err(ToolFailure::failed("refusing bad record"))
                } else {
                    Ok(json!({ "checked": true }))
                }
            }),
        )
        .expect("register fail_on_bad");

    registry
        .register(
            ToolDescriptor::new("length", "1.0").input(text_contract()),
            FnTool::new(|input: &Value, _: &Params| Ok(json!({ "length": text_of(input).len() }))),
        )
        .expect("register length");

    registry
        .register(
            ToolDescriptor::new("count_words", "1.0").output(Contract::Integer),
            FnTool::new(|input: &Value, _: &Params| {
                Ok(json!(text_of(input).split_whitespace().count()))
            }),
        )
        .expect("register count_words");

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    registry
        .register(
            ToolDescriptor::new("counter", "1.0"),
            FnTool::new(move |_: &Value, _: &Params| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(json!({ "counted": true }))
            }),
        )
        .expect("register counter");

    (registry, calls)
}

pub(crate) fn test_registry() -> ToolRegistry {
    registry_with_counter().0
}

// ---------------------------------------------------------------------------
// RecordingStore
// ---------------------------------------------------------------------------

/// In-memory [`AuditStore`] that can be told to fail.
#[derive(Default)]
pub(crate) struct RecordingStore {
    events: Mutex<Vec<StageEvent>>,
    results: Mutex<HashMap<JobId, Value>>,
    fail_append: bool,
    fail_persist: bool,
    /// Fail appends of events with this stage name only.
    fail_append_stage: Option<String>,
}

impl RecordingStore {
    pub fn failing_persist() -> Self {
        Self {
            fail_persist: true,
            ..Self::default()
        }
    }

    pub fn failing_append() -> Self {
        Self {
            fail_append: true,
            ..Self::default()
        }
    }

    pub fn failing_append_for(stage: &str) -> Self {
        Self {
            fail_append_stage: Some(stage.to_string()),
            ..Self::default()
        }
    }

    pub fn events(&self) -> Vec<StageEvent> {
        self.events.lock().unwrap().clone()
    }

    /// `stage/status` strings of one job, in append order.
    pub fn trail(&self, job_id: &JobId) -> Vec<String> {
        self.events()
            .iter()
            .filter(|e| &e.job_id == job_id)
            .map(|e| format!("{}/{}", e.stage, e.status))
            .collect()
    }

    pub fn result_for(&self, job_id: &JobId) -> Option<Value> {
        self.results.lock().unwrap().get(job_id).cloned()
    }

    pub fn result_count(&self) -> usize {
        self.results.lock().unwrap().len()
    }
}

#[async_trait]
impl AuditStore for RecordingStore {
    async fn append(&self, event: &StageEvent) -> Result<()> {
        if self.fail_append || self.fail_append_stage.as_deref() == Some(event.stage.as_str()) {
            return Err(IngestflowError::StoreUnavailable("append refused".into()));
        }
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn persist_result(&self, job_id: &JobId, result: &Value) -> Result<()> {
        if self.fail_persist {
            return Err(IngestflowError::StoreUnavailable("persist refused".into()));
        }
        self.results
            .lock()
            .unwrap()
            .insert(job_id.clone(), result.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FakeFetcher
// ---------------------------------------------------------------------------

/// [`SourceFetcher`] returning canned records, or failing.
pub(crate) struct FakeFetcher {
    records: Vec<SourceRecord>,
    fail: bool,
    failing_dates: Vec<NaiveDate>,
    pub requests: Mutex<Vec<IngestionBatch>>,
}

impl FakeFetcher {
    pub fn with_contents(contents: &[&str]) -> Self {
        let records = contents
            .iter()
            .enumerate()
            .map(|(i, content)| SourceRecord {
                id: format!("rec-{}", i + 1),
                title: format!("Record {}", i + 1),
                content: content.to_string(),
                start_time: None,
                end_time: None,
                is_starred: false,
                updated_at: None,
            })
            .collect();
        Self {
            records,
            fail: false,
            failing_dates: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            records: Vec::new(),
            fail: true,
            failing_dates: Vec::new(),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Fail only batches for `date`.
    pub fn failing_on(mut self, date: NaiveDate) -> Self {
        self.failing_dates.push(date);
        self
    }

    pub fn requested_dates(&self) -> Vec<NaiveDate> {
        self.requests.lock().unwrap().iter().map(|b| b.date).collect()
    }
}

#[async_trait]
impl SourceFetcher for FakeFetcher {
    async fn fetch_batch(&self, batch: &IngestionBatch) -> Result<Vec<SourceRecord>> {
        self.requests.lock().unwrap().push(batch.clone());
        if self.fail || self.failing_dates.contains(&batch.date) {
            return Err(IngestflowError::SourceUnavailable("connection refused".into()));
        }
        Ok(self
            .records
            .iter()
            .take(batch.limit as usize)
            .cloned()
            .collect())
    }
}

// ---------------------------------------------------------------------------
// MemorySyncState
// ---------------------------------------------------------------------------

/// In-memory [`SyncStateStore`].
#[derive(Default)]
pub(crate) struct MemorySyncState {
    states: Mutex<HashMap<String, SyncState>>,
    fail_save: bool,
}

impl MemorySyncState {
    pub fn failing_save() -> Self {
        Self {
            fail_save: true,
            ..Self::default()
        }
    }

    pub fn seeded(state: SyncState) -> Self {
        let store = Self::default();
        store
            .states
            .lock()
            .unwrap()
            .insert(state.source.clone(), state);
        store
    }

    pub fn get(&self, source: &str) -> Option<SyncState> {
        self.states.lock().unwrap().get(source).cloned()
    }
}

#[async_trait]
impl SyncStateStore for MemorySyncState {
    async fn get_sync_state(&self, source: &str) -> Result<Option<SyncState>> {
        Ok(self.get(source))
    }

    async fn save_sync_state(&self, state: &SyncState) -> Result<()> {
        if self.fail_save {
            return Err(IngestflowError::StoreUnavailable("save refused".into()));
        }
        self.states
            .lock()
            .unwrap()
            .insert(state.source.clone(), state.clone());
        Ok(())
    }
}
