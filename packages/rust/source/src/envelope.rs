//! Wire shapes of the lifelog list endpoint.
//!
//! ```json
//! {
//!   "data": { "lifelogs": [ { "id": "...", "title": "...", "markdown": "...", ... } ] },
//!   "meta": { "lifelogs": { "nextCursor": "...", "count": 3 } }
//! }
//! ```

use chrono::{DateTime, Utc};
use ingestflow_shared::SourceRecord;
use serde::Deserialize;

/// Title used when the provider omits one.
pub(crate) const UNTITLED: &str = "Untitled";

#[derive(Debug, Deserialize)]
pub(crate) struct ListEnvelope {
    pub data: ListData,
    #[serde(default)]
    pub meta: Option<ListMeta>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListData {
    #[serde(default)]
    pub lifelogs: Vec<Lifelog>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ListMeta {
    #[serde(default)]
    pub lifelogs: Option<PageMeta>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageMeta {
    #[serde(default)]
    pub next_cursor: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    pub count: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct Lifelog {
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub markdown: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_starred: bool,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl ListEnvelope {
    /// Cursor of the next page, if the provider reports one.
    pub fn next_cursor(&self) -> Option<&str> {
        self.meta
            .as_ref()
            .and_then(|m| m.lifelogs.as_ref())
            .and_then(|p| p.next_cursor.as_deref())
            .filter(|c| !c.is_empty())
    }
}

impl From<Lifelog> for SourceRecord {
    fn from(log: Lifelog) -> Self {
        Self {
            id: log.id,
            title: log
                .title
                .filter(|t| !t.trim().is_empty())
                .unwrap_or_else(|| UNTITLED.to_string()),
            content: log.markdown.unwrap_or_default(),
            start_time: log.start_time,
            end_time: log.end_time,
            is_starred: log.is_starred,
            updated_at: log.updated_at,
        }
    }
}
