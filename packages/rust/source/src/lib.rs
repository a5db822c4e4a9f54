//! HTTP source fetcher for the lifelog API.
//!
//! [`LifelogClient`] implements [`SourceFetcher`]: it lists the lifelogs of one
//! date window, following the provider's cursor until the batch limit is
//! reached, and maps each entry to a [`SourceRecord`]. Every transport or
//! decoding failure surfaces as [`IngestflowError::SourceUnavailable`].

mod envelope;

use std::time::Duration;

use async_trait::async_trait;
use ingestflow_shared::{
    IngestflowError, IngestionBatch, Result, SourceConfig, SourceFetcher, SourceRecord,
};
use reqwest::Client;
use tracing::{debug, info, instrument};
use url::Url;

use envelope::ListEnvelope;

/// Header carrying the API credential.
const API_KEY_HEADER: &str = "X-API-Key";

/// User-Agent string for source requests.
const USER_AGENT: &str = concat!("ingestflow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// LifelogClient
// ---------------------------------------------------------------------------

/// Client for `GET {base_url}/v1/lifelogs`.
#[derive(Debug, Clone)]
pub struct LifelogClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    page_size: u32,
    include_markdown: bool,
    include_headings: bool,
}

impl LifelogClient {
    /// Build a client from the `[source]` config section and a resolved API key.
    pub fn new(config: &SourceConfig, api_key: impl Into<String>) -> Result<Self> {
        let base = config.base_url()?;
        let endpoint = Url::parse(&format!(
            "{}/v1/lifelogs",
            base.as_str().trim_end_matches('/')
        ))
        .map_err(|e| IngestflowError::config(format!("invalid source endpoint: {e}")))?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| {
                IngestflowError::SourceUnavailable(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            page_size: config.page_size.max(1),
            include_markdown: config.include_markdown,
            include_headings: config.include_headings,
        })
    }

    /// Fetch one page of at most `page_limit` records.
    async fn fetch_page(
        &self,
        batch: &IngestionBatch,
        page_limit: u32,
        cursor: Option<&str>,
    ) -> Result<ListEnvelope> {
        let mut query = vec![
            ("date", batch.date.format("%Y-%m-%d").to_string()),
            ("timezone", batch.timezone.clone()),
            ("limit", page_limit.to_string()),
            ("includeMarkdown", self.include_markdown.to_string()),
            ("includeHeadings", self.include_headings.to_string()),
        ];
        if let Some(cursor) = cursor {
            query.push(("cursor", cursor.to_string()));
        }

        let response = self
            .client
            .get(self.endpoint.clone())
            .header(API_KEY_HEADER, &self.api_key)
            .query(&query)
            .send()
            .await
            .map_err(|e| IngestflowError::SourceUnavailable(format!("{}: {e}", self.endpoint)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestflowError::SourceUnavailable(format!(
                "{}: HTTP {status}",
                self.endpoint
            )));
        }

        response.json::<ListEnvelope>().await.map_err(|e| {
            IngestflowError::SourceUnavailable(format!("{}: malformed response: {e}", self.endpoint))
        })
    }
}

#[async_trait]
impl SourceFetcher for LifelogClient {
    #[instrument(skip_all, fields(date = %batch.date, timezone = %batch.timezone, limit = batch.limit))]
    async fn fetch_batch(&self, batch: &IngestionBatch) -> Result<Vec<SourceRecord>> {
        if batch.timezone.trim().is_empty() {
            return Err(IngestflowError::validation(
                "fetch_batch",
                "timezone must not be empty",
            ));
        }
        if batch.limit == 0 {
            return Ok(Vec::new());
        }

        let mut records: Vec<SourceRecord> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let remaining = batch.limit - records.len() as u32;
            let page_limit = remaining.min(self.page_size);
            let page = self.fetch_page(batch, page_limit, cursor.as_deref()).await?;

            let next = page.next_cursor().map(str::to_string);
            let fetched = page.data.lifelogs.len();
            debug!(fetched, has_more = next.is_some(), "fetched page");

            records.extend(page.data.lifelogs.into_iter().map(SourceRecord::from));

            if fetched == 0 || records.len() as u32 >= batch.limit {
                break;
            }
            match next {
                Some(c) => cursor = Some(c),
                None => break,
            }
        }

        records.truncate(batch.limit as usize);
        info!(count = records.len(), "fetched source batch");
        Ok(records)
    }
}
