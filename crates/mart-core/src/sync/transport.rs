//! How a replica reaches the upstream service.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{upstream, ChangeSet, ChangesQuery, SyncError, SyncResult, UploadBatch};
use crate::services::DatabaseService;
use crate::util::{compact_text, is_http_url, normalize_text_option};

/// The two calls a sync cycle makes against upstream.
#[async_trait]
pub trait UpstreamTransport: Send + Sync {
    /// Deliver one batch. `Ok` means every row was acknowledged.
    async fn upload(&self, batch: &UploadBatch) -> SyncResult<()>;

    /// Pull rows changed since the query's watermark.
    async fn changes(&self, query: &ChangesQuery) -> SyncResult<ChangeSet>;
}

/// HTTP client for the upstream sync endpoints.
#[derive(Debug, Clone)]
pub struct HttpUpstream {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> SyncResult<Self> {
        let base_url = normalize_endpoint(base_url.into())?;
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl UpstreamTransport for HttpUpstream {
    async fn upload(&self, batch: &UploadBatch) -> SyncResult<()> {
        let response = self
            .client
            .post(self.url("/api/sync/upload"))
            .header(reqwest::header::ACCEPT, "application/json")
            .json(batch)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api(parse_api_error(status, &body)));
        }
        Ok(())
    }

    async fn changes(&self, query: &ChangesQuery) -> SyncResult<ChangeSet> {
        let response = self
            .client
            .get(self.url("/api/sync/changes"))
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query.to_pairs())
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::info!(upstream = %self.base_url, "Upstream changes endpoint not ready");
            return Ok(ChangeSet::default());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::Api(parse_api_error(status, &body)));
        }

        Ok(response.json::<ChangeSet>().await?)
    }
}

/// Upstream living in this process, backed by its own store.
#[derive(Clone)]
pub struct LocalUpstream {
    store: DatabaseService,
}

impl LocalUpstream {
    pub const fn new(store: DatabaseService) -> Self {
        Self { store }
    }

    pub const fn store(&self) -> &DatabaseService {
        &self.store
    }
}

#[async_trait]
impl UpstreamTransport for LocalUpstream {
    async fn upload(&self, batch: &UploadBatch) -> SyncResult<()> {
        upstream::ingest(&self.store, batch.clone()).await?;
        Ok(())
    }

    async fn changes(&self, query: &ChangesQuery) -> SyncResult<ChangeSet> {
        Ok(upstream::changes(&self.store, query).await?)
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.error.or(payload.message) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", trimmed, status.as_u16())
    }
}

fn normalize_endpoint(raw: String) -> SyncResult<String> {
    let endpoint = normalize_text_option(Some(raw)).ok_or_else(|| {
        SyncError::InvalidConfiguration("upstream URL must not be empty".to_string())
    })?;
    if is_http_url(&endpoint) {
        Ok(endpoint.trim_end_matches('/').to_string())
    } else {
        Err(SyncError::InvalidConfiguration(
            "upstream URL must include http:// or https://".to_string(),
        ))
    }
}
