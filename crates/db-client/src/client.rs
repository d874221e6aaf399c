//! Building database API client.
//!
//! Talks to the `/airtable/buildings/*` endpoints of the database service:
//! the incremental change feed and the single-record write endpoints.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::{debug, warn};
use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde_json::Value;
use tokio::time::sleep;

use sheetsync_core::sync::{
    ApiCallResult, BuildingApiTrait, CellValue, ChangeBatch, ChangeFeedTrait, FieldAssignment,
    IngestResponse, SyncRetryClass,
};

use crate::error::{DbClientError, Result};
use crate::types::*;

/// Default timeout for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const MAX_LOG_BODY_CHARS: usize = 512;
const CHANGES_MAX_ATTEMPTS: usize = 3;
const CHANGES_BASE_BACKOFF_MS: u64 = 250;
const CHANGES_MAX_BACKOFF_MS: u64 = 4_000;

const BUILDINGS_PATH: &str = "airtable/buildings";

fn changes_backoff_with_jitter(attempt: usize) -> Duration {
    let exp = (attempt.saturating_sub(1) as u32).min(8);
    let backoff =
        (CHANGES_BASE_BACKOFF_MS.saturating_mul(1_u64 << exp)).min(CHANGES_MAX_BACKOFF_MS);
    let jitter = rand::thread_rng().gen_range(0..=(backoff / 5).max(1));
    Duration::from_millis(backoff.saturating_add(jitter))
}

/// Client for the building database API.
#[derive(Debug, Clone)]
pub struct BuildingDbClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    retry_backoff: bool,
}

impl BuildingDbClient {
    fn log_response(status: reqwest::StatusCode, body: &str) {
        if status.is_success() {
            debug!("API response status: {}", status);
            return;
        }

        let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
        if body.chars().count() > MAX_LOG_BODY_CHARS {
            preview.push_str("...");
        }
        debug!("API response error ({}): {}", status, preview);
    }

    /// Create a new client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the database API (e.g., "https://db.example.com")
    /// * `token` - Optional bearer token sent on every request
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/');
        if base_url.is_empty() {
            return Err(DbClientError::invalid_request("database API URL is empty"));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.to_string(),
            token: token.filter(|value| !value.trim().is_empty()),
            retry_backoff: true,
        })
    }

    /// Disables the sleep between change feed attempts.
    pub fn without_retry_backoff(mut self) -> Self {
        self.retry_backoff = false;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.base_url, BUILDINGS_PATH, endpoint)
    }

    /// Create headers for an API request.
    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if let Some(token) = &self.token {
            let auth_value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| DbClientError::invalid_request("Invalid API token format"))?;
            headers.insert(AUTHORIZATION, auth_value);
        }

        Ok(headers)
    }

    /// Read the body and turn non-success statuses into API errors.
    async fn read_body(response: reqwest::Response) -> Result<(u16, String)> {
        let status = response.status();
        let body = response.text().await?;
        Self::log_response(status, &body);

        if !status.is_success() {
            let message = serde_json::from_str::<ApiErrorResponse>(&body)
                .ok()
                .and_then(|error| error.describe())
                .unwrap_or_else(|| format!("Request failed: {}", body));
            return Err(DbClientError::api(status.as_u16(), message));
        }

        Ok((status.as_u16(), body))
    }

    /// Parse a JSON response body.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T> {
        let (status, body) = Self::read_body(response).await?;
        serde_json::from_str(&body).map_err(|e| {
            log::error!(
                "Failed to deserialize response. Body: {}, Error: {}",
                body,
                e
            );
            DbClientError::invalid_response(format!(
                "Failed to parse response ({}): {}",
                status, e
            ))
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, endpoint: &str, body: &B) -> Result<ApiCallResult> {
        let url = self.url(endpoint);
        debug!("POST {}", url);

        let response = self
            .client
            .post(&url)
            .headers(self.headers()?)
            .json(body)
            .send()
            .await?;

        let (status, body) = Self::read_body(response).await?;
        let body = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
        Ok(ApiCallResult { status, body })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Change feed
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch one change window.
    ///
    /// GET /airtable/buildings/changes?since={rfc3339}
    pub async fn get_changes(&self, since: DateTime<Utc>) -> Result<ChangeBatch> {
        let since = since.to_rfc3339_opts(SecondsFormat::Millis, true);
        let url = format!(
            "{}?since={}",
            self.url("changes"),
            urlencoding::encode(&since)
        );
        debug!("Fetching changes: {}", url);

        let response = self
            .client
            .get(&url)
            .headers(self.headers()?)
            .send()
            .await?;

        Self::parse_response::<ChangesResponse>(response)
            .await?
            .into_batch()
    }

    /// [`Self::get_changes`] with retries on transport errors and retryable statuses.
    pub async fn get_changes_with_retry(&self, since: DateTime<Utc>) -> Result<ChangeBatch> {
        let mut attempt = 1;
        loop {
            match self.get_changes(since).await {
                Ok(batch) => return Ok(batch),
                Err(err)
                    if attempt < CHANGES_MAX_ATTEMPTS
                        && err.retry_class() == SyncRetryClass::Retryable =>
                {
                    let delay = changes_backoff_with_jitter(attempt);
                    warn!(
                        "Change feed attempt {}/{} failed ({}); retrying in {}ms",
                        attempt,
                        CHANGES_MAX_ATTEMPTS,
                        err,
                        delay.as_millis()
                    );
                    if self.retry_backoff {
                        sleep(delay).await;
                    }
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Record writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest a new building.
    ///
    /// POST /airtable/buildings/ingest
    pub async fn ingest(&self, fields: &FieldAssignment) -> Result<IngestResponse> {
        let result = self.post("ingest", &FieldsRequest { fields }).await?;
        let body: IngestResponseBody = serde_json::from_value(result.body).unwrap_or_default();
        Ok(IngestResponse {
            status: result.status,
            building_id: body.building_id(),
            address_normalized: body.address_normalized,
        })
    }

    /// Update an existing building.
    ///
    /// POST /airtable/buildings/update
    pub async fn update(&self, fields: &FieldAssignment) -> Result<ApiCallResult> {
        self.post("update", &FieldsRequest { fields }).await
    }

    /// Soft delete a building.
    ///
    /// POST /airtable/buildings/delete
    pub async fn soft_delete(&self, building_id: &CellValue) -> Result<ApiCallResult> {
        self.post("delete", &BuildingIdRequest { building_id }).await
    }

    /// Restore a soft-deleted building.
    ///
    /// POST /airtable/buildings/restore
    pub async fn restore(&self, building_id: &CellValue) -> Result<ApiCallResult> {
        self.post("restore", &BuildingIdRequest { building_id })
            .await
    }
}

#[async_trait]
impl ChangeFeedTrait for BuildingDbClient {
    async fn fetch_changes(&self, since: DateTime<Utc>) -> sheetsync_core::Result<ChangeBatch> {
        Ok(self.get_changes_with_retry(since).await?)
    }
}

#[async_trait]
impl BuildingApiTrait for BuildingDbClient {
    async fn ingest_building(
        &self,
        fields: FieldAssignment,
    ) -> sheetsync_core::Result<IngestResponse> {
        Ok(self.ingest(&fields).await?)
    }

    async fn update_building(
        &self,
        fields: FieldAssignment,
    ) -> sheetsync_core::Result<ApiCallResult> {
        Ok(self.update(&fields).await?)
    }

    async fn delete_building(
        &self,
        building_id: CellValue,
    ) -> sheetsync_core::Result<ApiCallResult> {
        Ok(self.soft_delete(&building_id).await?)
    }

    async fn restore_building(
        &self,
        building_id: CellValue,
    ) -> sheetsync_core::Result<ApiCallResult> {
        Ok(self.restore(&building_id).await?)
    }
}
