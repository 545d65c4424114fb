//! Content management API client
//!
//! Talks to `/spaces/{space}/environments/{env}` with a bearer token.
//! Requests are spaced by a rate limiter and retried on HTTP 429.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use exmig_common::config::TargetConfig;

use super::{AssetRecord, Collection, EntryQuery, EntryRecord, Fields, TargetError, TargetStore};

const CONTENT_TYPE: &str = "application/vnd.contentful.management.v1+json";
const USER_AGENT: &str = concat!("exmig/", env!("CARGO_PKG_VERSION"));
/// Management API allowance per space
const REQUESTS_PER_SECOND: u32 = 7;
const MAX_RETRIES: u32 = 5;
const PROCESS_POLL_MS: u64 = 500;
const PROCESS_POLL_ATTEMPTS: u32 = 30;

/// Direct (unkeyed) request limiter shared by every call of one client
type RequestLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

fn request_limiter(quota: Quota) -> Arc<RequestLimiter> {
    Arc::new(RateLimiter::direct(quota))
}

/// Management API client
pub struct ContentfulClient {
    http_client: reqwest::Client,
    base_url: String,
    access_token: String,
    /// `None` disables spacing (mock servers in tests)
    rate_limiter: Option<Arc<RequestLimiter>>,
    poll_interval: Duration,
}

impl ContentfulClient {
    /// Client for the space and environment named in `config`
    pub fn new(config: &TargetConfig) -> exmig_common::Result<Self> {
        let (access_token, space_id) = config.require_credentials()?;
        let base_url = format!(
            "{}/spaces/{}/environments/{}",
            config.api_url.trim_end_matches('/'),
            space_id,
            config.environment_id
        );
        Self::with_base_url(base_url, access_token)
            .map_err(|e| exmig_common::Error::Config(e.to_string()))
    }

    /// Client rooted at an explicit environment URL
    pub fn with_base_url(
        base_url: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self, TargetError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| TargetError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            access_token: access_token.into(),
            rate_limiter: Some(request_limiter(Quota::per_second(
                NonZeroU32::new(REQUESTS_PER_SECOND).expect("request rate is non-zero"),
            ))),
            poll_interval: Duration::from_millis(PROCESS_POLL_MS),
        })
    }

    /// Override request spacing and asset poll interval
    ///
    /// A zero `min_request_gap` turns rate limiting off.
    pub fn with_intervals(mut self, min_request_gap: Duration, poll_interval: Duration) -> Self {
        self.rate_limiter = Quota::with_period(min_request_gap).map(request_limiter);
        self.poll_interval = poll_interval;
        self
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}{}", self.base_url, path))
            .bearer_auth(&self.access_token)
            .header(reqwest::header::CONTENT_TYPE, CONTENT_TYPE)
    }

    /// Send a request, retrying with backoff while the API reports 429
    async fn send<F>(&self, path: &str, build: F) -> Result<reqwest::Response, TargetError>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = Duration::from_millis(500);
        let mut attempt = 0;

        loop {
            attempt += 1;
            if let Some(limiter) = &self.rate_limiter {
                limiter.until_ready().await;
            }

            let response = build()
                .send()
                .await
                .map_err(|e| TargetError::Network(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS && attempt <= MAX_RETRIES {
                let wait = retry_after(&response).unwrap_or(backoff);
                tracing::debug!(path, attempt, ?wait, "Rate limited by API, retrying");
                tokio::time::sleep(wait).await;
                backoff = (backoff * 2).min(Duration::from_secs(10));
                continue;
            }

            if status == StatusCode::NOT_FOUND {
                return Err(TargetError::NotFound(path.to_string()));
            }
            if status == StatusCode::CONFLICT {
                return Err(TargetError::VersionConflict(path.to_string()));
            }
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(TargetError::Api {
                    status: status.as_u16(),
                    message,
                });
            }

            return Ok(response);
        }
    }

    async fn send_json<T, F>(&self, path: &str, build: F) -> Result<T, TargetError>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        self.send(path, build)
            .await?
            .json()
            .await
            .map_err(|e| TargetError::Parse(e.to_string()))
    }

    async fn versioned<T>(&self, method: Method, path: &str, version: u64, body: Option<&Value>) -> Result<T, TargetError>
    where
        T: DeserializeOwned,
    {
        self.send_json(path, || {
            let request = self
                .request(method.clone(), path)
                .header("X-Contentful-Version", version);
            match body {
                Some(body) => request.json(body),
                None => request,
            }
        })
        .await
    }

    async fn versioned_delete(&self, path: &str, version: u64) -> Result<(), TargetError> {
        self.send(path, || {
            self.request(Method::DELETE, path)
                .header("X-Contentful-Version", version)
        })
        .await
        .map(|_| ())
    }
}

/// Seconds until the API accepts requests again, when it says so
fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    let headers = response.headers();
    headers
        .get("X-Contentful-RateLimit-Reset")
        .or_else(|| headers.get(reqwest::header::RETRY_AFTER))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn query_pairs(query: &EntryQuery) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    if let Some(ct) = &query.content_type {
        pairs.push(("content_type".to_string(), ct.clone()));
    }
    if let Some(id) = &query.links_to_entry {
        pairs.push(("links_to_entry".to_string(), id.clone()));
    }
    if let Some(id) = &query.links_to_asset {
        pairs.push(("links_to_asset".to_string(), id.clone()));
    }
    if let Some(identifier) = &query.identifier {
        pairs.push(("fields.identifier".to_string(), identifier.clone()));
    }
    if !query.ids.is_empty() {
        pairs.push(("sys.id[in]".to_string(), query.ids.join(",")));
    }
    pairs.push(("skip".to_string(), query.skip.to_string()));
    pairs.push(("limit".to_string(), query.limit.to_string()));
    pairs
}

#[async_trait]
impl TargetStore for ContentfulClient {
    async fn create_entry(&self, content_type: &str, fields: Fields) -> Result<EntryRecord, TargetError> {
        let body = json!({ "fields": fields });
        tracing::debug!(content_type, "Creating entry");
        self.send_json("/entries", || {
            self.request(Method::POST, "/entries")
                .header("X-Contentful-Content-Type", content_type)
                .json(&body)
        })
        .await
    }

    async fn get_entry(&self, id: &str) -> Result<EntryRecord, TargetError> {
        let path = format!("/entries/{}", id);
        self.send_json(&path, || self.request(Method::GET, &path)).await
    }

    async fn update_entry(&self, entry: &EntryRecord) -> Result<EntryRecord, TargetError> {
        let path = format!("/entries/{}", entry.id());
        let body = json!({ "fields": entry.fields });
        self.versioned(Method::PUT, &path, entry.sys.version, Some(&body)).await
    }

    async fn publish_entry(&self, entry: &EntryRecord) -> Result<EntryRecord, TargetError> {
        let path = format!("/entries/{}/published", entry.id());
        self.versioned(Method::PUT, &path, entry.sys.version, None).await
    }

    async fn unpublish_entry(&self, entry: &EntryRecord) -> Result<EntryRecord, TargetError> {
        let path = format!("/entries/{}/published", entry.id());
        self.versioned(Method::DELETE, &path, entry.sys.version, None).await
    }

    async fn delete_entry(&self, entry: &EntryRecord) -> Result<(), TargetError> {
        let path = format!("/entries/{}", entry.id());
        self.versioned_delete(&path, entry.sys.version).await
    }

    async fn entries(&self, query: &EntryQuery) -> Result<Collection<EntryRecord>, TargetError> {
        let pairs = query_pairs(query);
        self.send_json("/entries", || self.request(Method::GET, "/entries").query(&pairs))
            .await
    }

    async fn create_asset_with_id(&self, id: &str, fields: Fields) -> Result<AssetRecord, TargetError> {
        let path = format!("/assets/{}", id);
        let body = json!({ "fields": fields });
        self.send_json(&path, || self.request(Method::PUT, &path).json(&body))
            .await
    }

    async fn process_asset(&self, asset: &AssetRecord, locale: &str) -> Result<AssetRecord, TargetError> {
        let path = format!("/assets/{}/files/{}/process", asset.id(), locale);
        self.send(&path, || {
            self.request(Method::PUT, &path)
                .header("X-Contentful-Version", asset.sys.version)
        })
        .await?;

        // Processing is asynchronous on the platform side
        for _ in 0..PROCESS_POLL_ATTEMPTS {
            let current = self.get_asset(asset.id()).await?;
            if current.file_url(locale).is_some() {
                return Ok(current);
            }
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(TargetError::Api {
            status: 0,
            message: format!("Asset {} not processed for {} in time", asset.id(), locale),
        })
    }

    async fn get_asset(&self, id: &str) -> Result<AssetRecord, TargetError> {
        let path = format!("/assets/{}", id);
        self.send_json(&path, || self.request(Method::GET, &path)).await
    }

    async fn publish_asset(&self, asset: &AssetRecord) -> Result<AssetRecord, TargetError> {
        let path = format!("/assets/{}/published", asset.id());
        self.versioned(Method::PUT, &path, asset.sys.version, None).await
    }

    async fn unpublish_asset(&self, asset: &AssetRecord) -> Result<AssetRecord, TargetError> {
        let path = format!("/assets/{}/published", asset.id());
        self.versioned(Method::DELETE, &path, asset.sys.version, None).await
    }

    async fn delete_asset(&self, asset: &AssetRecord) -> Result<(), TargetError> {
        let path = format!("/assets/{}", asset.id());
        self.versioned_delete(&path, asset.sys.version).await
    }

    async fn assets(&self, skip: usize, limit: usize) -> Result<Collection<AssetRecord>, TargetError> {
        let pairs = [("skip", skip.to_string()), ("limit", limit.to_string())];
        self.send_json("/assets", || self.request(Method::GET, "/assets").query(&pairs))
            .await
    }
}
