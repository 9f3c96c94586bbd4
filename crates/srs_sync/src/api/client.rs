//! Remote API client.
//!
//! Every call goes through the shared [`RateLimiter`], is retried under the
//! [`RetryPolicy`], and has its failures classified into [`ApiError`]. The
//! sticky health flags in the property store are updated here so that no
//! task has to remember to do it.

use std::sync::Arc;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::envelope::{self, Entity, Page};
use super::error::{ApiError, Result};
use crate::http::{HttpMethod, HttpRequest, HttpTransport};
use crate::properties::{self, PropertyKey};
use crate::rate_limit::RateLimiter;
use crate::retry::{RetryPolicy, call_with_retry};
use crate::settings::SyncSettings;

/// Outcome of a mutation call.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResponse {
    /// 2xx with a decoded JSON body.
    Accepted(Value),
    /// 422: the server refused this payload for good.
    Rejected,
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn HttpTransport>,
    limiter: RateLimiter,
    retry: RetryPolicy,
    settings: Arc<SyncSettings>,
    db: Arc<DatabaseConnection>,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        limiter: RateLimiter,
        settings: Arc<SyncSettings>,
        db: Arc<DatabaseConnection>,
    ) -> Self {
        Self {
            transport,
            limiter,
            retry: RetryPolicy::from_settings(&settings),
            settings,
            db,
        }
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Absolute URL for `path` with query parameters encoded.
    pub fn url(&self, path: &str, params: &[(&str, String)]) -> String {
        let resolved = self.settings.resolve(path);
        if params.is_empty() {
            return resolved;
        }
        match url::Url::parse(&resolved) {
            Ok(mut url) => {
                {
                    let mut pairs = url.query_pairs_mut();
                    for (name, value) in params {
                        pairs.append_pair(name, value);
                    }
                }
                url.to_string()
            }
            Err(_) => resolved,
        }
    }

    // ─── Typed calls ────────────────────────────────────────────────────────

    /// GET a report-style resource and decode its `data` member.
    pub async fn get_data<T: DeserializeOwned>(&self, uri: &str) -> Result<T> {
        let body = self.call(HttpMethod::Get, uri, None).await?;
        self.checked(envelope::decode_data(&body)).await
    }

    /// GET a single enveloped resource.
    pub async fn get_entity<T: DeserializeOwned>(&self, uri: &str) -> Result<Entity<T>> {
        let body = self.call(HttpMethod::Get, uri, None).await?;
        self.checked(envelope::decode_entity(&body)).await
    }

    /// Start walking a paged collection.
    pub fn collection<T: DeserializeOwned>(&self, uri: &str) -> CollectionPages<'_, T> {
        CollectionPages {
            client: self,
            next: Some(uri.to_string()),
            pages: 0,
            _marker: std::marker::PhantomData,
        }
    }

    /// POST or PUT a JSON body.
    pub async fn mutate<B: Serialize>(
        &self,
        method: HttpMethod,
        uri: &str,
        body: &B,
    ) -> Result<MutationResponse> {
        let payload = serde_json::to_vec(body)
            .map_err(|e| ApiError::payload_rejected(format!("unencodable body: {e}")))?;
        match self.call(method, uri, Some(payload)).await {
            Ok(value) => Ok(MutationResponse::Accepted(value)),
            Err(ApiError::PayloadRejected { message }) => {
                tracing::warn!(uri, %message, "Server rejected mutation, discarding");
                Ok(MutationResponse::Rejected)
            }
            Err(e) => Err(e),
        }
    }

    // ─── Plumbing ───────────────────────────────────────────────────────────

    async fn call(&self, method: HttpMethod, uri: &str, body: Option<Vec<u8>>) -> Result<Value> {
        call_with_retry(
            &self.retry,
            uri,
            || self.send_once(method, uri, body.clone()),
            || self.clear_error_flag(),
        )
        .await
    }

    async fn send_once(&self, method: HttpMethod, uri: &str, body: Option<Vec<u8>>) -> Result<Value> {
        let Some(key) = self.settings.api_key.as_deref().filter(|k| !k.is_empty()) else {
            return Err(ApiError::KeyMissing);
        };

        self.limiter.acquire().await;

        let url = self.settings.resolve(uri);
        let mut request = HttpRequest::new(method, &url)
            .header("Authorization", format!("Bearer {key}"))
            .header("Wanikani-Revision", self.settings.api_revision.as_str())
            .header("User-Agent", self.settings.user_agent.as_str());
        if let Some(body) = body {
            request = request
                .header("Content-Type", "application/json; charset=utf-8")
                .body(body);
        }

        tracing::debug!(method = %method, url = %url, "API request");
        let result = match self.transport.send(request).await {
            Ok(resp) if resp.is_success() => serde_json::from_slice::<Value>(&resp.body)
                .map_err(|e| ApiError::transient(format!("unparseable body: {e}"))),
            Ok(resp) => {
                tracing::info!(
                    method = %method,
                    url = %url,
                    status = resp.status,
                    body = %resp.body_preview(200),
                    "API call failed"
                );
                Err(self.classify_status(method, resp.status))
            }
            Err(e) => Err(ApiError::from(e)),
        };

        if let Err(err) = &result {
            self.record_failure(err).await;
        }
        result
    }

    fn classify_status(&self, method: HttpMethod, status: u16) -> ApiError {
        match status {
            401 => ApiError::CredentialRejected,
            429 => {
                self.limiter.pause();
                ApiError::RateLimited
            }
            422 if method.is_mutation() => ApiError::payload_rejected(format!("HTTP {status}")),
            _ => ApiError::transient(format!("HTTP {status}")),
        }
    }

    async fn checked<T>(&self, decoded: Result<T>) -> Result<T> {
        if let Err(err) = &decoded {
            self.record_failure(err).await;
        }
        decoded
    }

    async fn record_failure(&self, err: &ApiError) {
        let outcome = async {
            if matches!(err, ApiError::CredentialRejected) {
                properties::set_bool(&self.db, PropertyKey::ApiKeyRejected, true).await?;
            }
            if err.marks_api_error() {
                properties::set_bool(&self.db, PropertyKey::ApiInError, true).await?;
            }
            Ok::<_, sea_orm::DbErr>(())
        }
        .await;
        if let Err(e) = outcome {
            tracing::warn!(error = %e, "Failed to record API failure");
        }
    }

    async fn clear_error_flag(&self) {
        if let Err(e) = properties::set_bool(&self.db, PropertyKey::ApiInError, false).await {
            tracing::warn!(error = %e, "Failed to clear API error flag");
        }
    }
}

/// Cursor over the pages of a collection, following `pages.next_url`.
pub struct CollectionPages<'a, T> {
    client: &'a ApiClient,
    next: Option<String>,
    pages: usize,
    _marker: std::marker::PhantomData<T>,
}

impl<T: DeserializeOwned> CollectionPages<'_, T> {
    /// Fetch the next page, or `None` once the collection is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Page<T>>> {
        let Some(uri) = self.next.take() else {
            return Ok(None);
        };
        let body = self.client.call(HttpMethod::Get, &uri, None).await?;
        let page = self.client.checked(envelope::decode_page(&body)).await?;
        self.pages += 1;
        tracing::debug!(page = self.pages, items = page.items.len(), "Fetched collection page");
        self.next = page.next_url.clone();
        Ok(Some(page))
    }

    pub fn pages_fetched(&self) -> usize {
        self.pages
    }
}
