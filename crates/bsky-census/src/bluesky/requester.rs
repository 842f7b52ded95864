//! Authenticated GET calls with a uniform retry policy.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::types::{Endpoint, Page};
use crate::auth::SessionManager;
use crate::error::RequestError;

/// Scope of the rate-limit attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffScope {
    /// One counter for the whole run; repeated limiting escalates across calls.
    #[default]
    Run,
    /// Counter restarts for every call (consecutive 429s of that call).
    PerCall,
}

/// Exponential backoff applied to 429 responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffPolicy {
    /// Wait for exponent zero.
    pub base: Duration,
    /// Upper bound on any single wait.
    pub cap: Duration,
    /// 429 retries allowed within one call before giving up.
    pub max_retries: u32,
    /// Counter scope.
    pub scope: BackoffScope,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            cap: Duration::from_secs(300),
            max_retries: 12,
            scope: BackoffScope::Run,
        }
    }
}

impl BackoffPolicy {
    /// `min(base * 2^(attempt mod 4), cap)`.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << (attempt % 4);
        self.base.saturating_mul(factor).min(self.cap)
    }
}

/// Counters exposed by a page source for run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceTelemetry {
    /// HTTP requests issued, retries included.
    pub http_requests: u64,
    /// Backoff sleeps taken after 429 responses.
    pub rate_limit_waits: u64,
    /// Successful token refreshes.
    pub token_renewals: u64,
}

/// Anything that can return pages of an endpoint.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch one page.
    async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<Page, RequestError>;

    /// Current counters.
    fn telemetry(&self) -> SourceTelemetry {
        SourceTelemetry::default()
    }
}

/// Issues calls through the session manager, handling 429/401/403.
pub struct RateLimitedRequester {
    client: Client,
    base_url: String,
    session: Arc<SessionManager>,
    policy: BackoffPolicy,
    cancel: CancellationToken,
    rate_limit_attempts: AtomicU32,
    http_requests: AtomicU64,
    rate_limit_waits: AtomicU64,
}

impl RateLimitedRequester {
    /// Create a requester sharing the manager's live credential.
    #[must_use]
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        session: Arc<SessionManager>,
        policy: BackoffPolicy,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            policy,
            cancel: CancellationToken::new(),
            rate_limit_attempts: AtomicU32::new(0),
            http_requests: AtomicU64::new(0),
            rate_limit_waits: AtomicU64::new(0),
        }
    }

    /// Abort backoff waits when `cancel` fires.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Perform one logical call, retrying per policy.
    pub async fn call(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<Page, RequestError> {
        let url = format!("{}{}", self.base_url, endpoint.path());
        let mut call_attempts: u32 = 0;
        let mut rate_limit_retries: u32 = 0;
        let mut auth_retried = false;

        loop {
            if self.cancel.is_cancelled() {
                return Err(RequestError::Cancelled);
            }

            if !self.session.ensure_valid().await {
                tracing::warn!("Token validation failed, request will likely be rejected");
            }
            let bearer = self
                .session
                .bearer()
                .await
                .ok_or(RequestError::AuthExpired)?;

            self.http_requests.fetch_add(1, Ordering::Relaxed);
            let response = self
                .client
                .get(&url)
                .query(params)
                .header(reqwest::header::AUTHORIZATION, bearer.header_value())
                .send()
                .await?;

            let status = response.status();
            match status {
                StatusCode::TOO_MANY_REQUESTS => {
                    if rate_limit_retries >= self.policy.max_retries {
                        tracing::error!(
                            endpoint = ?endpoint,
                            retries = rate_limit_retries,
                            "Rate limit persisted past retry budget"
                        );
                        return Err(RequestError::RateLimited {
                            attempts: rate_limit_retries,
                        });
                    }

                    let attempt = match self.policy.scope {
                        BackoffScope::Run => self.rate_limit_attempts.fetch_add(1, Ordering::SeqCst),
                        BackoffScope::PerCall => {
                            let attempt = call_attempts;
                            call_attempts += 1;
                            attempt
                        }
                    };
                    let wait = self.policy.delay_for(attempt);
                    tracing::warn!(
                        endpoint = ?endpoint,
                        attempt,
                        wait_secs = wait.as_secs_f64(),
                        "Rate limited, backing off"
                    );
                    self.rate_limit_waits.fetch_add(1, Ordering::Relaxed);
                    rate_limit_retries += 1;

                    tokio::select! {
                        () = tokio::time::sleep(wait) => {}
                        () = self.cancel.cancelled() => return Err(RequestError::Cancelled),
                    }
                }
                StatusCode::UNAUTHORIZED => {
                    if auth_retried {
                        tracing::error!("Access token rejected again after refresh");
                        return Err(RequestError::AuthExpired);
                    }
                    tracing::warn!("Access token rejected, refreshing");
                    if !self.session.recover(bearer.generation).await {
                        return Err(RequestError::AuthExpired);
                    }
                    auth_retried = true;
                }
                StatusCode::FORBIDDEN => {
                    tracing::error!(endpoint = ?endpoint, "Access forbidden");
                    return Err(RequestError::Forbidden);
                }
                s if !s.is_success() => {
                    let body = response.text().await.unwrap_or_default();
                    tracing::warn!(endpoint = ?endpoint, status = %s, "Request failed");
                    return Err(RequestError::Transport(format!(
                        "HTTP {s}: {}",
                        truncate(&body, 200)
                    )));
                }
                _ => {
                    let body = response.bytes().await?;
                    let page = Page::from_body(endpoint, &body)?;
                    if !page.usable {
                        tracing::warn!(
                            endpoint = ?endpoint,
                            field = endpoint.items_field(),
                            "Response lacks items field"
                        );
                    }
                    return Ok(page);
                }
            }
        }
    }
}

#[async_trait]
impl PageSource for RateLimitedRequester {
    async fn fetch(
        &self,
        endpoint: Endpoint,
        params: &[(&'static str, String)],
    ) -> Result<Page, RequestError> {
        self.call(endpoint, params).await
    }

    fn telemetry(&self) -> SourceTelemetry {
        SourceTelemetry {
            http_requests: self.http_requests.load(Ordering::Relaxed),
            rate_limit_waits: self.rate_limit_waits.load(Ordering::Relaxed),
            token_renewals: self.session.renewals(),
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
