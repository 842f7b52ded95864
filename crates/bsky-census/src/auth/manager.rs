//! Session lifecycle: authenticate, proactive refresh, reactive recovery.

use chrono::{Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, RwLock};

use super::session::{Bearer, Credentials, Session};
use crate::bluesky::{CREATE_SESSION_PATH, REFRESH_SESSION_PATH};
use crate::error::AuthError;

/// Default local token lifetime. Shorter than the server's real lifetime.
pub const DEFAULT_TOKEN_TTL_SECS: i64 = 5 * 60;

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    access_jwt: Option<String>,
    refresh_jwt: Option<String>,
}

/// Owns the single live session of a run.
///
/// Refreshes are serialized: concurrent callers that observed the same
/// rejected generation trigger at most one refresh.
pub struct SessionManager {
    client: Client,
    base_url: String,
    ttl: Duration,
    session: RwLock<Option<Session>>,
    refresh_gate: Mutex<()>,
    next_generation: AtomicU64,
    renewals: AtomicU64,
}

impl SessionManager {
    /// Create a manager with no session yet.
    #[must_use]
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ttl: Duration::seconds(DEFAULT_TOKEN_TTL_SECS),
            session: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            next_generation: AtomicU64::new(1),
            renewals: AtomicU64::new(0),
        }
    }

    /// Override the conservative token lifetime.
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Exchange credentials for a token pair and install it as the live session.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session, AuthError> {
        let url = format!("{}{CREATE_SESSION_PATH}", self.base_url);
        tracing::info!(identifier = %credentials.identifier, "Creating session");

        let response = self
            .client
            .post(&url)
            .json(&CreateSessionRequest {
                identifier: &credentials.identifier,
                password: &credentials.secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status = %status, "Authentication rejected");
            return Err(AuthError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let tokens: TokenResponse = response.json().await?;
        let (Some(access), Some(refresh)) = (tokens.access_jwt, tokens.refresh_jwt) else {
            return Err(AuthError::MissingTokens);
        };

        let session = Session::new(access, refresh, self.ttl, self.bump_generation());
        *self.session.write().await = Some(session.clone());

        tracing::info!(expires_at = %session.expires_at, "Authenticated");
        Ok(session)
    }

    /// Refresh if the estimated expiry has passed. Called before every request.
    ///
    /// Returns `false` when there is no session or the refresh failed.
    pub async fn ensure_valid(&self) -> bool {
        let generation = {
            let guard = self.session.read().await;
            match guard.as_ref() {
                None => return false,
                Some(session) if !session.is_expired_at(Utc::now()) => return true,
                Some(session) => session.generation,
            }
        };

        tracing::debug!("Token past its estimated expiry, refreshing");
        self.recover(generation).await
    }

    /// Exchange the stored refresh token for a new pair.
    ///
    /// On failure the previous tokens stay in place.
    pub async fn refresh(&self) -> bool {
        let _gate = self.refresh_gate.lock().await;
        self.refresh_locked().await
    }

    /// Refresh after a request made with `observed_generation` was rejected.
    ///
    /// If another caller already replaced that generation, no new refresh is issued.
    pub async fn recover(&self, observed_generation: u64) -> bool {
        let _gate = self.refresh_gate.lock().await;
        let current = self.session.read().await.as_ref().map(|s| s.generation);
        match current {
            None => false,
            Some(generation) if generation != observed_generation => {
                tracing::debug!(
                    observed_generation,
                    generation,
                    "Session already refreshed by another caller"
                );
                true
            }
            Some(_) => self.refresh_locked().await,
        }
    }

    async fn refresh_locked(&self) -> bool {
        let refresh_token = match self.session.read().await.as_ref() {
            Some(session) => session.refresh_token.clone(),
            None => {
                tracing::warn!("No refresh token available");
                return false;
            }
        };

        let url = format!("{}{REFRESH_SESSION_PATH}", self.base_url);
        let response = match self.client.post(&url).bearer_auth(&refresh_token).send().await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh request failed");
                return false;
            }
        };

        if !response.status().is_success() {
            tracing::warn!(status = %response.status(), "Token refresh rejected");
            return false;
        }

        let tokens: TokenResponse = match response.json().await {
            Ok(tokens) => tokens,
            Err(e) => {
                tracing::warn!(error = %e, "Token refresh response unreadable");
                return false;
            }
        };

        let Some(access) = tokens.access_jwt else {
            tracing::warn!("Token refresh response has no accessJwt");
            return false;
        };
        let refresh = tokens.refresh_jwt.unwrap_or(refresh_token);

        let session = Session::new(access, refresh, self.ttl, self.bump_generation());
        let generation = session.generation;
        *self.session.write().await = Some(session);
        self.renewals.fetch_add(1, Ordering::Relaxed);

        tracing::info!(generation, "Token renewed");
        true
    }

    /// The credential for the next outgoing request, if authenticated.
    pub async fn bearer(&self) -> Option<Bearer> {
        self.session.read().await.as_ref().map(Session::bearer)
    }

    /// Snapshot of the live session.
    pub async fn current(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Number of successful refreshes so far.
    #[must_use]
    pub fn renewals(&self) -> u64 {
        self.renewals.load(Ordering::Relaxed)
    }

    fn bump_generation(&self) -> u64 {
        self.next_generation.fetch_add(1, Ordering::Relaxed)
    }
}
