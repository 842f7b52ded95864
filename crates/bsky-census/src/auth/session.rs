//! Session and credential values.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

/// Account credentials exchanged for a token pair.
#[derive(Clone)]
pub struct Credentials {
    /// Handle or email.
    pub identifier: String,
    /// Account or app password.
    pub secret: String,
}

impl Credentials {
    #[must_use]
    pub fn new(identifier: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            secret: secret.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// Live token pair with a locally estimated expiry.
#[derive(Clone)]
pub struct Session {
    /// Short-lived access JWT sent on every request.
    pub access_token: String,
    /// Refresh JWT (may rotate on each refresh).
    pub refresh_token: String,
    /// Conservative expiry; the server does not disclose the real one.
    pub expires_at: DateTime<Utc>,
    /// Incremented on every authenticate/refresh.
    pub generation: u64,
}

impl Session {
    /// Create a session whose expiry is `ttl` from now.
    #[must_use]
    pub fn new(access_token: String, refresh_token: String, ttl: Duration, generation: u64) -> Self {
        Self {
            access_token,
            refresh_token,
            expires_at: Utc::now() + ttl,
            generation,
        }
    }

    /// Whether the estimated expiry has been reached at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// The credential to attach to outgoing requests.
    #[must_use]
    pub fn bearer(&self) -> Bearer {
        Bearer {
            token: self.access_token.clone(),
            generation: self.generation,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Access token snapshot, tagged with the session generation it came from.
#[derive(Clone)]
pub struct Bearer {
    pub token: String,
    pub generation: u64,
}

impl Bearer {
    /// Value for the `Authorization` header.
    #[must_use]
    pub fn header_value(&self) -> String {
        format!("Bearer {}", self.token)
    }
}
