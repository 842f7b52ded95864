//! Error types for the collector.

use thiserror::Error;

/// Failures while establishing a session. Always fatal for the run.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity endpoint could not be reached.
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The identity endpoint answered with a non-success status.
    #[error("Authentication rejected ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// The response did not carry both tokens.
    #[error("Authentication response is missing accessJwt/refreshJwt")]
    MissingTokens,
}

/// Failures of a single API call after the retry policy has been applied.
#[derive(Debug, Error)]
pub enum RequestError {
    /// Still rate limited after the bounded number of backoff retries.
    #[error("Rate limited, gave up after {attempts} retries")]
    RateLimited { attempts: u32 },

    /// The access token was rejected and could not be refreshed.
    #[error("Access token expired and refresh failed")]
    AuthExpired,

    /// Credentials lack the privilege for this endpoint.
    #[error("Access forbidden (403)")]
    Forbidden,

    /// Network failure or any other non-success status.
    #[error("Transport failure: {0}")]
    Transport(String),

    /// A 2xx body that is not valid JSON.
    #[error("Malformed page: {0}")]
    Parse(#[from] ParseError),

    /// The run was interrupted while this call was waiting.
    #[error("Request cancelled")]
    Cancelled,
}

impl RequestError {
    /// Whether this error must terminate the whole run.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::AuthExpired | Self::Forbidden)
    }
}

impl From<reqwest::Error> for RequestError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Malformed page or post bodies. Recovered locally by skipping the item/page.
#[derive(Debug, Error)]
pub enum ParseError {
    /// Body was not valid JSON.
    #[error("Invalid JSON body: {0}")]
    Body(#[from] serde_json::Error),

    /// A post item without the `uri` dedup key.
    #[error("Post item has no uri")]
    MissingUri,

    /// A post item with an unexpected shape.
    #[error("Unexpected post item: {0}")]
    Item(String),
}

/// Invalid classifier or collector configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A lexicon entry is not a valid regular expression.
    #[error("Invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// Lexicon file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Lexicon file is not valid TOML.
    #[error("Invalid lexicon file: {0}")]
    Toml(#[from] toml::de::Error),
}
