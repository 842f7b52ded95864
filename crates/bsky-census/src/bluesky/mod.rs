//! Bluesky XRPC access: endpoints, page shapes, post extraction, and the
//! rate-limited requester.

mod parser;
mod requester;
mod types;

pub use parser::PostParser;
pub use requester::{
    BackoffPolicy, BackoffScope, PageSource, RateLimitedRequester, SourceTelemetry,
};
pub use types::{Endpoint, Page, Post};

use std::time::Duration;

/// Default PDS entryway.
pub const DEFAULT_BASE_URL: &str = "https://bsky.social";

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("bsky-census/", env!("CARGO_PKG_VERSION"));

pub(crate) const CREATE_SESSION_PATH: &str = "/xrpc/com.atproto.server.createSession";
pub(crate) const REFRESH_SESSION_PATH: &str = "/xrpc/com.atproto.server.refreshSession";

/// Build the HTTP client shared by the session manager and the requester.
pub fn build_client(user_agent: &str, timeout: Duration) -> reqwest::Result<reqwest::Client> {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert(
        reqwest::header::ACCEPT,
        reqwest::header::HeaderValue::from_static("application/json"),
    );

    reqwest::Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(timeout)
        .build()
}
