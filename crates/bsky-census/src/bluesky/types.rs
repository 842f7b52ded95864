//! Bluesky data types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ParseError;

/// Listing endpoints the collector can page through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endpoint {
    /// `app.bsky.feed.searchPosts` - primary search.
    SearchPosts,
    /// `app.bsky.feed.getTimeline` - generic feed used as degraded fallback.
    Timeline,
}

impl Endpoint {
    /// XRPC path of this endpoint.
    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::SearchPosts => "/xrpc/app.bsky.feed.searchPosts",
            Endpoint::Timeline => "/xrpc/app.bsky.feed.getTimeline",
        }
    }

    /// Name of the array field holding the page items.
    #[must_use]
    pub fn items_field(self) -> &'static str {
        match self {
            Endpoint::SearchPosts => "posts",
            Endpoint::Timeline => "feed",
        }
    }

    /// Largest `limit` the endpoint accepts.
    #[must_use]
    pub fn max_limit(self) -> usize {
        match self {
            Endpoint::SearchPosts => 25,
            Endpoint::Timeline => 50,
        }
    }
}

/// One page of raw items plus the continuation cursor.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Raw items, unparsed.
    pub items: Vec<Value>,
    /// Opaque continuation token; `None` when there are no more pages.
    pub cursor: Option<String>,
    /// `false` when the body lacked the expected items array.
    pub usable: bool,
}

impl Page {
    /// Decode a 2xx body. A missing items field yields an empty, unusable page.
    pub fn from_body(endpoint: Endpoint, body: &[u8]) -> Result<Self, ParseError> {
        let value: Value = serde_json::from_slice(body)?;
        Ok(Self::from_value(endpoint, value))
    }

    /// Decode an already parsed body.
    #[must_use]
    pub fn from_value(endpoint: Endpoint, mut value: Value) -> Self {
        let cursor = value
            .get("cursor")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        match value.get_mut(endpoint.items_field()).map(Value::take) {
            Some(Value::Array(items)) => Self {
                items,
                cursor,
                usable: true,
            },
            _ => Self {
                items: Vec::new(),
                cursor,
                usable: false,
            },
        }
    }

    /// Whether the page carried no items.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A post normalized from a raw page item. Immutable once extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// `at://` URI; the dedup key.
    pub uri: String,
    /// Content id of the record.
    pub cid: String,
    /// Author handle (without @).
    pub author_handle: String,
    /// Author DID.
    pub author_did: String,
    /// Author display name, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author_display_name: Option<String>,
    /// Post text.
    pub text: String,
    /// Raw `createdAt` from the record; parsed by the classifier.
    pub created_at: String,
    /// Declared language tags, in record order.
    #[serde(default)]
    pub language_tags: Vec<String>,
    pub like_count: u64,
    pub repost_count: u64,
    pub reply_count: u64,
    /// When the AppView indexed the post.
    pub indexed_at: String,
}

impl Post {
    /// Get the handle with @ prefix.
    #[must_use]
    pub fn at_handle(&self) -> String {
        format!("@{}", self.author_handle)
    }
}

/// `app.bsky.feed.defs#postView`, only the fields consumed here.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostView {
    pub uri: Option<String>,
    #[serde(default)]
    pub cid: Option<String>,
    #[serde(default)]
    pub author: Option<ProfileView>,
    #[serde(default)]
    pub record: Option<PostRecord>,
    #[serde(default)]
    pub reply_count: Option<u64>,
    #[serde(default)]
    pub repost_count: Option<u64>,
    #[serde(default)]
    pub like_count: Option<u64>,
    #[serde(default)]
    pub indexed_at: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProfileView {
    #[serde(default)]
    pub did: Option<String>,
    #[serde(default)]
    pub handle: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// `app.bsky.feed.post` record.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PostRecord {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub langs: Option<Vec<String>>,
}
