//! Extraction of normalized posts from raw page items.

use serde_json::Value;

use super::types::{Post, PostView};
use crate::error::ParseError;

/// Parser for search and feed page items.
pub struct PostParser;

impl PostParser {
    /// Parse every item of a page, keeping failures alongside successes.
    ///
    /// Order of the returned posts follows the page order.
    pub fn parse_items(items: Vec<Value>) -> (Vec<Post>, Vec<ParseError>) {
        let mut posts = Vec::with_capacity(items.len());
        let mut errors = Vec::new();

        for item in items {
            match Self::parse_item(item) {
                Ok(post) => posts.push(post),
                Err(e) => {
                    tracing::debug!(error = %e, "Skipping malformed post item");
                    errors.push(e);
                }
            }
        }

        (posts, errors)
    }

    /// Parse one item. Feed items wrap the post view under `post`.
    pub fn parse_item(item: Value) -> Result<Post, ParseError> {
        let view_value = match item {
            Value::Object(mut map) => match map.remove("post") {
                Some(inner @ Value::Object(_)) => inner,
                Some(other) => {
                    map.insert("post".to_string(), other);
                    Value::Object(map)
                }
                None => Value::Object(map),
            },
            other => {
                return Err(ParseError::Item(format!(
                    "expected object, got {}",
                    json_kind(&other)
                )))
            }
        };

        let view: PostView =
            serde_json::from_value(view_value).map_err(|e| ParseError::Item(e.to_string()))?;

        let uri = view
            .uri
            .filter(|u| !u.is_empty())
            .ok_or(ParseError::MissingUri)?;
        let author = view.author.unwrap_or_default();
        let record = view.record.unwrap_or_default();

        Ok(Post {
            uri,
            cid: view.cid.unwrap_or_default(),
            author_handle: author.handle.unwrap_or_default(),
            author_did: author.did.unwrap_or_default(),
            author_display_name: author.display_name.filter(|n| !n.is_empty()),
            text: record.text.unwrap_or_default(),
            created_at: record.created_at.unwrap_or_default(),
            language_tags: record.langs.unwrap_or_default(),
            like_count: view.like_count.unwrap_or(0),
            repost_count: view.repost_count.unwrap_or(0),
            reply_count: view.reply_count.unwrap_or(0),
            indexed_at: view.indexed_at.unwrap_or_default(),
        })
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
