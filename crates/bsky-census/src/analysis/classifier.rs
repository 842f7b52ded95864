//! Temporal, topic, and locale predicates.

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use super::config::ClassifierConfig;
use super::signals::LocaleSignal;
use crate::bluesky::Post;
use crate::error::ConfigError;

/// Per-post outcome of the three predicates. Recomputed, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClassificationVerdict {
    pub is_in_target_period: bool,
    pub is_topic_match: bool,
    pub is_locale_match: bool,
    /// Exactly the conjunction of the three predicates.
    pub is_final_match: bool,
    /// Text of the first topic match, lowercased.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_topic: Option<String>,
    /// Locale sub-check that accepted the post.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale_signal: Option<LocaleSignal>,
}

/// A post together with its verdict.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedPost {
    #[serde(flatten)]
    pub post: Post,
    pub verdict: ClassificationVerdict,
}

/// Compiled lexicons. Classification never fails; malformed input only
/// turns the affected predicate false.
#[derive(Debug, Clone)]
pub struct Classifier {
    target_year: i32,
    topic_terms: Vec<Regex>,
    language_prefix: String,
    handle_markers: Vec<String>,
    locale_patterns: Vec<Regex>,
    region_names: Vec<String>,
}

impl Classifier {
    /// Compile the configured lexicons.
    pub fn new(config: &ClassifierConfig) -> Result<Self, ConfigError> {
        let topic_terms = config
            .topic_terms
            .iter()
            .map(|term| compile(&format!(r"\b(?:{term})\b")))
            .collect::<Result<Vec<_>, _>>()?;

        let locale_patterns = config
            .locale_patterns
            .iter()
            .map(|pattern| compile(pattern))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            target_year: config.target_year,
            topic_terms,
            language_prefix: config.language_prefix.to_lowercase(),
            handle_markers: lowercase_all(&config.handle_markers),
            locale_patterns,
            region_names: lowercase_all(&config.region_names),
        })
    }

    /// Evaluate all predicates for one post.
    #[must_use]
    pub fn classify(&self, post: &Post) -> ClassificationVerdict {
        let is_in_target_period = self.is_in_target_period(&post.created_at);
        let matched_topic = self.matched_topic(&post.text);
        let locale_signal = self.locale_signal(post);

        let is_topic_match = matched_topic.is_some();
        let is_locale_match = locale_signal.is_some();

        ClassificationVerdict {
            is_in_target_period,
            is_topic_match,
            is_locale_match,
            is_final_match: is_in_target_period && is_topic_match && is_locale_match,
            matched_topic,
            locale_signal,
        }
    }

    /// Whether `created_at` falls in the target calendar year.
    ///
    /// The year is read in the timestamp's own offset.
    #[must_use]
    pub fn is_in_target_period(&self, created_at: &str) -> bool {
        parse_year(created_at) == Some(self.target_year)
    }

    /// Words matched by the first topic term that occurs in `text`, lowercased.
    #[must_use]
    pub fn matched_topic(&self, text: &str) -> Option<String> {
        if text.is_empty() {
            return None;
        }
        self.topic_terms
            .iter()
            .find_map(|re| re.find(text))
            .map(|m| m.as_str().to_lowercase())
    }

    /// First locale sub-check that accepts the post.
    #[must_use]
    pub fn locale_signal(&self, post: &Post) -> Option<LocaleSignal> {
        if !self.language_prefix.is_empty()
            && post
                .language_tags
                .iter()
                .any(|tag| tag.to_lowercase().starts_with(&self.language_prefix))
        {
            return Some(LocaleSignal::LanguageTag);
        }

        let handle = post.author_handle.to_lowercase();
        if self
            .handle_markers
            .iter()
            .any(|marker| !marker.is_empty() && handle.contains(marker.as_str()))
        {
            return Some(LocaleSignal::Handle);
        }

        if self.locale_patterns.iter().any(|re| re.is_match(&post.text)) {
            return Some(LocaleSignal::LexicalPattern);
        }

        let text = post.text.to_lowercase();
        if self
            .region_names
            .iter()
            .any(|region| !region.is_empty() && text.contains(region.as_str()))
        {
            return Some(LocaleSignal::RegionName);
        }

        None
    }

    /// Configured target year.
    #[must_use]
    pub fn target_year(&self) -> i32 {
        self.target_year
    }
}

/// Calendar year of an ISO-8601 timestamp, if it parses.
pub(crate) fn parse_year(raw: &str) -> Option<i32> {
    parse_year_month(raw).map(|(year, _)| year)
}

/// Calendar year and month of an ISO-8601 timestamp, if it parses.
pub(crate) fn parse_year_month(raw: &str) -> Option<(i32, u32)> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some((dt.year(), dt.month()));
    }
    // offsets written without a colon, e.g. +0000
    if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%z") {
        return Some((dt.year(), dt.month()));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some((dt.year(), dt.month()));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|d| (d.year(), d.month()))
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::Pattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn lowercase_all(items: &[String]) -> Vec<String> {
    items.iter().map(|s| s.to_lowercase()).collect()
}
