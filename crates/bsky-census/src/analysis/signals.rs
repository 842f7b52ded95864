//! Locale signal categories.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which locale sub-check accepted a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocaleSignal {
    /// A declared language tag starts with the target prefix.
    LanguageTag,
    /// The author handle carries a country domain or nationality token.
    Handle,
    /// The text matches a country-specific lexical pattern.
    LexicalPattern,
    /// The text names a region or state.
    RegionName,
}

impl LocaleSignal {
    /// Get all signals, in evaluation order.
    #[must_use]
    pub fn all() -> &'static [LocaleSignal] {
        &[
            LocaleSignal::LanguageTag,
            LocaleSignal::Handle,
            LocaleSignal::LexicalPattern,
            LocaleSignal::RegionName,
        ]
    }

    /// Get the signal description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            LocaleSignal::LanguageTag => "Declared post language matches the target prefix",
            LocaleSignal::Handle => "Author handle contains a country domain or nationality token",
            LocaleSignal::LexicalPattern => "Currency markers, demonyms, or place names in the text",
            LocaleSignal::RegionName => "Region or state name in the text",
        }
    }
}

impl fmt::Display for LocaleSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LocaleSignal::LanguageTag => "language_tag",
            LocaleSignal::Handle => "handle",
            LocaleSignal::LexicalPattern => "lexical_pattern",
            LocaleSignal::RegionName => "region_name",
        };
        f.pad(s)
    }
}
