//! Bluesky search collector for topic/period/locale census runs.
//!
//! This crate provides:
//! - Session management with proactive and reactive token refresh
//! - Rate-limited XRPC requests with exponential backoff
//! - Cursor pagination with run-wide deduplication
//! - Post classification by creation year, topic lexicon, and locale signals
//! - Run statistics and an engagement summary of retained posts

pub mod analysis;
pub mod auth;
pub mod bluesky;
pub mod error;
pub mod pipeline;
pub mod stats;
pub mod storage;

// Re-export main types
pub use analysis::{ClassificationVerdict, ClassifiedPost, Classifier, ClassifierConfig};
pub use auth::{Credentials, SessionManager};
pub use bluesky::{PageSource, Post, RateLimitedRequester};
pub use pipeline::{CollectionRun, CollectorConfig, PaginatedCollector, RetainPolicy};
pub use stats::RunStats;
pub use storage::Deduplicator;
