//! Post classification.
//!
//! Three independent predicates (target period, topic lexicon, locale
//! signals) combined into a conjunctive verdict, plus the engagement summary
//! computed over the retained posts.

mod classifier;
mod config;
mod signals;
mod summary;

pub use classifier::{ClassificationVerdict, ClassifiedPost, Classifier};
pub use config::ClassifierConfig;
pub use signals::LocaleSignal;
pub use summary::{AuthorCount, EngagementSummary};
