//! Run-scoped storage.

mod dedup;

pub use dedup::Deduplicator;
