//! Duplicate detection across every query of a run.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Tracks post URIs already examined during one run.
///
/// Shared by reference (`Arc<Deduplicator>`) across queries, so a post
/// returned by several queries is classified once.
#[derive(Debug, Default)]
pub struct Deduplicator {
    seen_uris: Mutex<HashSet<String>>,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a URI has already been examined.
    pub fn seen(&self, uri: &str) -> bool {
        self.lock().contains(uri)
    }

    /// Mark a URI as examined.
    pub fn mark(&self, uri: &str) {
        self.lock().insert(uri.to_string());
    }

    /// Mark a URI and report whether this was its first sighting.
    ///
    /// Equivalent to `!seen(uri)` followed by `mark(uri)`, as one step.
    pub fn check_and_mark(&self, uri: &str) -> bool {
        let mut seen = self.lock();
        if seen.contains(uri) {
            false
        } else {
            seen.insert(uri.to_string());
            true
        }
    }

    /// Get the count of distinct URIs seen.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Union another tracker into this one (for sharded workers).
    pub fn merge(&self, other: &Deduplicator) {
        let theirs = other.lock().clone();
        self.lock().extend(theirs);
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        // The set stays consistent even if a holder panicked mid-insert.
        self.seen_uris.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_seen_and_mark() {
        let dedup = Deduplicator::new();
        assert!(!dedup.seen("at://1"));
        dedup.mark("at://1");
        assert!(dedup.seen("at://1"));
        dedup.mark("at://1");
        assert_eq!(dedup.count(), 1);
    }

    #[test]
    fn test_check_and_mark_first_sighting_only() {
        let dedup = Deduplicator::new();
        assert!(dedup.check_and_mark("at://did:plc:x/app.bsky.feed.post/1"));
        assert!(!dedup.check_and_mark("at://did:plc:x/app.bsky.feed.post/1"));
        assert!(dedup.check_and_mark("at://did:plc:x/app.bsky.feed.post/2"));
    }

    #[test]
    fn test_concurrent_check_and_mark_admits_once() {
        let dedup = Arc::new(Deduplicator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dedup = Arc::clone(&dedup);
                std::thread::spawn(move || dedup.check_and_mark("at://same"))
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|first| *first)
            .count();
        assert_eq!(admitted, 1);
    }

    #[test]
    fn test_merge() {
        let a = Deduplicator::new();
        let b = Deduplicator::new();
        a.mark("x");
        b.mark("x");
        b.mark("y");
        a.merge(&b);
        assert_eq!(a.count(), 2);
        assert!(a.seen("y"));
    }
}
