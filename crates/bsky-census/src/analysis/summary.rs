//! Engagement summary over retained posts.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use super::classifier::{parse_year_month, ClassifiedPost};

/// Default number of authors reported.
pub const DEFAULT_TOP_AUTHORS: usize = 10;

/// Post count for one author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorCount {
    pub handle: String,
    pub posts: usize,
}

/// Engagement totals, monthly distribution, and most active authors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngagementSummary {
    pub posts: usize,
    pub total_likes: u64,
    pub total_reposts: u64,
    pub total_replies: u64,
    /// `None` when there are no posts.
    pub avg_likes: Option<f64>,
    pub avg_reposts: Option<f64>,
    /// Posts per `YYYY-MM`; unparseable timestamps are left out.
    pub posts_by_month: BTreeMap<String, usize>,
    /// Most active handles, highest count first, ties by handle.
    pub top_authors: Vec<AuthorCount>,
}

impl EngagementSummary {
    /// Summarize with the default top-author count.
    #[must_use]
    pub fn from_posts(posts: &[ClassifiedPost]) -> Self {
        Self::with_top_authors(posts, DEFAULT_TOP_AUTHORS)
    }

    /// Summarize, reporting at most `top_n` authors.
    #[must_use]
    pub fn with_top_authors(posts: &[ClassifiedPost], top_n: usize) -> Self {
        let mut summary = Self {
            posts: posts.len(),
            ..Self::default()
        };
        let mut per_author: HashMap<&str, usize> = HashMap::new();

        for classified in posts {
            let post = &classified.post;
            summary.total_likes += post.like_count;
            summary.total_reposts += post.repost_count;
            summary.total_replies += post.reply_count;

            if let Some((year, month)) = parse_year_month(&post.created_at) {
                *summary
                    .posts_by_month
                    .entry(format!("{year}-{month:02}"))
                    .or_insert(0) += 1;
            }

            if !post.author_handle.is_empty() {
                *per_author.entry(post.author_handle.as_str()).or_insert(0) += 1;
            }
        }

        if summary.posts > 0 {
            let n = summary.posts as f64;
            summary.avg_likes = Some(summary.total_likes as f64 / n);
            summary.avg_reposts = Some(summary.total_reposts as f64 / n);
        }

        let mut authors: Vec<AuthorCount> = per_author
            .into_iter()
            .map(|(handle, posts)| AuthorCount {
                handle: handle.to_string(),
                posts,
            })
            .collect();
        authors.sort_by(|a, b| b.posts.cmp(&a.posts).then_with(|| a.handle.cmp(&b.handle)));
        authors.truncate(top_n);
        summary.top_authors = authors;

        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ClassificationVerdict;
    use crate::bluesky::Post;

    fn classified(handle: &str, created_at: &str, likes: u64, reposts: u64) -> ClassifiedPost {
        ClassifiedPost {
            post: Post {
                uri: format!("at://{handle}/{created_at}"),
                cid: String::new(),
                author_handle: handle.to_string(),
                author_did: String::new(),
                author_display_name: None,
                text: String::new(),
                created_at: created_at.to_string(),
                language_tags: Vec::new(),
                like_count: likes,
                repost_count: reposts,
                reply_count: 1,
                indexed_at: String::new(),
            },
            verdict: ClassificationVerdict::default(),
        }
    }

    #[test]
    fn test_empty_summary() {
        let summary = EngagementSummary::from_posts(&[]);
        assert_eq!(summary.posts, 0);
        assert!(summary.avg_likes.is_none());
        assert!(summary.avg_reposts.is_none());
        assert!(summary.top_authors.is_empty());
    }

    #[test]
    fn test_totals_months_and_authors() {
        let posts = vec![
            classified("b.bsky.social", "2025-01-10T00:00:00Z", 4, 1),
            classified("a.bsky.social", "2025-01-20T00:00:00Z", 2, 0),
            classified("b.bsky.social", "2025-03-01T00:00:00Z", 0, 3),
            classified("c.bsky.social", "broken", 0, 0),
        ];
        let summary = EngagementSummary::with_top_authors(&posts, 2);

        assert_eq!(summary.total_likes, 6);
        assert_eq!(summary.total_reposts, 4);
        assert_eq!(summary.total_replies, 4);
        assert_eq!(summary.avg_likes, Some(1.5));
        assert_eq!(summary.posts_by_month.get("2025-01"), Some(&2));
        assert_eq!(summary.posts_by_month.get("2025-03"), Some(&1));
        assert_eq!(summary.posts_by_month.len(), 2);

        let handles: Vec<_> = summary.top_authors.iter().map(|a| a.handle.as_str()).collect();
        assert_eq!(handles, vec!["b.bsky.social", "a.bsky.social"]);
        assert_eq!(summary.top_authors[0].posts, 2);
    }
}
