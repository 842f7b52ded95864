//! Collection pipeline - drives queries through cursor pagination, dedup,
//! and classification.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

use crate::analysis::{ClassifiedPost, Classifier, EngagementSummary};
use crate::bluesky::{Endpoint, Page, PageSource, PostParser, SourceTelemetry};
use crate::error::RequestError;
use crate::stats::{BatchRecord, RunStats};
use crate::storage::Deduplicator;

/// Queries used when none are given.
pub const DEFAULT_QUERIES: &[&str] = &[
    "agronegócio",
    "agricultura",
    "pecuária",
    "fazenda",
    "soja",
    "milho",
    "bovino",
];

/// Default delay between consecutive page requests.
pub const DEFAULT_INTER_REQUEST_DELAY: Duration = Duration::from_millis(1500);

/// Default per-query request ceiling.
pub const DEFAULT_MAX_REQUESTS_PER_QUERY: u64 = 2000;

/// Default `lang:` search operator.
pub const DEFAULT_SEARCH_LANGUAGE: &str = "pt";

/// Log a progress line every this many requests.
const PROGRESS_EVERY: u64 = 10;

/// `since`/`until` bounds sent with every search call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub since: String,
    pub until: String,
}

impl DateWindow {
    /// Whole calendar year, UTC.
    #[must_use]
    pub fn year(year: i32) -> Self {
        Self {
            since: format!("{year}-01-01T00:00:00Z"),
            until: format!("{year}-12-31T23:59:59Z"),
        }
    }
}

/// Which classified posts enter the result sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetainPolicy {
    /// Only posts matching all predicates.
    #[default]
    FinalMatches,
    /// Every distinct post with its verdict.
    All,
    /// Counting only.
    None,
}

/// Configuration for a collection run.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// Search queries, run in order.
    pub queries: Vec<String>,
    /// Items per search page (capped at the endpoint maximum).
    pub page_limit: usize,
    /// Run-wide ceiling on page requests.
    pub max_requests: Option<u64>,
    /// Ceiling on page requests for a single query.
    pub max_requests_per_query: Option<u64>,
    /// Stop once this many final matches were counted.
    pub max_matches: Option<u64>,
    /// Pause between pages, on top of any rate-limit backoff.
    pub inter_request_delay: Duration,
    /// Date window sent to search.
    pub window: Option<DateWindow>,
    /// Quote each query as an exact phrase.
    pub exact_phrase: bool,
    /// Append a `lang:<code>` search operator.
    pub search_language: Option<String>,
    /// Page the generic feed when search returns an unusable shape.
    pub fallback_to_timeline: bool,
    /// What to keep in the result sequence.
    pub retain: RetainPolicy,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            queries: DEFAULT_QUERIES.iter().map(|q| (*q).to_string()).collect(),
            page_limit: Endpoint::SearchPosts.max_limit(),
            max_requests: None,
            max_requests_per_query: Some(DEFAULT_MAX_REQUESTS_PER_QUERY),
            max_matches: None,
            inter_request_delay: DEFAULT_INTER_REQUEST_DELAY,
            window: Some(DateWindow::year(2025)),
            exact_phrase: true,
            search_language: Some(DEFAULT_SEARCH_LANGUAGE.to_string()),
            fallback_to_timeline: false,
            retain: RetainPolicy::FinalMatches,
        }
    }
}

impl CollectorConfig {
    /// The `q` parameter for a query.
    #[must_use]
    pub fn search_query(&self, query: &str) -> String {
        let mut q = if self.exact_phrase {
            format!("\"{query}\"")
        } else {
            query.to_string()
        };
        if let Some(lang) = self.search_language.as_deref().filter(|l| !l.is_empty()) {
            q.push_str(" lang:");
            q.push_str(lang);
        }
        q
    }

    fn params(
        &self,
        endpoint: Endpoint,
        query: &str,
        cursor: Option<&str>,
    ) -> Vec<(&'static str, String)> {
        let limit = self.page_limit.clamp(1, endpoint.max_limit());
        let mut params = Vec::with_capacity(5);

        if endpoint == Endpoint::SearchPosts {
            params.push(("q", self.search_query(query)));
        }
        params.push(("limit", limit.to_string()));
        if endpoint == Endpoint::SearchPosts {
            if let Some(window) = &self.window {
                params.push(("since", window.since.clone()));
                params.push(("until", window.until.clone()));
            }
        }
        if let Some(cursor) = cursor {
            params.push(("cursor", cursor.to_string()));
        }
        params
    }
}

/// Why pagination of a query ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A page came back with no items.
    Exhausted,
    /// The page had no continuation cursor.
    NoCursor,
    /// The cursor did not advance.
    RepeatedCursor,
    /// Run-wide request ceiling reached.
    RequestCeiling,
    /// Per-query request ceiling reached.
    QueryRequestCeiling,
    /// Desired number of final matches reached.
    MatchCeiling,
    /// Non-fatal request failure; the query was abandoned.
    PageFailed,
    /// Fatal request failure; the run was abandoned.
    Fatal,
    /// External interrupt.
    Interrupted,
}

impl StopReason {
    /// Whether no further query should run after this one.
    #[must_use]
    pub fn ends_run(self) -> bool {
        matches!(
            self,
            Self::Fatal | Self::Interrupted | Self::RequestCeiling | Self::MatchCeiling
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Exhausted => "no more posts",
            Self::NoCursor => "no more pages",
            Self::RepeatedCursor => "cursor did not advance",
            Self::RequestCeiling => "run request ceiling",
            Self::QueryRequestCeiling => "query request ceiling",
            Self::MatchCeiling => "match ceiling",
            Self::PageFailed => "request failed",
            Self::Fatal => "fatal error",
            Self::Interrupted => "interrupted",
        };
        write!(f, "{s}")
    }
}

/// Result of paging through one query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryOutcome {
    pub query: String,
    pub requests: u64,
    pub pages: u64,
    pub new_posts: u64,
    pub final_matches: u64,
    pub used_fallback: bool,
    pub stop: StopReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryOutcome {
    fn new(query: &str) -> Self {
        Self {
            query: query.to_string(),
            requests: 0,
            pages: 0,
            new_posts: 0,
            final_matches: 0,
            used_fallback: false,
            stop: StopReason::Exhausted,
            error: None,
        }
    }
}

/// Everything a run produced, complete or partial.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollectionRun {
    /// Retained posts, in the order they were first seen.
    pub posts: Vec<ClassifiedPost>,
    pub stats: RunStats,
    pub queries: Vec<QueryOutcome>,
    /// Set when a fatal error ended the run early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fatal_error: Option<String>,
}

impl CollectionRun {
    /// Engagement summary over the retained posts.
    #[must_use]
    pub fn summary(&self) -> EngagementSummary {
        EngagementSummary::from_posts(&self.posts)
    }
}

/// Collector orchestrating source, dedup, and classifier.
pub struct PaginatedCollector {
    source: Arc<dyn PageSource>,
    classifier: Arc<Classifier>,
    dedup: Arc<Deduplicator>,
    config: CollectorConfig,
}

impl PaginatedCollector {
    /// Create a collector with a fresh run-scoped deduplicator.
    #[must_use]
    pub fn new(
        source: Arc<dyn PageSource>,
        classifier: Arc<Classifier>,
        config: CollectorConfig,
    ) -> Self {
        Self::with_dedup(source, classifier, Arc::new(Deduplicator::new()), config)
    }

    /// Create a collector sharing an existing deduplicator.
    #[must_use]
    pub fn with_dedup(
        source: Arc<dyn PageSource>,
        classifier: Arc<Classifier>,
        dedup: Arc<Deduplicator>,
        config: CollectorConfig,
    ) -> Self {
        Self {
            source,
            classifier,
            dedup,
            config,
        }
    }

    /// The run's deduplicator.
    #[must_use]
    pub fn dedup(&self) -> &Arc<Deduplicator> {
        &self.dedup
    }

    /// Run every configured query in order.
    ///
    /// Never fails: fatal errors and interrupts end the run early and the
    /// partial result is returned.
    pub async fn run(&self, cancel: &CancellationToken) -> CollectionRun {
        let started = Instant::now();
        let telemetry_before = self.source.telemetry();
        let mut run = CollectionRun::default();

        tracing::info!(
            queries = self.config.queries.len(),
            max_requests = ?self.config.max_requests,
            max_matches = ?self.config.max_matches,
            "Starting collection"
        );

        for (index, query) in self.config.queries.iter().enumerate() {
            tracing::info!(
                query = %query,
                position = index + 1,
                of = self.config.queries.len(),
                "Running query"
            );

            let outcome = self.collect_query(query, &mut run, cancel).await;
            tracing::info!(
                query = %outcome.query,
                requests = outcome.requests,
                new_posts = outcome.new_posts,
                final_matches = outcome.final_matches,
                fallback = outcome.used_fallback,
                stop = %outcome.stop,
                "Query finished"
            );

            let stop = outcome.stop;
            run.queries.push(outcome);
            if stop.ends_run() {
                break;
            }
        }

        run.stats
            .apply_telemetry(telemetry_delta(telemetry_before, self.source.telemetry()));
        run.stats.elapsed_secs = started.elapsed().as_secs_f64();

        tracing::info!(
            requests = run.stats.total_requests,
            posts_seen = run.stats.posts_seen,
            duplicates = run.stats.duplicates_skipped,
            final_matches = run.stats.final_matches,
            interrupted = run.stats.interrupted,
            "Collection complete"
        );

        run
    }

    async fn collect_query(
        &self,
        query: &str,
        run: &mut CollectionRun,
        cancel: &CancellationToken,
    ) -> QueryOutcome {
        let mut outcome = QueryOutcome::new(query);
        let mut endpoint = Endpoint::SearchPosts;
        let mut cursor: Option<String> = None;

        loop {
            if let Some(stop) = self.ceiling_reached(run, &outcome, cancel) {
                return finish(outcome, stop, run);
            }

            let params = self.config.params(endpoint, query, cursor.as_deref());
            run.stats.record_request();
            outcome.requests += 1;

            let result = tokio::select! {
                result = self.source.fetch(endpoint, &params) => result,
                () = cancel.cancelled() => Err(RequestError::Cancelled),
            };

            let page = match result {
                Ok(page) if !page.usable && self.can_fall_back(endpoint) => {
                    tracing::warn!(query, "Search returned an unusable page, falling back to feed");
                    endpoint = Endpoint::Timeline;
                    outcome.used_fallback = true;
                    cursor = None;
                    continue;
                }
                Ok(page) => page,
                Err(RequestError::Cancelled) => {
                    return finish(outcome, StopReason::Interrupted, run);
                }
                Err(e) if e.is_fatal() => {
                    tracing::error!(query, error = %e, "Fatal request error, stopping run");
                    run.fatal_error = Some(e.to_string());
                    outcome.error = Some(e.to_string());
                    return finish(outcome, StopReason::Fatal, run);
                }
                Err(RequestError::Transport(msg)) if self.can_fall_back(endpoint) => {
                    tracing::warn!(query, error = %msg, "Search failed, falling back to feed");
                    endpoint = Endpoint::Timeline;
                    outcome.used_fallback = true;
                    cursor = None;
                    continue;
                }
                Err(e) => {
                    if matches!(e, RequestError::Parse(_)) {
                        run.stats.record_parse_errors(1);
                    }
                    tracing::warn!(query, error = %e, "Request failed, abandoning query");
                    outcome.error = Some(e.to_string());
                    return finish(outcome, StopReason::PageFailed, run);
                }
            };

            if page.is_empty() {
                tracing::info!(query, "No more posts available");
                return finish(outcome, StopReason::Exhausted, run);
            }

            let next_cursor = page.cursor.clone();
            self.process_page(query, endpoint, page, &mut outcome, run);

            if run.stats.total_requests % PROGRESS_EVERY == 0 {
                tracing::info!(
                    requests = run.stats.total_requests,
                    posts_seen = run.stats.posts_seen,
                    final_matches = run.stats.final_matches,
                    rate = run.stats.request_efficiency().unwrap_or(0.0),
                    "Progress"
                );
            }

            match next_cursor {
                None => return finish(outcome, StopReason::NoCursor, run),
                Some(next) if cursor.as_deref() == Some(next.as_str()) => {
                    tracing::warn!(query, "Cursor did not advance, stopping");
                    return finish(outcome, StopReason::RepeatedCursor, run);
                }
                Some(next) => cursor = Some(next),
            }

            if let Some(stop) = self.ceiling_reached(run, &outcome, cancel) {
                return finish(outcome, stop, run);
            }

            if !self.config.inter_request_delay.is_zero() {
                tokio::select! {
                    () = tokio::time::sleep(self.config.inter_request_delay) => {}
                    () = cancel.cancelled() => {
                        return finish(outcome, StopReason::Interrupted, run);
                    }
                }
            }
        }
    }

    /// Dedup, classify, and tally one page.
    fn process_page(
        &self,
        query: &str,
        endpoint: Endpoint,
        page: Page,
        outcome: &mut QueryOutcome,
        run: &mut CollectionRun,
    ) {
        let items = page.items.len();
        let (posts, errors) = PostParser::parse_items(page.items);
        run.stats.record_parse_errors(errors.len());

        let mut new_posts = 0;
        let mut final_matches = 0;

        for post in posts {
            if !self.dedup.check_and_mark(&post.uri) {
                run.stats.record_duplicate();
                continue;
            }

            let verdict = self.classifier.classify(&post);
            run.stats.record_verdict(&verdict);
            new_posts += 1;
            if verdict.is_final_match {
                final_matches += 1;
            }

            let keep = match self.config.retain {
                RetainPolicy::All => true,
                RetainPolicy::FinalMatches => verdict.is_final_match,
                RetainPolicy::None => false,
            };
            if keep {
                run.posts.push(ClassifiedPost { post, verdict });
            }
        }

        outcome.pages += 1;
        outcome.new_posts += new_posts as u64;
        outcome.final_matches += final_matches as u64;

        tracing::debug!(
            query,
            items,
            new_posts,
            final_matches,
            fallback = outcome.used_fallback,
            "Processed page"
        );

        run.stats.record_batch(BatchRecord {
            query: query.to_string(),
            endpoint,
            items,
            new_posts,
            final_matches,
            used_fallback: outcome.used_fallback,
        });
    }

    fn ceiling_reached(
        &self,
        run: &CollectionRun,
        outcome: &QueryOutcome,
        cancel: &CancellationToken,
    ) -> Option<StopReason> {
        if cancel.is_cancelled() {
            return Some(StopReason::Interrupted);
        }
        if let Some(max) = self.config.max_matches {
            if run.stats.final_matches >= max {
                return Some(StopReason::MatchCeiling);
            }
        }
        if let Some(max) = self.config.max_requests {
            if run.stats.total_requests >= max {
                return Some(StopReason::RequestCeiling);
            }
        }
        if let Some(max) = self.config.max_requests_per_query {
            if outcome.requests >= max {
                return Some(StopReason::QueryRequestCeiling);
            }
        }
        None
    }

    fn can_fall_back(&self, endpoint: Endpoint) -> bool {
        self.config.fallback_to_timeline && endpoint == Endpoint::SearchPosts
    }
}

fn finish(mut outcome: QueryOutcome, stop: StopReason, run: &mut CollectionRun) -> QueryOutcome {
    if stop == StopReason::Interrupted {
        run.stats.interrupted = true;
    }
    outcome.stop = stop;
    outcome
}

fn telemetry_delta(before: SourceTelemetry, after: SourceTelemetry) -> SourceTelemetry {
    SourceTelemetry {
        http_requests: after.http_requests.saturating_sub(before.http_requests),
        rate_limit_waits: after.rate_limit_waits.saturating_sub(before.rate_limit_waits),
        token_renewals: after.token_renewals.saturating_sub(before.token_renewals),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::ClassifierConfig;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    type Call = (Endpoint, Vec<(&'static str, String)>);

    /// Page source replaying scripted responses.
    #[derive(Default)]
    struct ScriptedSource {
        responses: Mutex<VecDeque<Result<Page, RequestError>>>,
        calls: Mutex<Vec<Call>>,
    }

    impl ScriptedSource {
        fn new(responses: Vec<Result<Page, RequestError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for ScriptedSource {
        async fn fetch(
            &self,
            endpoint: Endpoint,
            params: &[(&'static str, String)],
        ) -> Result<Page, RequestError> {
            self.calls.lock().unwrap().push((endpoint, params.to_vec()));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Page { usable: true, ..Page::default() }))
        }
    }

    fn item(id: u32, text: &str, created_at: &str) -> Value {
        json!({
            "uri": format!("at://did:plc:x/app.bsky.feed.post/{id}"),
            "cid": format!("cid{id}"),
            "author": {"did": "did:plc:x", "handle": "x.bsky.social"},
            "record": {"text": text, "createdAt": created_at, "langs": ["pt"]},
            "likeCount": 1
        })
    }

    fn page(items: Vec<Value>, cursor: Option<&str>) -> Result<Page, RequestError> {
        Ok(Page {
            items,
            cursor: cursor.map(str::to_string),
            usable: true,
        })
    }

    fn config(queries: &[&str]) -> CollectorConfig {
        CollectorConfig {
            queries: queries.iter().map(|q| (*q).to_string()).collect(),
            inter_request_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    fn collector(source: Arc<ScriptedSource>, config: CollectorConfig) -> PaginatedCollector {
        let classifier = Arc::new(Classifier::new(&ClassifierConfig::default()).unwrap());
        PaginatedCollector::new(source, classifier, config)
    }

    const MATCH_TEXT: &str = "a soja brasileira teve boa safra em 2025";
    const DATE_2025: &str = "2025-03-01T00:00:00Z";

    #[tokio::test]
    async fn test_paginates_until_cursor_absent() {
        let source = ScriptedSource::new(vec![
            page(vec![item(1, MATCH_TEXT, DATE_2025)], Some("c1")),
            page(vec![item(2, "nada", DATE_2025)], None),
        ]);
        let run = collector(source.clone(), config(&["soja"]))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(run.stats.total_requests, 2);
        assert_eq!(run.stats.posts_seen, 2);
        assert_eq!(run.stats.final_matches, 1);
        assert_eq!(run.posts.len(), 1);
        assert_eq!(run.queries[0].stop, StopReason::NoCursor);

        let calls = source.calls();
        assert!(!calls[0].1.iter().any(|(k, _)| *k == "cursor"));
        assert!(calls[1].1.contains(&("cursor", "c1".to_string())));
    }

    #[tokio::test]
    async fn test_empty_page_stops_query_without_error() {
        let source = ScriptedSource::new(vec![page(vec![], Some("c1"))]);
        let run = collector(source, config(&["soja"]))
            .run(&CancellationToken::new())
            .await;
        assert_eq!(run.queries[0].stop, StopReason::Exhausted);
        assert!(run.queries[0].error.is_none());
        assert!(run.fatal_error.is_none());
    }

    #[tokio::test]
    async fn test_repeated_cursor_stops() {
        let source = ScriptedSource::new(vec![
            page(vec![item(1, "a", DATE_2025)], Some("same")),
            page(vec![item(2, "b", DATE_2025)], Some("same")),
            page(vec![item(3, "c", DATE_2025)], Some("other")),
        ]);
        let run = collector(source.clone(), config(&["soja"]))
            .run(&CancellationToken::new())
            .await;
        assert_eq!(run.queries[0].stop, StopReason::RepeatedCursor);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_dedup_across_queries() {
        let source = ScriptedSource::new(vec![
            page(vec![item(1, MATCH_TEXT, DATE_2025)], None),
            page(
                vec![item(1, MATCH_TEXT, DATE_2025), item(2, "outra", DATE_2025)],
                None,
            ),
        ]);
        let run = collector(source, config(&["soja", "safra"]))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(run.stats.duplicates_skipped, 1);
        assert_eq!(run.stats.posts_seen, 2);
        assert_eq!(run.stats.final_matches, 1);
        assert_eq!(run.posts.len(), 1);
        assert_eq!(run.queries[1].new_posts, 1);
    }

    #[tokio::test]
    async fn test_forbidden_is_fatal_and_keeps_partial_results() {
        let source = ScriptedSource::new(vec![
            page(vec![item(1, MATCH_TEXT, DATE_2025)], Some("c1")),
            Err(RequestError::Forbidden),
        ]);
        let run = collector(source.clone(), config(&["soja", "milho"]))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(run.queries.len(), 1);
        assert_eq!(run.queries[0].stop, StopReason::Fatal);
        assert!(run.fatal_error.is_some());
        assert_eq!(run.posts.len(), 1);
        assert_eq!(source.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_transport_error_skips_to_next_query() {
        let source = ScriptedSource::new(vec![
            Err(RequestError::Transport("HTTP 502".into())),
            page(vec![item(1, MATCH_TEXT, DATE_2025)], None),
        ]);
        let run = collector(source, config(&["soja", "milho"]))
            .run(&CancellationToken::new())
            .await;

        assert_eq!(run.queries[0].stop, StopReason::PageFailed);
        assert_eq!(run.queries[1].stop, StopReason::NoCursor);
        assert_eq!(run.stats.final_matches, 1);
    }

    #[tokio::test]
    async fn test_malformed_items_counted_and_skipped() {
        let source = ScriptedSource::new(vec![page(
            vec![json!({"record": {}}), item(1, MATCH_TEXT, DATE_2025), json!(42)],
            None,
        )]);
        let run = collector(source, config(&["soja"]))
            .run(&CancellationToken::new())
            .await;
        assert_eq!(run.stats.parse_errors, 2);
        assert_eq!(run.stats.posts_seen, 1);
    }

    #[tokio::test]
    async fn test_unusable_search_falls_back_to_feed_and_flags_batches() {
        let source = ScriptedSource::new(vec![
            Ok(Page::default()),
            page(vec![json!({"post": item(1, MATCH_TEXT, DATE_2025)})], None),
        ]);
        let mut cfg = config(&["soja"]);
        cfg.fallback_to_timeline = true;
        let run = collector(source.clone(), cfg)
            .run(&CancellationToken::new())
            .await;

        let calls = source.calls();
        assert_eq!(calls[0].0, Endpoint::SearchPosts);
        assert_eq!(calls[1].0, Endpoint::Timeline);
        assert!(calls[1].1.contains(&("limit", "25".to_string())));
        assert!(!calls[1].1.iter().any(|(k, _)| *k == "q"));

        assert!(run.queries[0].used_fallback);
        assert!(run.stats.used_fallback());
        assert!(run.stats.batches.iter().all(|b| b.used_fallback));
        assert_eq!(run.stats.final_matches, 1);
    }

    #[tokio::test]
    async fn test_unusable_search_without_fallback_stops() {
        let source = ScriptedSource::new(vec![Ok(Page::default())]);
        let run = collector(source.clone(), config(&["soja"]))
            .run(&CancellationToken::new())
            .await;
        assert_eq!(run.queries[0].stop, StopReason::Exhausted);
        assert_eq!(source.calls().len(), 1);
        assert!(!run.stats.used_fallback());
    }

    #[tokio::test]
    async fn test_match_ceiling_ends_run() {
        let source = ScriptedSource::new(vec![
            page(
                vec![item(1, MATCH_TEXT, DATE_2025), item(2, MATCH_TEXT, DATE_2025)],
                Some("c1"),
            ),
            page(vec![item(3, MATCH_TEXT, DATE_2025)], None),
        ]);
        let mut cfg = config(&["soja", "milho"]);
        cfg.max_matches = Some(2);
        let run = collector(source.clone(), cfg)
            .run(&CancellationToken::new())
            .await;
        assert_eq!(run.queries.len(), 1);
        assert_eq!(run.queries[0].stop, StopReason::MatchCeiling);
        assert_eq!(source.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_request_ceilings() {
        let source = ScriptedSource::new(vec![
            page(vec![item(1, "a", DATE_2025)], Some("c1")),
            page(vec![item(2, "b", DATE_2025)], Some("c2")),
            page(vec![item(3, "c", DATE_2025)], Some("c3")),
        ]);
        let mut cfg = config(&["soja", "milho"]);
        cfg.max_requests_per_query = Some(1);
        cfg.max_requests = Some(2);
        let run = collector(source.clone(), cfg)
            .run(&CancellationToken::new())
            .await;
        assert_eq!(run.queries[0].stop, StopReason::QueryRequestCeiling);
        assert_eq!(run.queries[1].stop, StopReason::RequestCeiling);
        assert_eq!(run.stats.total_requests, 2);
    }

    #[tokio::test]
    async fn test_cancelled_run_reports_partial() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let source = ScriptedSource::new(vec![page(vec![item(1, "a", DATE_2025)], None)]);
        let run = collector(source.clone(), config(&["soja"])).run(&cancel).await;
        assert!(run.stats.interrupted);
        assert_eq!(run.queries[0].stop, StopReason::Interrupted);
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn test_retain_all_keeps_every_distinct_post() {
        let source = ScriptedSource::new(vec![page(
            vec![item(1, MATCH_TEXT, DATE_2025), item(2, "nada", "2024-01-01T00:00:00Z")],
            None,
        )]);
        let mut cfg = config(&["soja"]);
        cfg.retain = RetainPolicy::All;
        let run = collector(source, cfg).run(&CancellationToken::new()).await;
        assert_eq!(run.posts.len(), 2);
        assert!(run.posts[0].verdict.is_final_match);
        assert!(!run.posts[1].verdict.is_final_match);
    }

    #[test]
    fn test_search_params() {
        let cfg = CollectorConfig {
            page_limit: 100,
            ..Default::default()
        };
        let params = cfg.params(Endpoint::SearchPosts, "agronegócio", Some("abc"));
        assert_eq!(
            params,
            vec![
                ("q", "\"agronegócio\" lang:pt".to_string()),
                ("limit", "25".to_string()),
                ("since", "2025-01-01T00:00:00Z".to_string()),
                ("until", "2025-12-31T23:59:59Z".to_string()),
                ("cursor", "abc".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_shaping_can_be_disabled() {
        let cfg = CollectorConfig {
            exact_phrase: false,
            search_language: None,
            ..Default::default()
        };
        assert_eq!(cfg.search_query("soja"), "soja");

        let cfg = CollectorConfig {
            search_language: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(cfg.search_query("soja"), "\"soja\"");
    }

    #[test]
    fn test_stop_reason_ends_run() {
        assert!(StopReason::Fatal.ends_run());
        assert!(StopReason::MatchCeiling.ends_run());
        assert!(!StopReason::NoCursor.ends_run());
        assert!(!StopReason::PageFailed.ends_run());
    }
}
