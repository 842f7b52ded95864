//! Run statistics.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::analysis::{ClassificationVerdict, LocaleSignal};
use crate::bluesky::{Endpoint, SourceTelemetry};

/// One processed page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRecord {
    /// Query the page belongs to.
    pub query: String,
    /// Endpoint that served it.
    pub endpoint: Endpoint,
    /// Raw items on the page.
    pub items: usize,
    /// Items not seen before in this run.
    pub new_posts: usize,
    /// Final matches among the new posts.
    pub final_matches: usize,
    /// Served by the generic feed instead of search; looser recall.
    pub used_fallback: bool,
}

/// Counters accumulated over one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunStats {
    /// Page requests issued by the collector.
    pub total_requests: u64,
    /// Pages that returned successfully.
    pub pages_fetched: u64,
    /// Distinct posts classified (after dedup).
    pub posts_seen: u64,
    /// Posts skipped because an earlier page or query already had them.
    pub duplicates_skipped: u64,
    /// Items or pages dropped as malformed.
    pub parse_errors: u64,
    pub temporal_matches: u64,
    pub topic_matches: u64,
    pub locale_matches: u64,
    /// Locale matches by the sub-check that accepted them.
    #[serde(default)]
    pub locale_signals: BTreeMap<LocaleSignal, u64>,
    /// Posts matching all three predicates.
    pub final_matches: u64,
    /// HTTP requests including retries.
    pub http_requests: u64,
    /// Backoff sleeps after 429s.
    pub rate_limit_waits: u64,
    /// Successful token refreshes.
    pub token_renewals: u64,
    /// Per-page records, in fetch order.
    pub batches: Vec<BatchRecord>,
    /// Wall-clock duration of the run.
    pub elapsed_secs: f64,
    /// Whether the run was stopped by an external interrupt.
    pub interrupted: bool,
}

impl RunStats {
    /// Count an issued page request.
    pub fn record_request(&mut self) {
        self.total_requests += 1;
    }

    /// Count a post already seen earlier in the run.
    pub fn record_duplicate(&mut self) {
        self.duplicates_skipped += 1;
    }

    /// Count malformed items or pages.
    pub fn record_parse_errors(&mut self, count: usize) {
        self.parse_errors += count as u64;
    }

    /// Tally a first-sighting verdict.
    pub fn record_verdict(&mut self, verdict: &ClassificationVerdict) {
        self.posts_seen += 1;
        self.temporal_matches += u64::from(verdict.is_in_target_period);
        self.topic_matches += u64::from(verdict.is_topic_match);
        self.locale_matches += u64::from(verdict.is_locale_match);
        if let Some(signal) = verdict.locale_signal {
            *self.locale_signals.entry(signal).or_insert(0) += 1;
        }
        self.final_matches += u64::from(verdict.is_final_match);
    }

    /// Append a processed page.
    pub fn record_batch(&mut self, batch: BatchRecord) {
        self.pages_fetched += 1;
        self.batches.push(batch);
    }

    /// Add the source counters accumulated during this run.
    pub fn apply_telemetry(&mut self, delta: SourceTelemetry) {
        self.http_requests += delta.http_requests;
        self.rate_limit_waits += delta.rate_limit_waits;
        self.token_renewals += delta.token_renewals;
    }

    /// `final_matches / posts_seen`; `None` before any post was seen.
    #[must_use]
    pub fn precision_rate(&self) -> Option<f64> {
        ratio(self.final_matches, self.posts_seen)
    }

    /// `posts_seen / total_requests`; `None` before any request.
    #[must_use]
    pub fn request_efficiency(&self) -> Option<f64> {
        ratio(self.posts_seen, self.total_requests)
    }

    /// Whether any page came from the fallback feed.
    #[must_use]
    pub fn used_fallback(&self) -> bool {
        self.batches.iter().any(|b| b.used_fallback)
    }

    /// Final matches that came from fallback pages.
    #[must_use]
    pub fn fallback_final_matches(&self) -> usize {
        self.batches
            .iter()
            .filter(|b| b.used_fallback)
            .map(|b| b.final_matches)
            .sum()
    }
}

fn ratio(numerator: u64, denominator: u64) -> Option<f64> {
    if denominator == 0 {
        None
    } else {
        Some(numerator as f64 / denominator as f64)
    }
}

/// Render an optional rate, `N/A` when undefined.
#[must_use]
pub fn format_rate(rate: Option<f64>, percent: bool) -> String {
    match rate {
        Some(r) if percent => format!("{:.3}%", r * 100.0),
        Some(r) => format!("{r:.1}"),
        None => "N/A".to_string(),
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Requests:            {}", self.total_requests)?;
        writeln!(f, "HTTP requests:       {}", self.http_requests)?;
        writeln!(f, "Rate-limit waits:    {}", self.rate_limit_waits)?;
        writeln!(f, "Token renewals:      {}", self.token_renewals)?;
        writeln!(f, "Pages:               {}", self.pages_fetched)?;
        writeln!(f, "Unique posts:        {}", self.posts_seen)?;
        writeln!(f, "Duplicates skipped:  {}", self.duplicates_skipped)?;
        writeln!(f, "Parse errors:        {}", self.parse_errors)?;
        writeln!(f, "In target period:    {}", self.temporal_matches)?;
        writeln!(f, "Topic matches:       {}", self.topic_matches)?;
        writeln!(f, "Locale matches:      {}", self.locale_matches)?;
        for signal in LocaleSignal::all() {
            if let Some(count) = self.locale_signals.get(signal) {
                writeln!(f, "  via {signal:<16} {count}")?;
            }
        }
        writeln!(f, "Final matches:       {}", self.final_matches)?;
        if self.used_fallback() {
            writeln!(
                f,
                "  of which fallback: {} (generic feed, looser recall)",
                self.fallback_final_matches()
            )?;
        }
        writeln!(
            f,
            "Precision:           {}",
            format_rate(self.precision_rate(), true)
        )?;
        write!(
            f,
            "Efficiency:          {} posts/request",
            format_rate(self.request_efficiency(), false)
        )
    }
}
