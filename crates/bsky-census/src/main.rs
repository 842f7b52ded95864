//! bsky-census CLI - collect and classify Bluesky search results.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bsky_census::analysis::{Classifier, ClassifierConfig, EngagementSummary};
use bsky_census::auth::{Credentials, SessionManager};
use bsky_census::bluesky::{
    build_client, BackoffPolicy, BackoffScope, Post, RateLimitedRequester, DEFAULT_BASE_URL,
    DEFAULT_USER_AGENT,
};
use bsky_census::pipeline::{
    CollectionRun, CollectorConfig, DateWindow, PaginatedCollector, RetainPolicy,
    DEFAULT_SEARCH_LANGUAGE,
};

/// bsky-census - count and collect Bluesky posts by topic, year, and locale.
#[derive(Parser)]
#[command(name = "bsky-census")]
#[command(about = "Bluesky search collector and classifier")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the configured queries and report counts
    Collect(Box<CollectArgs>),

    /// Classify a single post text (lexicon check)
    Classify {
        /// Post text
        text: String,

        /// Creation timestamp (ISO-8601)
        #[arg(long, default_value = "2025-01-01T00:00:00Z")]
        created_at: String,

        /// Language tags
        #[arg(long = "lang")]
        langs: Vec<String>,

        /// Author handle
        #[arg(long, default_value = "someone.bsky.social")]
        handle: String,

        /// TOML lexicon overrides
        #[arg(long)]
        lexicon: Option<PathBuf>,
    },

    /// Print the effective lexicon as TOML
    Lexicon {
        /// TOML lexicon overrides
        #[arg(long)]
        lexicon: Option<PathBuf>,
    },

    /// Summarize a saved run report
    Summarize {
        /// Run report written by `collect --output`
        input: PathBuf,
    },
}

#[derive(clap::Args)]
pub struct CollectArgs {
    /// Account handle or email
    #[arg(long, env = "BLUESKY_IDENTIFIER")]
    identifier: String,

    /// App password
    #[arg(long, env = "BLUESKY_PASSWORD", hide_env_values = true)]
    password: String,

    /// PDS base URL
    #[arg(long, default_value = DEFAULT_BASE_URL)]
    base_url: String,

    /// Search query (repeatable; defaults to the agribusiness terms)
    #[arg(short, long = "query")]
    queries: Vec<String>,

    /// TOML lexicon overrides
    #[arg(long)]
    lexicon: Option<PathBuf>,

    /// Target year (also sets the search date window)
    #[arg(long)]
    year: Option<i32>,

    /// Do not send since/until with search calls
    #[arg(long)]
    no_window: bool,

    /// Run-wide request ceiling
    #[arg(long)]
    max_requests: Option<u64>,

    /// Per-query request ceiling
    #[arg(long, default_value = "2000")]
    max_requests_per_query: u64,

    /// Stop after this many final matches
    #[arg(long)]
    max_matches: Option<u64>,

    /// Delay between pages in milliseconds
    #[arg(long, default_value = "1500")]
    delay_ms: u64,

    /// Send queries unquoted instead of as exact phrases
    #[arg(long)]
    no_exact_phrase: bool,

    /// lang:<code> search operator appended to each query (empty to omit)
    #[arg(long, default_value = DEFAULT_SEARCH_LANGUAGE)]
    search_lang: String,

    /// Page the generic feed when search returns an unusable shape
    #[arg(long)]
    fallback: bool,

    /// Which posts to keep in the report
    #[arg(long, value_enum, default_value = "final-matches")]
    retain: RetainArg,

    /// Backoff base in seconds for 429 responses
    #[arg(long, default_value = "60")]
    backoff_base_secs: u64,

    /// Backoff cap in seconds
    #[arg(long, default_value = "300")]
    backoff_cap_secs: u64,

    /// 429 retries allowed per call
    #[arg(long, default_value = "12")]
    max_retries: u32,

    /// Restart the backoff counter for every call
    #[arg(long)]
    per_call_backoff: bool,

    /// Local token lifetime estimate in seconds
    #[arg(long, default_value = "300")]
    token_ttl_secs: i64,

    /// HTTP timeout in seconds
    #[arg(long, default_value = "30")]
    timeout_secs: u64,

    /// Write the run report as JSON
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum RetainArg {
    FinalMatches,
    All,
    None,
}

impl From<RetainArg> for RetainPolicy {
    fn from(arg: RetainArg) -> Self {
        match arg {
            RetainArg::FinalMatches => Self::FinalMatches,
            RetainArg::All => Self::All,
            RetainArg::None => Self::None,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("bsky_census=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bsky_census=info,warn"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Collect(args) => run_collect(*args).await,
        Commands::Classify {
            text,
            created_at,
            langs,
            handle,
            lexicon,
        } => run_classify(text, created_at, langs, handle, lexicon.as_deref()),
        Commands::Lexicon { lexicon } => {
            let config = load_lexicon(lexicon.as_deref())?;
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
        Commands::Summarize { input } => run_summarize(&input),
    }
}

fn load_lexicon(path: Option<&Path>) -> Result<ClassifierConfig> {
    match path {
        Some(path) => ClassifierConfig::load(path)
            .with_context(|| format!("Failed to load lexicon {}", path.display())),
        None => Ok(ClassifierConfig::default()),
    }
}

async fn run_collect(args: CollectArgs) -> Result<()> {
    let mut lexicon = load_lexicon(args.lexicon.as_deref())?;
    if let Some(year) = args.year {
        lexicon = lexicon.with_target_year(year);
    }
    let classifier = Arc::new(Classifier::new(&lexicon).context("Invalid lexicon")?);

    let client = build_client(DEFAULT_USER_AGENT, Duration::from_secs(args.timeout_secs))
        .context("Failed to build HTTP client")?;

    let session = Arc::new(
        SessionManager::new(client.clone(), &args.base_url)
            .with_ttl(chrono::Duration::seconds(args.token_ttl_secs)),
    );
    session
        .authenticate(&Credentials::new(&args.identifier, &args.password))
        .await
        .context("Authentication failed")?;

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, finishing with partial results");
            ctrl_c_token.cancel();
        }
    });

    let policy = BackoffPolicy {
        base: Duration::from_secs(args.backoff_base_secs),
        cap: Duration::from_secs(args.backoff_cap_secs),
        max_retries: args.max_retries,
        scope: if args.per_call_backoff {
            BackoffScope::PerCall
        } else {
            BackoffScope::Run
        },
    };
    let requester = RateLimitedRequester::new(client, &args.base_url, session, policy)
        .with_cancellation(cancel.clone());

    let defaults = CollectorConfig::default();
    let config = CollectorConfig {
        queries: if args.queries.is_empty() {
            defaults.queries
        } else {
            args.queries
        },
        max_requests: args.max_requests,
        max_requests_per_query: Some(args.max_requests_per_query),
        max_matches: args.max_matches,
        inter_request_delay: Duration::from_millis(args.delay_ms),
        window: (!args.no_window).then(|| DateWindow::year(classifier.target_year())),
        exact_phrase: !args.no_exact_phrase,
        search_language: Some(args.search_lang).filter(|lang| !lang.is_empty()),
        fallback_to_timeline: args.fallback,
        retain: args.retain.into(),
        ..defaults
    };

    let collector = PaginatedCollector::new(Arc::new(requester), classifier, config);
    let run = collector.run(&cancel).await;

    print_run(&run);

    if let Some(path) = &args.output {
        let json = serde_json::to_string_pretty(&run)?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        println!("\n📄 Report saved to: {}", path.display());
    }

    if let Some(err) = &run.fatal_error {
        anyhow::bail!("Collection stopped early: {err}");
    }
    Ok(())
}

fn print_run(run: &CollectionRun) {
    if run.stats.interrupted {
        println!("\n⚠️  Interrupted - partial results");
    }

    println!("\n📊 Collection Summary");
    for line in run.stats.to_string().lines() {
        println!("   {line}");
    }
    println!("   Elapsed: {:.1}s", run.stats.elapsed_secs);

    println!("\n🔎 Queries");
    for outcome in &run.queries {
        println!(
            "   {:<16} {:>5} req  {:>6} new  {:>5} matches  {}{}",
            outcome.query,
            outcome.requests,
            outcome.new_posts,
            outcome.final_matches,
            outcome.stop,
            if outcome.used_fallback { " (fallback)" } else { "" }
        );
    }

    if !run.posts.is_empty() {
        print_summary(&run.summary());
    }
}

fn print_summary(summary: &EngagementSummary) {
    println!("\n💬 Engagement ({} posts)", summary.posts);
    println!(
        "   Likes: {} (avg {})",
        summary.total_likes,
        format_avg(summary.avg_likes)
    );
    println!(
        "   Reposts: {} (avg {})",
        summary.total_reposts,
        format_avg(summary.avg_reposts)
    );
    println!("   Replies: {}", summary.total_replies);

    if !summary.posts_by_month.is_empty() {
        println!("\n📅 By month");
        for (month, count) in &summary.posts_by_month {
            println!("   {month}: {count}");
        }
    }

    if !summary.top_authors.is_empty() {
        println!("\n👥 Top authors");
        for (rank, author) in summary.top_authors.iter().enumerate() {
            println!("   {:>2}. @{} ({})", rank + 1, author.handle, author.posts);
        }
    }
}

fn format_avg(avg: Option<f64>) -> String {
    avg.map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}"))
}

fn run_classify(
    text: String,
    created_at: String,
    langs: Vec<String>,
    handle: String,
    lexicon: Option<&Path>,
) -> Result<()> {
    let classifier = Classifier::new(&load_lexicon(lexicon)?).context("Invalid lexicon")?;
    let post = Post {
        uri: "at://local/check".to_string(),
        cid: String::new(),
        author_handle: handle,
        author_did: String::new(),
        author_display_name: None,
        text,
        created_at,
        language_tags: langs,
        like_count: 0,
        repost_count: 0,
        reply_count: 0,
        indexed_at: String::new(),
    };
    let verdict = classifier.classify(&post);
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    match verdict.locale_signal {
        Some(signal) => println!("\n🌎 Locale: {signal} - {}", signal.description()),
        None => println!("\n🌎 Locale: no signal"),
    }
    Ok(())
}

fn run_summarize(input: &Path) -> Result<()> {
    let content = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let run: CollectionRun = serde_json::from_str(&content).context("Invalid run report")?;
    print_run(&run);
    Ok(())
}
