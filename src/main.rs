//! # ThreadJuice
//!
//! A content pipeline that turns viral Reddit threads (and, on a quota, a
//! tweet) into persona-voiced story JSON, gated by heuristic quality and
//! moderation checks.
//!
//! ## Features
//!
//! - Reddit OAuth or public JSON access behind a token bucket and backoff
//! - Twitter recent search under a monthly and daily call quota
//! - Viral discovery ranked by engagement across many subreddits
//! - Story generation through an OpenAI-compatible LLM via `awful_aj`
//! - Quality scoring, emotion-driven reaction terms and topic moderation
//! - Story JSON files plus an `index.json` used for duplicate detection
//!
//! ## Usage
//!
//! ```sh
//! threadjuice generate --count 5 -o ./stories
//! threadjuice generate --interval 30
//! threadjuice discover --timeframe hour
//! threadjuice score ./stories/2026-10-16/the-egg-ledger.json
//! ```
//!
//! ## Architecture
//!
//! 1. **Fetch**: pick a subreddit (or Twitter on its turn) and a fresh post
//! 2. **Generate**: prompt the LLM, parse and validate the story JSON
//! 3. **Enrich**: slug, category, comments, reactions, quality report
//! 4. **Gate & store**: publish threshold, then story JSON and the index

use clap::Parser;
use std::error::Error;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod analysis;
mod cli;
mod config;
mod error;
mod llm;
mod models;
mod outputs;
mod pipeline;
mod ratelimit;
mod sources;
mod utils;

use analysis::{Moderator, QualityChecker, score_story};
use cli::{Cli, Command, Credentials, DiscoverArgs, GenerateArgs, ScoreArgs};
use config::PipelineConfig;
use llm::LlmContext;
use models::Platform;
use outputs::indexes::StoryIndex;
use pipeline::generate::parse_story_file;
use pipeline::state::RunState;
use pipeline::{Pipeline, RunOptions};
use sources::{RedditClient, RedditCredentials, TwitterClient};
use utils::ensure_writable_dir;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "threadjuice starting up");

    let args = Cli::parse();
    debug!(?args.command, config = ?args.config, "Parsed CLI arguments");

    let config = PipelineConfig::load(args.config.as_deref()).await?;

    let result = match args.command {
        Command::Generate(gen_args) => generate(config, &args.credentials, gen_args).await,
        Command::Discover(disc_args) => discover(config, &args.credentials, disc_args).await,
        Command::Score(score_args) => score(&config, score_args).await,
    };

    let elapsed = start_time.elapsed();
    match &result {
        Ok(()) => info!(elapsed_secs = elapsed.as_secs_f64(), "threadjuice finished"),
        Err(e) => error!(elapsed_secs = elapsed.as_secs_f64(), error = %e, "threadjuice failed"),
    }
    result
}

fn http_client() -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()
}

fn reddit_client(
    http: reqwest::Client,
    config: &PipelineConfig,
    credentials: &Credentials,
) -> RedditClient {
    let reddit_credentials = match (&credentials.reddit_client_id, &credentials.reddit_client_secret) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => Some(RedditCredentials {
            client_id: id.clone(),
            client_secret: secret.clone(),
        }),
        _ => {
            warn!("No Reddit credentials; using the public JSON endpoints");
            None
        }
    };
    RedditClient::new(
        http,
        &config.reddit,
        reddit_credentials,
        credentials.reddit_user_agent.clone(),
    )
}

#[instrument(level = "info", skip_all, fields(count = args.count, interval = ?args.interval))]
async fn generate(
    config: PipelineConfig,
    credentials: &Credentials,
    args: GenerateArgs,
) -> Result<(), Box<dyn Error>> {
    // Early check: ensure the output dir is writable before spending API calls.
    if !args.dry_run {
        if let Err(e) = ensure_writable_dir(&args.output_dir).await {
            error!(
                path = %args.output_dir.display(),
                error = %e,
                "Output directory is not writable (fix perms or choose a different path)"
            );
            return Err(e);
        }
    }

    let llm_context = LlmContext::load(&config.llm, args.llm_config.as_deref()).await?;
    let llm = llm_context.client(&config.llm);

    let http = http_client()?;
    let reddit = reddit_client(http.clone(), &config, credentials);
    let twitter = config
        .twitter
        .enabled
        .then(|| TwitterClient::new(http, &config.twitter, credentials.twitter_bearer_token.clone()));
    if args.source == Some(Platform::Twitter) && !twitter.as_ref().is_some_and(TwitterClient::is_configured) {
        return Err("--source twitter needs twitter.enabled and TWITTER_BEARER_TOKEN".into());
    }

    let state = RunState::load(&config.pipeline.state_file, &config.twitter).await;
    let options = RunOptions {
        output_dir: args.output_dir,
        dry_run: args.dry_run,
        force: args.force,
        source: args.source,
        subreddit: args.subreddit,
    };
    let mut pipeline = Pipeline::new(config, reddit, twitter, llm, state, options);

    match args.interval {
        Some(minutes) => {
            info!(minutes, count = args.count, "Entering continuous mode");
            let summary = pipeline
                .run_continuous(args.count, Duration::from_secs(minutes * 60), shutdown_signal())
                .await;
            info!(?summary, "Continuous mode stopped");
            Ok(())
        }
        None => {
            let summary = pipeline.run_batch(args.count).await;
            if summary.all_failed() {
                return Err(format!("all {} stories failed", summary.attempted).into());
            }
            Ok(())
        }
    }
}

#[instrument(level = "info", skip_all)]
async fn discover(
    mut config: PipelineConfig,
    credentials: &Credentials,
    args: DiscoverArgs,
) -> Result<(), Box<dyn Error>> {
    if let Some(limit) = args.limit {
        config.discovery.limit = limit;
    }
    if let Some(timeframe) = args.timeframe {
        config.discovery.timeframe = timeframe;
    }
    if !args.subreddits.is_empty() {
        config.discovery.subreddits = args.subreddits;
    }

    let index = StoryIndex::load(&args.output_dir).await?;
    let exclude = index.source_ids(Platform::Reddit);

    let reddit = reddit_client(http_client()?, &config, credentials);
    let candidates = sources::discovery::discover(&reddit, &config.discovery, &exclude).await;
    println!("{}", serde_json::to_string_pretty(&candidates)?);
    Ok(())
}

#[instrument(level = "info", skip_all, fields(file = %args.file.display()))]
async fn score(config: &PipelineConfig, args: ScoreArgs) -> Result<(), Box<dyn Error>> {
    let raw = tokio::fs::read_to_string(&args.file).await?;
    let (story, stored_category) = parse_story_file(&raw)?;

    let category = args
        .category
        .or(stored_category)
        .unwrap_or_else(|| config.default_category.name.clone());
    let checker = QualityChecker::new(config.quality.publish_threshold, config.quality.premium_threshold);
    let moderator = Moderator::new(&config.moderation);

    let report = score_story(&story, &category, &checker, &moderator);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down"),
        _ = terminate => info!("Received SIGTERM, shutting down"),
    }
}
