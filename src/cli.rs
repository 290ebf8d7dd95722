//! Command-line interface definitions for ThreadJuice.
//!
//! Credentials can be passed as flags or through the environment
//! (`REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USER_AGENT`,
//! `TWITTER_BEARER_TOKEN`).

use crate::models::Platform;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Turn viral Reddit and Twitter threads into story JSON.
///
/// # Examples
///
/// ```sh
/// # Five stories into ./stories
/// threadjuice generate --count 5 --output-dir ./stories
///
/// # One story every 30 minutes until interrupted, from a single subreddit
/// threadjuice generate --interval 30 --subreddit tifu
///
/// # Rank today's most viral posts without generating anything
/// threadjuice discover --limit 20
///
/// # Quality report for a story file
/// threadjuice score stories/2026-10-16/the-egg-ledger.json
/// ```
#[derive(Parser, Debug)]
#[command(author, version, about)]
pub struct Cli {
    /// Pipeline config (YAML); every field is optional
    #[arg(short, long, global = true, env = "THREADJUICE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub credentials: Credentials,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone, Default)]
pub struct Credentials {
    #[arg(long, global = true, env = "REDDIT_CLIENT_ID", hide_env_values = true)]
    pub reddit_client_id: Option<String>,

    #[arg(long, global = true, env = "REDDIT_CLIENT_SECRET", hide_env_values = true)]
    pub reddit_client_secret: Option<String>,

    /// Overrides `reddit.user_agent` from the pipeline config
    #[arg(long, global = true, env = "REDDIT_USER_AGENT")]
    pub reddit_user_agent: Option<String>,

    #[arg(long, global = true, env = "TWITTER_BEARER_TOKEN", hide_env_values = true)]
    pub twitter_bearer_token: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch, generate, score and store stories
    Generate(GenerateArgs),
    /// Rank viral posts across the discovery subreddits and print them as JSON
    Discover(DiscoverArgs),
    /// Print the quality report and moderation verdict for a story JSON file
    Score(ScoreArgs),
}

#[derive(Args, Debug)]
pub struct GenerateArgs {
    /// Stories to generate in this batch
    #[arg(short = 'n', long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    pub count: u32,

    /// Force a source instead of the Reddit/Twitter rotation
    #[arg(short, long, value_enum)]
    pub source: Option<Platform>,

    /// Only pull from this subreddit
    #[arg(long)]
    pub subreddit: Option<String>,

    /// Run the whole pipeline but write nothing
    #[arg(long)]
    pub dry_run: bool,

    /// Store stories below the quality threshold and skip the duplicate check
    #[arg(long)]
    pub force: bool,

    /// Minutes between batches of `--count` stories; keeps running until SIGINT/SIGTERM
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: Option<u64>,

    /// Where story JSON and index.json are written
    #[arg(short, long, default_value = "stories")]
    pub output_dir: PathBuf,

    /// LLM connection config; defaults to config.yaml in the awful_aj config dir
    #[arg(long)]
    pub llm_config: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    /// Candidates to print (overrides `discovery.limit`)
    #[arg(short, long)]
    pub limit: Option<usize>,

    /// hour, day, week, month, year or all
    #[arg(short, long)]
    pub timeframe: Option<String>,

    /// Scan only these subreddits (repeatable)
    #[arg(long = "subreddit")]
    pub subreddits: Vec<String>,

    /// Skip posts already in this output directory's index
    #[arg(short, long, default_value = "stories")]
    pub output_dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// A story file: raw model output or a stored story
    pub file: PathBuf,

    /// Category name to score against (default: the stored story's, else `default_category`)
    #[arg(long)]
    pub category: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_defaults() {
        let cli = Cli::parse_from(["threadjuice", "generate"]);
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.count, 1);
        assert_eq!(args.output_dir, PathBuf::from("stories"));
        assert!(!args.dry_run && !args.force);
        assert!(args.interval.is_none());
        assert!(args.source.is_none());
    }

    #[test]
    fn test_generate_flags() {
        let cli = Cli::parse_from([
            "threadjuice",
            "generate",
            "--count",
            "5",
            "--source",
            "twitter",
            "--subreddit",
            "tifu",
            "--dry-run",
            "--force",
            "--interval",
            "30",
            "-o",
            "/tmp/out",
            "--llm-config",
            "/tmp/llm.yaml",
            "--config",
            "pipeline.yaml",
        ]);
        assert_eq!(cli.config, Some(PathBuf::from("pipeline.yaml")));
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.count, 5);
        assert_eq!(args.source, Some(Platform::Twitter));
        assert_eq!(args.subreddit.as_deref(), Some("tifu"));
        assert!(args.dry_run && args.force);
        assert_eq!(args.interval, Some(30));
        assert_eq!(args.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(args.llm_config, Some(PathBuf::from("/tmp/llm.yaml")));
    }

    #[test]
    fn test_zero_count_is_rejected() {
        assert!(Cli::try_parse_from(["threadjuice", "generate", "--count", "0"]).is_err());
        assert!(Cli::try_parse_from(["threadjuice", "generate", "--interval", "0"]).is_err());
    }

    #[test]
    fn test_discover_and_score() {
        let cli = Cli::parse_from([
            "threadjuice",
            "discover",
            "--timeframe",
            "hour",
            "--subreddit",
            "tifu",
            "--subreddit",
            "antiwork",
        ]);
        let Command::Discover(args) = cli.command else {
            panic!("expected discover");
        };
        assert_eq!(args.timeframe.as_deref(), Some("hour"));
        assert_eq!(args.subreddits, vec!["tifu", "antiwork"]);

        let cli = Cli::parse_from(["threadjuice", "score", "story.json", "--category", "Food Wars"]);
        let Command::Score(args) = cli.command else {
            panic!("expected score");
        };
        assert_eq!(args.file, PathBuf::from("story.json"));
        assert_eq!(args.category.as_deref(), Some("Food Wars"));
    }

    #[test]
    fn test_credentials_flags() {
        let cli = Cli::parse_from([
            "threadjuice",
            "discover",
            "--reddit-client-id",
            "id",
            "--reddit-client-secret",
            "secret",
        ]);
        assert_eq!(cli.credentials.reddit_client_id.as_deref(), Some("id"));
        assert_eq!(cli.credentials.reddit_client_secret.as_deref(), Some("secret"));
    }
}
