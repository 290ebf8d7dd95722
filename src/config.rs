//! Pipeline configuration.
//!
//! Tuning lives in an optional YAML file; every field has a default, so an
//! empty file (or no file at all) yields a working setup. The LLM endpoint
//! and model are not configured here: those come from the `awful_aj`
//! `config.yaml` in its own config directory.
//!
//! ```yaml
//! subreddits: [tifu, MaliciousCompliance]
//! reddit:
//!   requests_per_minute: 30
//! pipeline:
//!   seed: 42
//! ```

use crate::models::{Category, Persona};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, instrument};

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Reddit client tuning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub user_agent: String,
    pub requests_per_minute: u32,
    /// Bucket capacity; a quarter of the per-minute rate when unset.
    pub burst: Option<u32>,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Posts requested per listing when picking a story source.
    pub listing_limit: u32,
    pub time_filter: String,
    pub comment_limit: u32,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            user_agent: "ThreadJuice/1.0 (Content Aggregator)".into(),
            requests_per_minute: 60,
            burst: Some(15),
            max_retries: 3,
            base_delay_ms: 1000,
            max_delay_ms: 60_000,
            listing_limit: 10,
            time_filter: "day".into(),
            comment_limit: 100,
        }
    }
}

impl RedditConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

/// Viral discovery across many subreddits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub subreddits: Vec<String>,
    /// `hour`, `day`, `week`, `month`, `year` or `all`.
    pub timeframe: String,
    pub per_listing_limit: u32,
    /// Candidates kept after ranking.
    pub limit: usize,
    /// Minimum engagement score; 1000 for `hour`, 5000 otherwise when unset.
    pub min_engagement: Option<i64>,
    pub nsfw_allowed: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            subreddits: strings(&[
                "AmItheAsshole",
                "relationship_advice",
                "tifu",
                "TrueOffMyChest",
                "confessions",
                "antiwork",
                "WorkReform",
                "MaliciousCompliance",
                "pettyrevenge",
                "ProRevenge",
                "JUSTNOMIL",
                "entitledparents",
                "raisedbynarcissists",
                "ChoosingBeggars",
                "niceguys",
                "Nicegirls",
                "Tinder",
                "PublicFreakout",
                "HolUp",
                "facepalm",
                "therewasanattempt",
                "Whatcouldgowrong",
                "pcmasterrace",
                "gaming",
                "LivestreamFail",
            ]),
            timeframe: "day".into(),
            per_listing_limit: 50,
            limit: 10,
            min_engagement: None,
            nsfw_allowed: strings(&["relationship_advice", "tifu"]),
        }
    }
}

impl DiscoveryConfig {
    pub fn min_engagement(&self) -> i64 {
        self.min_engagement
            .unwrap_or(if self.timeframe == "hour" { 1000 } else { 5000 })
    }
}

/// Retry policy and template name for story generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// `awful_aj` template name, loaded from its template directory.
    pub template: String,
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            template: "threadjuice_story".into(),
            max_retries: 5,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl LlmConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TwitterConfig {
    pub enabled: bool,
    pub monthly_limit: u32,
    pub daily_limit: u32,
    pub query: String,
    /// 10..=100 per the recent-search API.
    pub max_results: u32,
    /// Source every Nth story from Twitter; 0 disables the rotation.
    pub every_nth_story: u64,
}

impl Default for TwitterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            monthly_limit: 100,
            daily_limit: 3,
            query: "(drama OR viral OR unhinged) -is:retweet -is:reply lang:en".into(),
            max_results: 10,
            every_nth_story: 50,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityConfig {
    pub publish_threshold: f64,
    pub premium_threshold: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            publish_threshold: 0.70,
            premium_threshold: 0.85,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub strict_mode: bool,
    pub custom_blocklist: Vec<String>,
    pub allowed_exceptions: Vec<String>,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            strict_mode: true,
            custom_blocklist: Vec::new(),
            allowed_exceptions: Vec::new(),
        }
    }
}

/// Batch pacing and run limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub story_delay_ms: u64,
    /// Hard cap on stories generated across the life of the state file.
    pub max_stories: u64,
    /// Seeds the RNG used for subreddit, post, persona and reaction picks.
    pub seed: Option<u64>,
    pub state_file: PathBuf,
    pub max_comments: usize,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            story_delay_ms: 2000,
            max_stories: 1000,
            seed: None,
            state_file: PathBuf::from("threadjuice-state.json"),
            max_comments: 6,
        }
    }
}

/// A category and the subreddits that map to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRule {
    #[serde(flatten)]
    pub category: Category,
    #[serde(default)]
    pub subreddits: Vec<String>,
}

fn rule(name: &str, slug: &str, color: &str, subreddits: &[&str]) -> CategoryRule {
    CategoryRule {
        category: Category {
            name: name.into(),
            slug: slug.into(),
            color: color.into(),
        },
        subreddits: strings(subreddits),
    }
}

fn default_categories() -> Vec<CategoryRule> {
    vec![
        rule(
            "Relationship Drama",
            "relationships",
            "#e91e63",
            &["AmItheAsshole", "relationship_advice", "Tinder", "niceguys", "Nicegirls"],
        ),
        rule(
            "Workplace Drama",
            "workplace",
            "#ff9800",
            &["antiwork", "WorkReform", "MaliciousCompliance"],
        ),
        rule(
            "Family Drama",
            "family",
            "#9c27b0",
            &["JUSTNOMIL", "entitledparents", "raisedbynarcissists"],
        ),
        rule(
            "Internet Drama",
            "internet",
            "#2196f3",
            &[
                "ChoosingBeggars",
                "mildlyinfuriating",
                "facepalm",
                "pettyrevenge",
                "ProRevenge",
                "TrueOffMyChest",
                "confessions",
                "tifu",
                "PublicFreakout",
                "HolUp",
                "therewasanattempt",
                "Whatcouldgowrong",
            ],
        ),
        rule("Tech Drama", "tech", "#607d8b", &["pcmasterrace", "techsupportgore"]),
        rule("Gaming", "gaming", "#4caf50", &["gaming", "LivestreamFail"]),
        rule("Food Wars", "food", "#f44336", &["KitchenConfidential", "Cooking", "food"]),
    ]
}

fn default_category() -> Category {
    Category {
        name: "Internet Drama".into(),
        slug: "internet".into(),
        color: "#2196f3".into(),
    }
}

/// Everything the pipeline reads from `threadjuice.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Light-hearted subreddits a story is drawn from.
    pub subreddits: Vec<String>,
    pub reddit: RedditConfig,
    pub discovery: DiscoveryConfig,
    pub llm: LlmConfig,
    pub twitter: TwitterConfig,
    pub quality: QualityConfig,
    pub moderation: ModerationConfig,
    pub pipeline: RunConfig,
    pub personas: Vec<Persona>,
    pub categories: Vec<CategoryRule>,
    pub default_category: Category,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            subreddits: strings(&[
                "ChoosingBeggars",
                "mildlyinfuriating",
                "facepalm",
                "AmItheAsshole",
                "relationship_advice",
                "tifu",
                "MaliciousCompliance",
                "entitledparents",
                "pettyrevenge",
                "TrueOffMyChest",
            ]),
            reddit: RedditConfig::default(),
            discovery: DiscoveryConfig::default(),
            llm: LlmConfig::default(),
            twitter: TwitterConfig::default(),
            quality: QualityConfig::default(),
            moderation: ModerationConfig::default(),
            pipeline: RunConfig::default(),
            personas: vec![Persona::default()],
            categories: default_categories(),
            default_category: default_category(),
        }
    }
}

impl PipelineConfig {
    /// Category for a subreddit, case-insensitively, falling back to the default.
    pub fn category_for(&self, subreddit: Option<&str>) -> &Category {
        subreddit
            .and_then(|sub| {
                self.categories
                    .iter()
                    .find(|r| r.subreddits.iter().any(|s| s.eq_ignore_ascii_case(sub)))
            })
            .map(|r| &r.category)
            .unwrap_or(&self.default_category)
    }

    /// Reject settings that would make the pipeline spin or never run.
    pub fn validate(&self) -> Result<(), String> {
        if self.subreddits.is_empty() {
            return Err("subreddits must not be empty".into());
        }
        if self.personas.is_empty() {
            return Err("at least one persona is required".into());
        }
        if self.reddit.requests_per_minute == 0 {
            return Err("reddit.requests_per_minute must be positive".into());
        }
        if !(10..=100).contains(&self.twitter.max_results) {
            return Err("twitter.max_results must be between 10 and 100".into());
        }
        let q = &self.quality;
        if !(0.0..=1.0).contains(&q.publish_threshold) || !(0.0..=1.0).contains(&q.premium_threshold) {
            return Err("quality thresholds must be within 0..=1".into());
        }
        Ok(())
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, serde_yaml::Error> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Load from `path`, or the defaults when no path is given.
    #[instrument(level = "info")]
    pub async fn load(path: Option<&Path>) -> Result<Self, Box<dyn Error>> {
        let Some(path) = path else {
            debug!("No pipeline config given; using defaults");
            return Ok(Self::default());
        };

        let raw = tokio::fs::read_to_string(path).await?;
        let config = Self::from_yaml(&raw)?;
        config.validate()?;
        info!(
            path = %path.display(),
            subreddits = config.subreddits.len(),
            personas = config.personas.len(),
            "Loaded pipeline config"
        );
        Ok(config)
    }
}
