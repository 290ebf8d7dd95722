//! Story production: fetch → generate → enrich → gate → store.
//!
//! - [`generate`]: prompt building, LLM call and story parsing
//! - [`enrich`]: slug, comments, reactions, media placeholders and quality
//! - [`state`]: counters and the Twitter quota ledger, persisted between runs
//!
//! [`Pipeline`] owns every client and runs one story at a time. Stories are
//! never produced concurrently: the Reddit limiter, the Twitter quota and
//! the index read-modify-write all assume a single writer.

pub mod enrich;
pub mod generate;
pub mod state;

use crate::analysis::moderation::Moderator;
use crate::analysis::quality::QualityChecker;
use crate::config::PipelineConfig;
use crate::llm::AskAsync;
use crate::models::{Platform, PublishStatus, SourcePost};
use crate::outputs::indexes::{StoryIndex, update_story_index};
use crate::outputs::json::write_story;
use crate::sources::reddit::{story_candidates, to_source_post};
use crate::sources::{RedditClient, Sort, TwitterClient};
use chrono::Utc;
use enrich::{EnrichContext, enrich};
use generate::generate_story;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use state::RunState;
use std::error::Error;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// Per-invocation switches from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    /// Run everything but write no story or index.
    pub dry_run: bool,
    /// Store stories below the publish threshold and ignore the index's
    /// duplicate check.
    pub force: bool,
    /// Pin the source platform instead of following the rotation.
    pub source: Option<Platform>,
    /// Pin the subreddit instead of picking one from config.
    pub subreddit: Option<String>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("stories"),
            dry_run: false,
            force: false,
            source: None,
            subreddit: None,
        }
    }
}

/// What happened to one story.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Stored { slug: String, path: PathBuf },
    /// Below the publish threshold and not forced.
    Rejected { slug: String, overall: f64 },
    DryRun { slug: String, status: PublishStatus },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub attempted: u32,
    pub stored: u32,
    pub rejected: u32,
    pub dry_run: u32,
    pub failed: u32,
}

impl BatchSummary {
    fn record(&mut self, result: &Result<Outcome, Box<dyn Error>>) {
        self.attempted += 1;
        match result {
            Ok(Outcome::Stored { .. }) => self.stored += 1,
            Ok(Outcome::Rejected { .. }) => self.rejected += 1,
            Ok(Outcome::DryRun { .. }) => self.dry_run += 1,
            Err(_) => self.failed += 1,
        }
    }

    fn absorb(&mut self, other: BatchSummary) {
        self.attempted += other.attempted;
        self.stored += other.stored;
        self.rejected += other.rejected;
        self.dry_run += other.dry_run;
        self.failed += other.failed;
    }

    /// Something was attempted and nothing got through.
    pub fn all_failed(&self) -> bool {
        self.attempted > 0 && self.failed == self.attempted
    }
}

/// Everything a run needs, wired together once in `main`.
pub struct Pipeline<A> {
    config: PipelineConfig,
    reddit: RedditClient,
    twitter: Option<TwitterClient>,
    llm: A,
    moderator: Moderator,
    checker: QualityChecker,
    state: RunState,
    state_path: PathBuf,
    rng: StdRng,
    options: RunOptions,
}

impl<A> Pipeline<A>
where
    A: AskAsync<Response = String>,
{
    pub fn new(
        config: PipelineConfig,
        reddit: RedditClient,
        twitter: Option<TwitterClient>,
        llm: A,
        state: RunState,
        options: RunOptions,
    ) -> Self {
        let rng = match config.pipeline.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            moderator: Moderator::new(&config.moderation),
            checker: QualityChecker::new(
                config.quality.publish_threshold,
                config.quality.premium_threshold,
            ),
            state_path: config.pipeline.state_file.clone(),
            config,
            reddit,
            twitter,
            llm,
            state,
            rng,
            options,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn cap_reached(&self) -> bool {
        self.state.stories_attempted >= self.config.pipeline.max_stories
    }

    /// Twitter on its turn in the rotation when a client is configured,
    /// Reddit otherwise. `--source` overrides both.
    fn choose_platform(&self) -> Platform {
        if let Some(platform) = self.options.source {
            return platform;
        }
        let twitter_ready =
            self.config.twitter.enabled && self.twitter.as_ref().is_some_and(|t| t.is_configured());
        if twitter_ready && self.state.twitter_turn(self.config.twitter.every_nth_story) {
            Platform::Twitter
        } else {
            Platform::Reddit
        }
    }

    /// Produce one story end to end.
    #[instrument(level = "info", skip(self), fields(story = self.state.stories_attempted + 1))]
    pub async fn run_once(&mut self) -> Result<Outcome, Box<dyn Error>> {
        let index = StoryIndex::load(&self.options.output_dir).await?;
        let platform = self.choose_platform();
        self.state.stories_attempted += 1;
        self.state.last_run = Some(Utc::now());

        let post = match platform {
            Platform::Twitter => match self.twitter_source(&index).await {
                Ok(post) => post,
                Err(e) if self.options.source.is_none() => {
                    warn!(error = %e, "Twitter source unavailable; falling back to Reddit");
                    self.reddit_source(&index).await?
                }
                Err(e) => return Err(e),
            },
            Platform::Reddit => self.reddit_source(&index).await?,
        };

        self.produce(post, &index).await
    }

    async fn twitter_source(&mut self, index: &StoryIndex) -> Result<SourcePost, Box<dyn Error>> {
        let twitter = self.twitter.as_ref().ok_or("Twitter client is not configured")?;
        let post = twitter
            .find_story(&mut self.state.twitter_quota, &self.moderator, Utc::now())
            .await?;
        if !self.options.force && index.contains_source(Platform::Twitter, &post.id) {
            return Err(format!("tweet {} already has a story", post.id).into());
        }
        Ok(post)
    }

    async fn reddit_source(&mut self, index: &StoryIndex) -> Result<SourcePost, Box<dyn Error>> {
        let subreddit = match &self.options.subreddit {
            Some(sub) => sub.clone(),
            None => self
                .config
                .subreddits
                .choose(&mut self.rng)
                .cloned()
                .ok_or("no subreddits configured")?,
        };

        let posts = self
            .reddit
            .listing(
                &subreddit,
                Sort::Hot,
                Some(self.config.reddit.time_filter.as_str()),
                self.config.reddit.listing_limit,
            )
            .await?;

        let seen = if self.options.force {
            Default::default()
        } else {
            index.source_ids(Platform::Reddit)
        };
        let best = story_candidates(&posts, &self.moderator)
            .into_iter()
            .filter(|p| !seen.contains(&p.id))
            .max_by_key(|p| p.score)
            .ok_or_else(|| format!("no fresh story candidates in r/{subreddit}"))?;
        info!(subreddit = %best.subreddit, id = %best.id, score = best.score, "Picked Reddit post");

        let (post, comments) = self.reddit.post_with_comments(&best.subreddit, &best.id).await?;
        Ok(to_source_post(&post, &comments, self.config.pipeline.max_comments))
    }

    /// Generate, enrich, gate and store a story for an already-fetched post.
    #[instrument(level = "info", skip_all, fields(source = %post.id, platform = %post.platform))]
    pub async fn produce(&mut self, post: SourcePost, index: &StoryIndex) -> Result<Outcome, Box<dyn Error>> {
        let persona = self
            .config
            .personas
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_default();
        let story = generate_story(&self.llm, &post, &persona, &self.moderator).await?;

        let category = self.config.category_for(post.community.as_deref()).clone();
        let ctx = EnrichContext {
            category: &category,
            persona: &persona,
            checker: &self.checker,
            max_comments: self.config.pipeline.max_comments,
            now: Utc::now(),
        };
        let mut published = enrich(story, &post, &ctx, &mut self.rng);
        published.slug = index.unique_slug(&published.slug, post.platform, &post.id);

        if published.status == PublishStatus::Rejected && !self.options.force {
            info!(
                slug = %published.slug,
                overall = published.quality.overall,
                threshold = self.checker.publish_threshold(),
                "Story below publish threshold; not storing"
            );
            return Ok(Outcome::Rejected {
                slug: published.slug,
                overall: published.quality.overall,
            });
        }

        if self.options.dry_run {
            info!(slug = %published.slug, status = ?published.status, "Dry run; not writing story");
            return Ok(Outcome::DryRun {
                slug: published.slug,
                status: published.status,
            });
        }

        let path = write_story(&published, &self.options.output_dir).await?;
        update_story_index(&self.options.output_dir, &published, &path).await?;
        self.state.stories_stored += 1;
        Ok(Outcome::Stored {
            slug: published.slug,
            path,
        })
    }

    async fn save_state(&self) {
        if let Err(e) = self.state.save(&self.state_path).await {
            error!(path = %self.state_path.display(), error = %e, "Failed to save run state");
        }
    }

    /// Up to `count` stories, one after another with `story_delay_ms`
    /// between them. A failed story is logged and counted; the batch goes on.
    #[instrument(level = "info", skip(self))]
    pub async fn run_batch(&mut self, count: u32) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let delay = Duration::from_millis(self.config.pipeline.story_delay_ms);

        for i in 0..count {
            if self.cap_reached() {
                warn!(
                    max_stories = self.config.pipeline.max_stories,
                    "Story cap reached; stopping"
                );
                break;
            }
            if i > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            let result = self.run_once().await;
            match &result {
                Ok(outcome) => info!(?outcome, "Story finished"),
                Err(e) => {
                    self.state.stories_failed += 1;
                    error!(error = %e, "Story failed; continuing");
                }
            }
            summary.record(&result);
            self.save_state().await;
        }

        info!(
            attempted = summary.attempted,
            stored = summary.stored,
            rejected = summary.rejected,
            failed = summary.failed,
            "Batch complete"
        );
        summary
    }

    /// A batch of `count` every `interval` until `shutdown` resolves or the
    /// story cap is hit. A story in flight at shutdown is abandoned; run
    /// state is saved either way.
    #[instrument(level = "info", skip(self, shutdown))]
    pub async fn run_continuous<F>(&mut self, count: u32, interval: Duration, shutdown: F) -> BatchSummary
    where
        F: Future<Output = ()>,
    {
        let mut total = BatchSummary::default();
        tokio::pin!(shutdown);

        loop {
            if self.cap_reached() {
                warn!("Story cap reached; leaving continuous mode");
                break;
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested during a batch");
                    break;
                }
                batch = self.run_batch(count) => total.absorb(batch),
            }

            info!(minutes = interval.as_secs() / 60, "Sleeping until next batch");
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                _ = tokio::time::sleep(interval) => {}
            }
        }

        self.save_state().await;
        total
    }
}
