//! Viral discovery: rank posts across many subreddits by engagement.
//!
//! Each subreddit is read three ways (top, hot, controversial) one request
//! at a time through the shared [`RedditClient`], so the client's limiter
//! paces the whole sweep.

use crate::config::DiscoveryConfig;
use crate::models;
use crate::sources::reddit::{RedditClient, RedditPost, Sort};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, instrument, warn};

const SWEEP: [Sort; 3] = [Sort::Top, Sort::Hot, Sort::Controversial];

/// A ranked discovery result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViralCandidate {
    pub id: String,
    pub subreddit: String,
    pub title: String,
    pub url: String,
    pub author: String,
    pub score: i64,
    pub comments: u64,
    pub engagement_score: i64,
    /// Listing the post was first seen in.
    pub source_sort: String,
    pub is_video: bool,
}

/// `score + 3·comments + 100·awards`.
pub fn engagement_score(post: &RedditPost) -> i64 {
    models::engagement_score(post.score, post.num_comments, post.total_awards_received)
}

/// Quality and virality gate for discovered posts.
pub fn is_viral(post: &RedditPost, nsfw_allowed: &[String]) -> bool {
    if post.removed_by_category.is_some() || post.locked {
        return false;
    }
    if post.score < 100 || post.num_comments < 20 {
        return false;
    }
    if post.over_18 && !nsfw_allowed.iter().any(|s| s.eq_ignore_ascii_case(&post.subreddit)) {
        return false;
    }
    if !post.selftext.is_empty() && post.selftext.chars().count() < 100 {
        return false;
    }
    if post.title.chars().count() < 20 {
        return false;
    }
    // Discussion relative to upvotes.
    let ratio = post.num_comments as f64 / (post.score as f64 / 100.0);
    ratio >= 0.5
}

/// Filter, threshold and order posts; ties keep their input order.
///
/// Posts seen in more than one listing are counted once, and ids in
/// `exclude` (already stored stories) are skipped.
pub fn rank(
    posts: Vec<(Sort, RedditPost)>,
    config: &DiscoveryConfig,
    exclude: &HashSet<String>,
) -> Vec<ViralCandidate> {
    let min_engagement = config.min_engagement();
    let mut seen = HashSet::new();

    let mut ranked: Vec<ViralCandidate> = posts
        .into_iter()
        .filter(|(_, p)| seen.insert(p.id.clone()))
        .filter(|(_, p)| !exclude.contains(&p.id))
        .filter(|(_, p)| is_viral(p, &config.nsfw_allowed))
        .map(|(sort, p)| ViralCandidate {
            engagement_score: engagement_score(&p),
            url: p.permalink_url(),
            id: p.id,
            subreddit: p.subreddit,
            title: p.title,
            author: p.author,
            score: p.score,
            comments: p.num_comments,
            source_sort: sort.to_string(),
            is_video: p.is_video,
        })
        .filter(|c| c.engagement_score >= min_engagement)
        .collect();

    ranked.sort_by(|a, b| b.engagement_score.cmp(&a.engagement_score));
    ranked.truncate(config.limit);
    ranked
}

/// Sweep the configured subreddits and return the top candidates.
///
/// A listing that fails is logged and skipped.
#[instrument(level = "info", skip_all, fields(subreddits = config.subreddits.len(), timeframe = %config.timeframe))]
pub async fn discover(
    client: &RedditClient,
    config: &DiscoveryConfig,
    exclude: &HashSet<String>,
) -> Vec<ViralCandidate> {
    let requests: Vec<(&str, Sort)> = config
        .subreddits
        .iter()
        .flat_map(|sub| SWEEP.iter().map(move |sort| (sub.as_str(), *sort)))
        .collect();

    let posts: Vec<(Sort, RedditPost)> = stream::iter(requests)
        .then(|(subreddit, sort)| async move {
            match client
                .listing(subreddit, sort, Some(config.timeframe.as_str()), config.per_listing_limit)
                .await
            {
                Ok(posts) => posts.into_iter().map(|p| (sort, p)).collect::<Vec<_>>(),
                Err(e) => {
                    warn!(error = %e, subreddit, %sort, "Listing failed; skipping");
                    Vec::new()
                }
            }
        })
        .flat_map(stream::iter)
        .collect()
        .await;

    let total = posts.len();
    let ranked = rank(posts, config, exclude);
    info!(
        scanned = total,
        viral = ranked.len(),
        min_engagement = config.min_engagement(),
        "Viral discovery complete"
    );
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(id: &str, score: i64, comments: u64) -> RedditPost {
        RedditPost {
            id: id.into(),
            title: "My neighbor built a fence through my garden".into(),
            selftext: "x".repeat(150),
            author: "someone".into(),
            subreddit: "pettyrevenge".into(),
            permalink: format!("/r/pettyrevenge/comments/{id}/fence/"),
            url: None,
            score,
            num_comments: comments,
            total_awards_received: 0,
            over_18: false,
            locked: false,
            archived: false,
            stickied: false,
            removed_by_category: None,
            is_video: false,
            created_utc: 0.0,
        }
    }

    #[test]
    fn test_engagement_score() {
        let mut p = post("a", 1000, 200);
        p.total_awards_received = 4;
        assert_eq!(engagement_score(&p), 1000 + 600 + 400);
    }

    #[test]
    fn test_is_viral_filters() {
        let allowed = vec!["tifu".to_string()];
        assert!(is_viral(&post("a", 1000, 200), &allowed));

        // 50 comments per 10k upvotes is a ratio of 0.5: right at the line.
        assert!(is_viral(&post("a", 10_000, 50), &allowed));
        assert!(!is_viral(&post("a", 10_000, 49), &allowed));

        assert!(!is_viral(&post("a", 99, 200), &allowed));
        assert!(!is_viral(&post("a", 1000, 19), &allowed));

        let mut p = post("a", 1000, 200);
        p.over_18 = true;
        assert!(!is_viral(&p, &allowed));
        p.subreddit = "TIFU".into();
        assert!(is_viral(&p, &allowed));

        let mut p = post("a", 1000, 200);
        p.selftext = "too short".into();
        assert!(!is_viral(&p, &allowed));
        p.selftext.clear();
        assert!(is_viral(&p, &allowed));

        let mut p = post("a", 1000, 200);
        p.title = "Short title".into();
        assert!(!is_viral(&p, &allowed));

        let mut p = post("a", 1000, 200);
        p.locked = true;
        assert!(!is_viral(&p, &allowed));
    }

    #[test]
    fn test_rank_orders_dedupes_and_limits() {
        let config = DiscoveryConfig {
            limit: 2,
            min_engagement: Some(1000),
            ..Default::default()
        };
        let posts = vec![
            (Sort::Top, post("low", 500, 100)),    // 800: under threshold
            (Sort::Top, post("mid", 2000, 400)),   // 3200
            (Sort::Hot, post("high", 5000, 900)),  // 7700
            (Sort::Hot, post("mid", 2000, 400)),   // duplicate
            (Sort::Controversial, post("old", 9000, 900)), // already stored
        ];
        let exclude: HashSet<String> = ["old".to_string()].into();

        let ranked = rank(posts, &config, &exclude);
        let ids: Vec<&str> = ranked.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["high", "mid"]);
        assert_eq!(ranked[1].source_sort, "top");
        assert_eq!(ranked[0].url, "https://reddit.com/r/pettyrevenge/comments/high/fence/");
    }

    #[test]
    fn test_default_threshold_depends_on_timeframe() {
        let config = DiscoveryConfig::default();
        let ranked = rank(vec![(Sort::Top, post("a", 2000, 400))], &config, &HashSet::new());
        assert!(ranked.is_empty());

        let hourly = DiscoveryConfig { timeframe: "hour".into(), ..Default::default() };
        let ranked = rank(vec![(Sort::Top, post("a", 2000, 400))], &hourly, &HashSet::new());
        assert_eq!(ranked.len(), 1);
    }
}
