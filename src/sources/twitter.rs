//! Twitter (X) recent-search source.
//!
//! The free API tier allows a handful of calls per day, so every search is
//! checked against the [`QuotaLedger`] first and every attempt is recorded in
//! it, successful or not. Out of one page of results the most-engaged tweet
//! that clears moderation becomes the story source.

use crate::analysis::Moderator;
use crate::config::TwitterConfig;
use crate::error::TwitterError;
use crate::models::{Platform, SourcePost};
use crate::ratelimit::{ExponentialBackoff, QuotaDecision, QuotaLedger};
use crate::utils::truncate_for_log;
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tracing::{info, instrument, warn};
use url::Url;

const SEARCH_URL: &str = "https://api.twitter.com/2/tweets/search/recent";
const SEARCH_ENDPOINT: &str = "/tweets/search/recent";
const TWEET_FIELDS: &str = "created_at,lang,public_metrics,author_id,conversation_id";
const TITLE_MAX_CHARS: usize = 100;

/// One page of `GET /2/tweets/search/recent`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub data: Vec<Tweet>,
    #[serde(default)]
    pub includes: Includes,
    #[serde(default)]
    pub meta: Option<SearchMeta>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Includes {
    #[serde(default)]
    pub users: Vec<TwitterUser>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SearchMeta {
    #[serde(default)]
    pub result_count: u32,
    #[serde(default)]
    pub newest_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Tweet {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub lang: Option<String>,
    #[serde(default)]
    pub public_metrics: PublicMetrics,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PublicMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

impl Tweet {
    /// Likes plus retweets.
    pub fn engagement(&self) -> u64 {
        self.public_metrics.like_count + self.public_metrics.retweet_count
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TwitterUser {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Twitter recent-search client.
///
/// Stateless apart from its settings: the call budget lives in the caller's
/// [`QuotaLedger`] so it can be persisted between runs.
pub struct TwitterClient {
    http: reqwest::Client,
    bearer: Option<String>,
    query: String,
    max_results: u32,
    backoff: ExponentialBackoff,
}

impl fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TwitterClient")
            .field("configured", &self.bearer.is_some())
            .field("query", &self.query)
            .field("max_results", &self.max_results)
            .finish()
    }
}

impl TwitterClient {
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client.
    /// * `config` - Search query and page size (clamped to 10..=100).
    /// * `bearer` - App bearer token; blank counts as missing.
    pub fn new(http: reqwest::Client, config: &TwitterConfig, bearer: Option<String>) -> Self {
        Self {
            http,
            bearer: bearer.filter(|b| !b.trim().is_empty()),
            query: config.query.clone(),
            max_results: config.max_results.clamp(10, 100),
            // Each attempt spends quota: retry once, and only on transient failures.
            backoff: ExponentialBackoff::new(1, Duration::from_secs(2), Duration::from_secs(10), true),
        }
    }

    /// Whether a bearer token is present.
    pub fn is_configured(&self) -> bool {
        self.bearer.is_some()
    }

    /// Search recent tweets and return the best story candidate.
    ///
    /// # Returns
    ///
    /// The most engaged tweet that clears `moderator`, as a [`SourcePost`].
    ///
    /// # Errors
    ///
    /// [`TwitterError::MissingToken`] without a bearer token,
    /// [`TwitterError::QuotaExhausted`] when the ledger says no, and
    /// [`TwitterError::NoCandidates`] when nothing survives moderation.
    #[instrument(level = "info", skip(self, ledger, moderator))]
    pub async fn find_story(
        &self,
        ledger: &mut QuotaLedger,
        moderator: &Moderator,
        now: DateTime<Utc>,
    ) -> Result<SourcePost, TwitterError> {
        let response = self.search(ledger, now).await?;
        best_tweet(&response, moderator).ok_or(TwitterError::NoCandidates)
    }

    /// Run one recent search under the quota.
    ///
    /// The ledger is checked before the call and every attempt, including a
    /// retried one, is logged in it afterwards.
    ///
    /// # Errors
    ///
    /// [`TwitterError::MissingToken`], [`TwitterError::QuotaExhausted`], or
    /// the API, network or decode error of the last attempt.
    pub async fn search(
        &self,
        ledger: &mut QuotaLedger,
        now: DateTime<Utc>,
    ) -> Result<SearchResponse, TwitterError> {
        let bearer = self.bearer.as_deref().ok_or(TwitterError::MissingToken)?;
        if let QuotaDecision::Denied(reason) = ledger.should_run(now) {
            return Err(TwitterError::QuotaExhausted(reason));
        }

        let usage = ledger.usage(now);
        info!(
            call = usage.monthly_used + 1,
            monthly_limit = usage.monthly_limit,
            "Making Twitter API call"
        );

        let attempts = AtomicU32::new(0);
        let result = self
            .backoff
            .execute(
                || {
                    attempts.fetch_add(1, Ordering::Relaxed);
                    self.search_once(bearer)
                },
                TwitterError::is_retryable,
            )
            .await;

        // Every attempt but the last failed.
        for _ in 1..attempts.load(Ordering::Relaxed) {
            ledger.log_call(SEARCH_ENDPOINT, false, now);
        }
        ledger.log_call(SEARCH_ENDPOINT, result.is_ok(), now);

        match &result {
            Ok(r) => info!(tweets = r.data.len(), "Twitter search succeeded"),
            Err(e) => warn!(error = %e, "Twitter search failed"),
        }
        result
    }

    async fn search_once(&self, bearer: &str) -> Result<SearchResponse, TwitterError> {
        let url = search_url(SEARCH_URL, &self.query, self.max_results)?;
        let response = self.http.get(url).bearer_auth(bearer).send().await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            if status == StatusCode::TOO_MANY_REQUESTS {
                warn!("Twitter rate limited");
            }
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message: truncate_for_log(body.trim(), 200),
            });
        }
        Ok(serde_json::from_str(&body)?)
    }
}

fn search_url(base: &str, query: &str, max_results: u32) -> Result<Url, TwitterError> {
    let mut url = Url::parse(base)?;
    url.query_pairs_mut()
        .append_pair("query", query)
        .append_pair("max_results", &max_results.to_string())
        .append_pair("tweet.fields", TWEET_FIELDS)
        .append_pair("expansions", "author_id")
        .append_pair("user.fields", "username,name");
    Ok(url)
}

/// The most-liked-plus-retweeted tweet that passes moderation, as a
/// [`SourcePost`].
pub fn best_tweet(response: &SearchResponse, moderator: &Moderator) -> Option<SourcePost> {
    let users: HashMap<&str, &TwitterUser> = response
        .includes
        .users
        .iter()
        .map(|u| (u.id.as_str(), u))
        .collect();

    response
        .data
        .iter()
        .filter(|t| moderator.is_safe(&t.text))
        .max_by_key(|t| t.engagement())
        .map(|tweet| {
            let username = tweet
                .author_id
                .as_deref()
                .and_then(|id| users.get(id))
                .map(|u| u.username.clone())
                .unwrap_or_else(|| "unknown".to_string());
            to_source_post(tweet, username)
        })
}

fn to_source_post(tweet: &Tweet, username: String) -> SourcePost {
    let metrics = tweet.public_metrics;
    SourcePost {
        platform: Platform::Twitter,
        id: tweet.id.clone(),
        title: tweet_title(&tweet.text),
        body: tweet.text.trim().to_string(),
        url: format!("https://twitter.com/{username}/status/{}", tweet.id),
        author: username,
        community: None,
        score: (metrics.like_count + metrics.retweet_count) as i64,
        num_comments: metrics.reply_count + metrics.quote_count,
        awards: 0,
        top_comments: Vec::new(),
    }
}

/// First line of the tweet, cut at a word boundary if it runs long.
fn tweet_title(text: &str) -> String {
    let line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
    if line.chars().count() <= TITLE_MAX_CHARS {
        return line.to_string();
    }
    let mut title = String::new();
    for word in line.split_whitespace() {
        if title.chars().count() + word.chars().count() + 1 > TITLE_MAX_CHARS {
            break;
        }
        if !title.is_empty() {
            title.push(' ');
        }
        title.push_str(word);
    }
    format!("{title}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const FIXTURE: &str = r#"{
        "data": [
            {"id": "1", "text": "My landlord just texted me a 40 page PDF about the thermostat", "author_id": "10",
             "created_at": "2026-10-01T12:00:00.000Z", "lang": "en",
             "public_metrics": {"retweet_count": 300, "reply_count": 80, "like_count": 2000, "quote_count": 20}},
            {"id": "2", "text": "The election results are in and my group chat has imploded", "author_id": "11",
             "public_metrics": {"retweet_count": 9000, "reply_count": 900, "like_count": 50000, "quote_count": 10}},
            {"id": "3", "text": "coworker microwaved fish again", "author_id": "12",
             "public_metrics": {"retweet_count": 5, "reply_count": 2, "like_count": 40, "quote_count": 0}}
        ],
        "includes": {"users": [
            {"id": "10", "username": "thermostat_victim", "name": "Sam"},
            {"id": "12", "username": "fishhater", "name": "Lee"}
        ]},
        "meta": {"result_count": 3, "newest_id": "3"}
    }"#;

    fn client(bearer: Option<&str>) -> TwitterClient {
        TwitterClient::new(reqwest::Client::new(), &TwitterConfig::default(), bearer.map(String::from))
    }

    #[test]
    fn test_best_tweet_skips_moderated_content() {
        let response: SearchResponse = serde_json::from_str(FIXTURE).unwrap();
        assert_eq!(response.meta.as_ref().map(|m| m.result_count), Some(3));

        // Tweet 2 has the most engagement but is political.
        let post = best_tweet(&response, &Moderator::default()).unwrap();
        assert_eq!(post.id, "1");
        assert_eq!(post.platform, Platform::Twitter);
        assert_eq!(post.author, "thermostat_victim");
        assert_eq!(post.url, "https://twitter.com/thermostat_victim/status/1");
        assert_eq!(post.score, 2300);
        assert_eq!(post.num_comments, 100);
        assert_eq!(post.username(), "@thermostat_victim");
    }

    #[test]
    fn test_best_tweet_empty_response() {
        let response: SearchResponse = serde_json::from_str(r#"{"meta": {"result_count": 0}}"#).unwrap();
        assert!(best_tweet(&response, &Moderator::default()).is_none());
    }

    #[test]
    fn test_tweet_title() {
        assert_eq!(tweet_title("\n  short one \nsecond line"), "short one");
        let long = "word ".repeat(40);
        let title = tweet_title(&long);
        assert!(title.ends_with('…'));
        assert!(title.chars().count() <= TITLE_MAX_CHARS + 1);
    }

    #[test]
    fn test_search_url() {
        let url = search_url(SEARCH_URL, "drama -is:retweet", 10).unwrap();
        let pairs: HashMap<String, String> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["query"], "drama -is:retweet");
        assert_eq!(pairs["max_results"], "10");
        assert_eq!(pairs["expansions"], "author_id");
        assert!(url.as_str().starts_with(SEARCH_URL));
    }

    #[test]
    fn test_search_url_rejects_bad_base() {
        let err = search_url("not a url", "drama", 10).unwrap_err();
        assert!(matches!(err, TwitterError::InvalidUrl(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_search_requires_token_and_quota() {
        let now = Utc.with_ymd_and_hms(2026, 10, 10, 12, 0, 0).unwrap();
        let mut ledger = QuotaLedger::new(100, 3);

        let err = client(None).search(&mut ledger, now).await.unwrap_err();
        assert!(matches!(err, TwitterError::MissingToken));

        // Two calls already today leaves one, and a run needs two.
        ledger.log_call(SEARCH_ENDPOINT, true, now);
        ledger.log_call(SEARCH_ENDPOINT, true, now);
        let err = client(Some("token")).search(&mut ledger, now).await.unwrap_err();
        assert!(matches!(err, TwitterError::QuotaExhausted(_)));
        // Denied runs spend nothing.
        assert_eq!(ledger.calls().len(), 2);
    }

    #[test]
    fn test_max_results_is_clamped() {
        let config = TwitterConfig { max_results: 500, ..Default::default() };
        let c = TwitterClient::new(reqwest::Client::new(), &config, Some(" ".into()));
        assert_eq!(c.max_results, 100);
        assert!(!c.is_configured());
    }
}
