//! Reddit API client.
//!
//! With client credentials the client uses the OAuth API at
//! `oauth.reddit.com` (application-only token, refreshed a minute before it
//! expires). Without them it falls back to the public `.json` endpoints on
//! `www.reddit.com`, which serve the same listing shapes at a lower rate.
//!
//! Every request goes through the same path:
//!
//! 1. wait for a token from the [`TokenBucket`]
//! 2. send, then feed the `x-ratelimit-*` headers back into the bucket
//! 3. map non-2xx statuses to [`RedditError`]
//! 4. decode the body into the wire types below
//!
//! and the whole attempt is wrapped in [`ExponentialBackoff`] with
//! [`RedditError::is_retryable`] deciding what is worth another try.

use crate::analysis::Moderator;
use crate::config::RedditConfig;
use crate::error::RedditError;
use crate::models::{Platform, SourceComment, SourcePost};
use crate::ratelimit::{ExponentialBackoff, RateLimitHeaders, TokenBucket};
use crate::utils::truncate_for_log;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::StatusCode;
use reqwest::header::{CONTENT_TYPE, USER_AGENT};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::fmt;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};
use url::Url;

const OAUTH_BASE: &str = "https://oauth.reddit.com";
const PUBLIC_BASE: &str = "https://www.reddit.com";
const AUTH_URL: &str = "https://www.reddit.com/api/v1/access_token";

/// Refresh the token this long before Reddit says it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Used for a 429 that carries no reset header.
const DEFAULT_RATE_LIMIT_RESET: Duration = Duration::from_secs(60);

// ---- wire types ----

/// A `{ "kind": ..., "data": ... }` envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct Thing {
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListingData {
    #[serde(default)]
    pub after: Option<String>,
    #[serde(default)]
    pub children: Vec<Thing>,
}

#[derive(Debug, Clone, Deserialize)]
struct ListingThing {
    data: ListingData,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedditPost {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub selftext: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub subreddit: String,
    #[serde(default)]
    pub permalink: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub num_comments: u64,
    #[serde(default)]
    pub total_awards_received: u64,
    #[serde(default)]
    pub over_18: bool,
    #[serde(default)]
    pub locked: bool,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub stickied: bool,
    #[serde(default)]
    pub removed_by_category: Option<String>,
    #[serde(default)]
    pub is_video: bool,
    #[serde(default)]
    pub created_utc: f64,
}

impl RedditPost {
    pub fn permalink_url(&self) -> String {
        format!("https://reddit.com{}", self.permalink)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RedditComment {
    pub id: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub is_submitter: bool,
    #[serde(default)]
    pub controversiality: u32,
    /// Either `""` or a listing of child comments.
    #[serde(default)]
    pub replies: serde_json::Value,
    /// Filled in while flattening.
    #[serde(skip)]
    pub depth: u32,
}

impl RedditComment {
    pub fn is_deleted(&self) -> bool {
        matches!(self.body.trim(), "" | "[deleted]" | "[removed]")
    }
}

#[derive(Debug, Deserialize)]
struct AccessTokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: u64,
    #[serde(default)]
    scope: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ---- client ----

/// Script-app credentials for the OAuth API. `Debug` redacts the secret.
#[derive(Clone)]
pub struct RedditCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for RedditCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedditCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone)]
struct AccessToken {
    value: String,
    expires_at: Instant,
}

/// Listing order. `Top` and `Controversial` also take a time filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sort {
    Hot,
    New,
    Top,
    Rising,
    Controversial,
}

impl Sort {
    fn takes_time_filter(self) -> bool {
        matches!(self, Sort::Top | Sort::Controversial)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Sort::Hot => "hot",
            Sort::New => "new",
            Sort::Top => "top",
            Sort::Rising => "rising",
            Sort::Controversial => "controversial",
        })
    }
}

/// Rate-limited Reddit client for listings and comment threads.
///
/// Holds its own [`TokenBucket`] and [`ExponentialBackoff`], so one client
/// should be shared by everything that talks to Reddit in a run. The OAuth
/// token, when credentials are set, is cached behind a mutex and fetched on
/// first use.
#[derive(Debug)]
pub struct RedditClient {
    http: reqwest::Client,
    credentials: Option<RedditCredentials>,
    user_agent: String,
    token: Mutex<Option<AccessToken>>,
    limiter: TokenBucket,
    backoff: ExponentialBackoff,
    comment_limit: u32,
}

impl RedditClient {
    /// Build a client from the `reddit` config section.
    ///
    /// # Arguments
    ///
    /// * `http` - Shared HTTP client; its timeout applies to every call.
    /// * `config` - Rate limit, retry and comment-limit settings.
    /// * `credentials` - OAuth client id and secret. `None` selects the public
    ///   JSON endpoints.
    /// * `user_agent` - Overrides `config.user_agent` when set.
    ///
    /// # Returns
    ///
    /// A client that has not made any request yet.
    pub fn new(
        http: reqwest::Client,
        config: &RedditConfig,
        credentials: Option<RedditCredentials>,
        user_agent: Option<String>,
    ) -> Self {
        let user_agent = user_agent.unwrap_or_else(|| config.user_agent.clone());
        info!(
            %user_agent,
            authenticated = credentials.is_some(),
            requests_per_minute = config.requests_per_minute,
            "RedditClient initialized"
        );
        Self {
            http,
            credentials,
            user_agent,
            token: Mutex::new(None),
            limiter: TokenBucket::new(config.requests_per_minute, config.burst),
            backoff: ExponentialBackoff::new(
                config.max_retries,
                config.base_delay(),
                config.max_delay(),
                true,
            ),
            comment_limit: config.comment_limit,
        }
    }

    /// Whether requests go to the OAuth API rather than the public endpoints.
    pub fn is_authenticated_mode(&self) -> bool {
        self.credentials.is_some()
    }

    pub fn limiter(&self) -> &TokenBucket {
        &self.limiter
    }

    /// Posts from a subreddit listing.
    ///
    /// # Arguments
    ///
    /// * `subreddit` - Name without the `r/` prefix.
    /// * `sort` - Listing order.
    /// * `time` - `hour`, `day`, `week`, ...; ignored unless `sort` takes a
    ///   time filter.
    /// * `limit` - Posts to ask for (Reddit caps this at 100).
    ///
    /// # Returns
    ///
    /// The decoded posts in listing order. Entries that are not posts are
    /// skipped.
    ///
    /// # Errors
    ///
    /// Any [`RedditError`] left after retries: rate limiting, auth failures,
    /// private or banned subreddits, network and decode errors.
    #[instrument(level = "info", skip(self))]
    pub async fn listing(
        &self,
        subreddit: &str,
        sort: Sort,
        time: Option<&str>,
        limit: u32,
    ) -> Result<Vec<RedditPost>, RedditError> {
        let mut query = vec![("limit", limit.to_string()), ("raw_json", "1".to_string())];
        if let Some(t) = time.filter(|_| sort.takes_time_filter()) {
            query.push(("t", t.to_string()));
        }

        let path = format!("/r/{subreddit}/{sort}");
        let listing: ListingThing = self.get_json(&path, &query).await?;
        let posts = decode_posts(&listing.data);

        info!(
            subreddit,
            %sort,
            count = posts.len(),
            after = ?listing.data.after,
            "Retrieved Reddit posts"
        );
        Ok(posts)
    }

    /// A post and its comment tree, flattened depth-first.
    ///
    /// Comments come back sorted by confidence, at most `comment_limit` of
    /// them and up to ten levels deep. Deleted and removed comments are
    /// dropped but their replies are kept.
    ///
    /// # Errors
    ///
    /// [`RedditError::Api`] with status 404 when the response has no post,
    /// plus everything [`RedditClient::listing`] can return.
    #[instrument(level = "info", skip(self))]
    pub async fn post_with_comments(
        &self,
        subreddit: &str,
        post_id: &str,
    ) -> Result<(RedditPost, Vec<RedditComment>), RedditError> {
        let query = [
            ("sort", "confidence".to_string()),
            ("limit", self.comment_limit.to_string()),
            ("depth", "10".to_string()),
            ("raw_json", "1".to_string()),
        ];
        let path = format!("/r/{subreddit}/comments/{post_id}");
        let listings: Vec<ListingThing> = self.get_json(&path, &query).await?;

        let mut listings = listings.into_iter();
        let post = listings
            .next()
            .and_then(|l| decode_posts(&l.data).into_iter().next())
            .ok_or_else(|| RedditError::Api {
                status: 404,
                message: format!("post {post_id} not found in r/{subreddit}"),
            })?;
        let comments = listings
            .next()
            .map(|l| flatten_comments(&l.data.children, 0))
            .unwrap_or_default();

        info!(subreddit, post_id, comments = comments.len(), "Retrieved Reddit comments");
        Ok((post, comments))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RedditError> {
        self.backoff
            .execute(|| self.get_json_once(path, query), RedditError::is_retryable)
            .await
    }

    async fn get_json_once<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RedditError> {
        let token = self.bearer().await?;
        self.limiter.acquire().await;

        let url = request_url(path, token.is_some(), query)?;
        debug!(%url, "Making Reddit API request");

        let mut request = self.http.get(url).header(USER_AGENT, &self.user_agent);
        if let Some(token) = &token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;

        let headers = RateLimitHeaders::from_headers(response.headers());
        self.limiter.apply_headers(&headers);

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            if status == StatusCode::UNAUTHORIZED {
                self.token.lock().await.take();
            }
            return Err(map_status(status, &headers, &body));
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Current bearer token, fetching a new one if missing or about to expire.
    /// `None` in public mode.
    async fn bearer(&self) -> Result<Option<String>, RedditError> {
        let Some(credentials) = &self.credentials else {
            return Ok(None);
        };

        let mut guard = self.token.lock().await;
        if let Some(token) = guard.as_ref().filter(|t| Instant::now() < t.expires_at) {
            return Ok(Some(token.value.clone()));
        }

        let fresh = self.authenticate(credentials).await?;
        let value = fresh.value.clone();
        *guard = Some(fresh);
        Ok(Some(value))
    }

    #[instrument(level = "info", skip_all)]
    async fn authenticate(&self, credentials: &RedditCredentials) -> Result<AccessToken, RedditError> {
        info!("Authenticating with Reddit API");
        let response = self
            .http
            .post(AUTH_URL)
            .basic_auth(&credentials.client_id, Some(&credentials.client_secret))
            .header(USER_AGENT, &self.user_agent)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(RedditError::Auth(format!(
                "{status} - {}",
                truncate_for_log(&body, 200)
            )));
        }

        let auth: AccessTokenResponse = serde_json::from_str(&body)?;
        let token = access_token(auth, Instant::now())?;
        Ok(token)
    }
}

fn access_token(auth: AccessTokenResponse, now: Instant) -> Result<AccessToken, RedditError> {
    let Some(value) = auth.access_token.filter(|t| !t.is_empty()) else {
        return Err(RedditError::Auth(
            auth.error.unwrap_or_else(|| "no access_token in response".into()),
        ));
    };

    let lifetime = Duration::from_secs(auth.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
    info!(
        token_type = ?auth.token_type,
        expires_in = auth.expires_in,
        scope = ?auth.scope,
        "Reddit authentication successful"
    );
    Ok(AccessToken {
        value,
        expires_at: now + lifetime,
    })
}

fn request_url(path: &str, authenticated: bool, query: &[(&str, String)]) -> Result<Url, url::ParseError> {
    let mut url = if authenticated {
        Url::parse(OAUTH_BASE)?.join(path)?
    } else {
        Url::parse(PUBLIC_BASE)?.join(&format!("{}.json", path.trim_end_matches('/')))?
    };
    url.query_pairs_mut()
        .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    Ok(url)
}

/// Translate an error response into a [`RedditError`].
pub fn map_status(status: StatusCode, headers: &RateLimitHeaders, body: &str) -> RedditError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| {
            v.get("message")
                .or_else(|| v.get("error"))
                .map(|m| m.as_str().map(str::to_string).unwrap_or_else(|| m.to_string()))
        })
        .unwrap_or_else(|| truncate_for_log(body.trim(), 200));

    match status {
        StatusCode::UNAUTHORIZED => RedditError::Unauthorized(detail),
        StatusCode::TOO_MANY_REQUESTS => {
            let remaining = headers.remaining.map(|r| r.floor() as u32).unwrap_or(0);
            let reset_after = headers.reset_after.unwrap_or(DEFAULT_RATE_LIMIT_RESET);
            warn!(remaining, reset_secs = reset_after.as_secs(), "Reddit rate limit hit");
            RedditError::RateLimited { remaining, reset_after }
        }
        _ => {
            let reason = match status.as_u16() {
                403 => "Forbidden",
                404 => "Not found",
                500..=599 => "Server error",
                _ => "Request failed",
            };
            RedditError::Api {
                status: status.as_u16(),
                message: format!("{reason}: {detail}"),
            }
        }
    }
}

fn decode_posts(listing: &ListingData) -> Vec<RedditPost> {
    listing
        .children
        .iter()
        .filter(|t| t.kind == "t3")
        .filter_map(|t| match serde_json::from_value::<RedditPost>(t.data.clone()) {
            Ok(post) => Some(post),
            Err(e) => {
                warn!(error = %e, "Skipping undecodable Reddit post");
                None
            }
        })
        .collect()
}

/// Flatten a comment tree depth-first, recording each comment's depth and
/// dropping deleted or removed comments (their replies are kept).
pub fn flatten_comments(children: &[Thing], depth: u32) -> Vec<RedditComment> {
    let mut out = Vec::new();
    for thing in children.iter().filter(|t| t.kind == "t1") {
        let Ok(mut comment) = serde_json::from_value::<RedditComment>(thing.data.clone()) else {
            continue;
        };
        comment.depth = depth;

        let replies = serde_json::from_value::<ListingThing>(std::mem::take(&mut comment.replies))
            .map(|l| l.data.children)
            .unwrap_or_default();

        if !comment.is_deleted() {
            out.push(comment);
        }
        out.extend(flatten_comments(&replies, depth + 1));
    }
    out
}

static POST_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/comments/([a-z0-9]+)(?:/|$)").expect("valid post id regex"));

static EXTRA_NEWLINES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n{3,}").expect("valid newline regex"));

/// Post id from a Reddit permalink, e.g. `.../comments/abc123/title/`.
pub fn extract_post_id_from_url(url: &str) -> Option<String> {
    POST_ID
        .captures(url)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Decode the HTML entities Reddit leaves in text and squeeze blank lines.
pub fn clean_reddit_text(text: &str) -> String {
    let decoded = text
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    EXTRA_NEWLINES.replace_all(&decoded, "\n\n").trim().to_string()
}

/// Whether a post is worth turning into a story at all.
pub fn is_post_suitable(post: &RedditPost) -> bool {
    if post.removed_by_category.is_some() || post.locked || post.archived || post.stickied {
        return false;
    }
    let has_url = post.url.as_deref().is_some_and(|u| !u.is_empty());
    if post.selftext.is_empty() && !has_url {
        return false;
    }
    if !post.selftext.is_empty() && post.selftext.chars().count() < 100 {
        return false;
    }
    post.score >= 10 && post.num_comments >= 5
}

/// Pick story candidates out of a listing: suitable, text-bearing, and
/// cleared by moderation.
pub fn story_candidates<'a>(posts: &'a [RedditPost], moderator: &Moderator) -> Vec<&'a RedditPost> {
    posts
        .iter()
        .filter(|p| is_post_suitable(p) && p.selftext.chars().count() >= 100)
        .filter(|p| {
            let result = moderator.moderate(&format!("{} {}", p.title, p.selftext));
            if !result.is_allowed {
                info!(
                    title = %truncate_for_log(&p.title, 50),
                    categories = ?result.category_names(),
                    "Filtered out post"
                );
            }
            result.is_allowed
        })
        .collect()
}

/// Normalize a post and its comments into a [`SourcePost`], keeping the
/// `max_comments` highest-scored comments.
pub fn to_source_post(post: &RedditPost, comments: &[RedditComment], max_comments: usize) -> SourcePost {
    let mut top: Vec<&RedditComment> = comments.iter().filter(|c| !c.is_deleted()).collect();
    top.sort_by(|a, b| b.score.cmp(&a.score));

    SourcePost {
        platform: Platform::Reddit,
        id: post.id.clone(),
        title: clean_reddit_text(&post.title),
        body: clean_reddit_text(&post.selftext),
        author: if post.author.is_empty() { "deleted".into() } else { post.author.clone() },
        community: Some(post.subreddit.clone()),
        url: post.permalink_url(),
        score: post.score,
        num_comments: post.num_comments,
        awards: post.total_awards_received,
        top_comments: top
            .into_iter()
            .take(max_comments)
            .map(|c| SourceComment {
                id: c.id.clone(),
                author: c.author.clone(),
                body: clean_reddit_text(&c.body),
                score: c.score,
                is_submitter: c.is_submitter,
                depth: c.depth,
            })
            .collect(),
    }
}
