//! Error types for the parts of the pipeline whose callers branch on the kind
//! of failure. Orchestration code above these returns `Box<dyn Error>`.

use std::time::Duration;
use thiserror::Error;

/// Failures talking to the Reddit API.
#[derive(Debug, Error)]
pub enum RedditError {
    /// The token endpoint rejected our client credentials.
    #[error("reddit authentication failed: {0}")]
    Auth(String),

    /// A cached bearer token was rejected; it has been cleared.
    #[error("reddit rejected the access token: {0}")]
    Unauthorized(String),

    #[error("reddit rate limit exceeded ({remaining} remaining, resets in {}s)", .reset_after.as_secs())]
    RateLimited { remaining: u32, reset_after: Duration },

    #[error("reddit api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected reddit response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid reddit url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl RedditError {
    /// Backoff predicate: transient failures retry, client mistakes do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            RedditError::RateLimited { .. } | RedditError::Unauthorized(_) => true,
            RedditError::Api { status, .. } => *status >= 500,
            RedditError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RedditError::Auth(_) | RedditError::Decode(_) | RedditError::InvalidUrl(_) => false,
        }
    }
}

/// Failures talking to the Twitter API.
#[derive(Debug, Error)]
pub enum TwitterError {
    #[error("no TWITTER_BEARER_TOKEN configured")]
    MissingToken,

    #[error("twitter call quota exhausted: {0}")]
    QuotaExhausted(String),

    #[error("twitter api error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("no suitable tweets found")]
    NoCandidates,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unexpected twitter response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid twitter url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl TwitterError {
    pub fn is_retryable(&self) -> bool {
        match self {
            TwitterError::Api { status, .. } => *status == 429 || *status >= 500,
            TwitterError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            _ => false,
        }
    }
}

/// Problems with what the LLM produced.
#[derive(Debug, Error)]
pub enum StoryError {
    #[error("model response was not valid story JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("story failed validation: {0}")]
    Invalid(String),

    #[error("story blocked by moderation: {}", .categories.join(", "))]
    Moderated { categories: Vec<String> },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reddit_retry_classification() {
        assert!(RedditError::RateLimited { remaining: 0, reset_after: Duration::from_secs(60) }.is_retryable());
        assert!(RedditError::Unauthorized("expired".into()).is_retryable());
        assert!(RedditError::Api { status: 503, message: "down".into() }.is_retryable());
        assert!(!RedditError::Api { status: 404, message: "gone".into() }.is_retryable());
        assert!(!RedditError::Api { status: 403, message: "private".into() }.is_retryable());
        assert!(!RedditError::Auth("bad secret".into()).is_retryable());
    }

    #[test]
    fn test_twitter_retry_classification() {
        assert!(TwitterError::Api { status: 429, message: String::new() }.is_retryable());
        assert!(!TwitterError::Api { status: 401, message: String::new() }.is_retryable());
        assert!(!TwitterError::MissingToken.is_retryable());
        assert!(!TwitterError::QuotaExhausted("daily".into()).is_retryable());
        assert!(!TwitterError::from(url::ParseError::EmptyHost).is_retryable());
    }

    #[test]
    fn test_error_messages() {
        let e = RedditError::RateLimited { remaining: 0, reset_after: Duration::from_secs(42) };
        assert_eq!(e.to_string(), "reddit rate limit exceeded (0 remaining, resets in 42s)");

        let e = StoryError::Moderated { categories: vec!["political".into(), "violent".into()] };
        assert_eq!(e.to_string(), "story blocked by moderation: political, violent");
    }
}
