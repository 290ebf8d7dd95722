//! Where story material comes from.
//!
//! | Source | Module | Access | Notes |
//! |--------|--------|--------|-------|
//! | Reddit | [`reddit`] | OAuth or public JSON | Token bucket + backoff on every request |
//! | Twitter | [`twitter`] | API v2 recent search | Gated by the monthly/daily quota ledger |
//! | Viral sweep | [`discovery`] | Reddit listings | Ranks posts by engagement score |
//!
//! Every source ends in a [`crate::models::SourcePost`], so the rest of the
//! pipeline does not care where a story started.

pub mod discovery;
pub mod reddit;
pub mod twitter;

pub use discovery::ViralCandidate;
pub use reddit::{RedditClient, RedditCredentials, Sort};
pub use twitter::TwitterClient;
