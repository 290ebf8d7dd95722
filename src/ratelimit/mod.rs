//! Throttling for outbound API calls.
//!
//! - [`token_bucket`]: per-minute request pacing with header-driven overrides
//! - [`backoff`]: exponential retry with a caller-supplied retry predicate
//! - [`quota`]: calendar call budgets (daily/monthly) for metered APIs
//!
//! None of these coordinate across processes. State that must survive a run
//! (the quota ledger) is saved by the pipeline's run state.

pub mod backoff;
pub mod quota;
pub mod token_bucket;

pub use backoff::ExponentialBackoff;
pub use quota::{QuotaDecision, QuotaLedger};
pub use token_bucket::{RateLimitHeaders, TokenBucket};
