//! Run state that survives between invocations: the Twitter call ledger and
//! story counters. Stored as pretty JSON at `pipeline.state_file`.

use crate::config::TwitterConfig;
use crate::ratelimit::QuotaLedger;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    pub twitter_quota: QuotaLedger,
    /// Stories attempted over the life of the state file; drives the
    /// every-Nth-story Twitter rotation.
    #[serde(default)]
    pub stories_attempted: u64,
    #[serde(default)]
    pub stories_stored: u64,
    #[serde(default)]
    pub stories_failed: u64,
    #[serde(default)]
    pub last_run: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(twitter: &TwitterConfig) -> Self {
        Self {
            twitter_quota: QuotaLedger::new(twitter.monthly_limit, twitter.daily_limit),
            stories_attempted: 0,
            stories_stored: 0,
            stories_failed: 0,
            last_run: None,
        }
    }

    /// Load the state file, or start fresh if it is missing or unreadable.
    /// Quota limits always come from the current config.
    #[instrument(level = "info", skip(twitter), fields(path = %path.display()))]
    pub async fn load(path: &Path, twitter: &TwitterConfig) -> Self {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No run state yet; starting fresh");
                return Self::new(twitter);
            }
            Err(e) => {
                warn!(error = %e, "Could not read run state; starting fresh");
                return Self::new(twitter);
            }
        };

        match serde_json::from_str::<RunState>(&raw) {
            Ok(mut state) => {
                state.twitter_quota.monthly_limit = twitter.monthly_limit;
                state.twitter_quota.daily_limit = twitter.daily_limit;
                info!(
                    attempted = state.stories_attempted,
                    stored = state.stories_stored,
                    twitter_calls = state.twitter_quota.calls().len(),
                    "Loaded run state"
                );
                state
            }
            Err(e) => {
                warn!(error = %e, "Run state is corrupt; starting fresh");
                Self::new(twitter)
            }
        }
    }

    #[instrument(level = "info", skip(self), fields(path = %path.display()))]
    pub async fn save(&self, path: &Path) -> Result<(), Box<dyn Error>> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(self)?;
        // Write then rename so an interrupted save leaves the old file intact.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, path).await?;
        debug!("Saved run state");
        Ok(())
    }

    /// Whether story number `stories_attempted + 1` should come from Twitter.
    pub fn twitter_turn(&self, every_nth: u64) -> bool {
        every_nth > 0 && (self.stories_attempted + 1) % every_nth == 0
    }
}
