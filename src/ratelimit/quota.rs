//! Daily and monthly call quotas for APIs with a hard calendar budget.
//!
//! The Twitter free tier allows a fixed number of calls per month. The ledger
//! records every call with its timestamp and answers "may we call now?" for a
//! given instant. It is plain serializable data so the run state can persist
//! it between invocations.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// One API call, successful or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallRecord {
    pub timestamp: DateTime<Utc>,
    pub endpoint: String,
    pub success: bool,
}

/// Calendar-window usage as of some instant. Months and days are UTC.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuotaUsage {
    pub monthly_used: u32,
    pub monthly_limit: u32,
    pub monthly_remaining: u32,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub daily_remaining: u32,
    /// Percentage of this month's calls that succeeded.
    pub success_rate: f64,
}

/// Answer to "may we call now?"; a denial carries a human-readable reason.
#[derive(Debug, Clone, PartialEq)]
pub enum QuotaDecision {
    Allowed,
    Denied(String),
}

impl QuotaDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, QuotaDecision::Allowed)
    }
}

/// Persistent log of calls against a monthly and a daily limit.
///
/// Nothing here reads the clock: every query takes `now`, which keeps the
/// ledger testable and lets a restored ledger be judged against the current
/// time.
///
/// ```text
/// let mut ledger = QuotaLedger::new(100, 3);
/// if ledger.should_run(now).is_allowed() {
///     let ok = call_api().await.is_ok();
///     ledger.log_call("/tweets/search/recent", ok, now);
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaLedger {
    pub monthly_limit: u32,
    pub daily_limit: u32,
    #[serde(default)]
    calls: Vec<CallRecord>,
}

impl Default for QuotaLedger {
    fn default() -> Self {
        Self::new(100, 3)
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

fn first_of_month(date: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
}

fn start_of_month(now: DateTime<Utc>) -> DateTime<Utc> {
    first_of_month(now.date_naive()).and_time(NaiveTime::MIN).and_utc()
}

/// Days remaining in the month after today.
fn days_left_in_month(now: DateTime<Utc>) -> u32 {
    let today = now.date_naive();
    let next_month = first_of_month(today)
        .checked_add_months(Months::new(1))
        .unwrap_or(today);
    let last_day = next_month.pred_opt().unwrap_or(today);
    last_day.day().saturating_sub(today.day())
}

impl QuotaLedger {
    /// An empty ledger.
    ///
    /// # Arguments
    ///
    /// * `monthly_limit` - Calls allowed per calendar month.
    /// * `daily_limit` - Calls allowed per calendar day.
    pub fn new(monthly_limit: u32, daily_limit: u32) -> Self {
        Self {
            monthly_limit,
            daily_limit,
            calls: Vec::new(),
        }
    }

    /// Recorded calls, oldest first.
    pub fn calls(&self) -> &[CallRecord] {
        &self.calls
    }

    fn count_since(&self, since: DateTime<Utc>) -> (u32, u32) {
        self.calls
            .iter()
            .filter(|c| c.timestamp >= since)
            .fold((0, 0), |(all, ok), c| (all + 1, ok + u32::from(c.success)))
    }

    /// Usage for the month and the day containing `now`.
    ///
    /// # Returns
    ///
    /// Counts, remaining budget and the month's success rate in percent
    /// (0 when nothing has been called yet).
    pub fn usage(&self, now: DateTime<Utc>) -> QuotaUsage {
        let (monthly_used, monthly_ok) = self.count_since(start_of_month(now));
        let (daily_used, _) = self.count_since(start_of_day(now));

        QuotaUsage {
            monthly_used,
            monthly_limit: self.monthly_limit,
            monthly_remaining: self.monthly_limit.saturating_sub(monthly_used),
            daily_used,
            daily_limit: self.daily_limit,
            daily_remaining: self.daily_limit.saturating_sub(daily_used),
            success_rate: if monthly_used > 0 {
                f64::from(monthly_ok) / f64::from(monthly_used) * 100.0
            } else {
                0.0
            },
        }
    }

    /// Hard limits only: denied once the monthly or the daily count is used up.
    pub fn can_make_call(&self, now: DateTime<Utc>) -> QuotaDecision {
        let usage = self.usage(now);
        if usage.monthly_used >= self.monthly_limit {
            return QuotaDecision::Denied(format!(
                "Monthly limit exceeded ({}/{})",
                usage.monthly_used, self.monthly_limit
            ));
        }
        if usage.daily_used >= self.daily_limit {
            return QuotaDecision::Denied(format!(
                "Daily limit exceeded ({}/{})",
                usage.daily_used, self.daily_limit
            ));
        }
        QuotaDecision::Allowed
    }

    /// Record a call and drop entries older than two months.
    pub fn log_call(&mut self, endpoint: &str, success: bool, now: DateTime<Utc>) {
        self.calls.push(CallRecord {
            timestamp: now,
            endpoint: endpoint.to_string(),
            success,
        });

        if let Some(cutoff) = now.checked_sub_months(Months::new(2)) {
            self.calls.retain(|c| c.timestamp >= cutoff);
        }
        debug!(endpoint, success, recorded = self.calls.len(), "Logged quota call");
    }

    /// Daily allowance that would spread the remaining monthly budget evenly.
    pub fn recommended_daily_limit(&self, now: DateTime<Utc>) -> u32 {
        let usage = self.usage(now);
        let days = days_left_in_month(now).max(1);
        (usage.monthly_remaining / days).min(self.daily_limit)
    }

    /// Whether a discovery run (a search plus a possible follow-up) fits in
    /// today's budget without starving the rest of the month.
    pub fn should_run(&self, now: DateTime<Utc>) -> QuotaDecision {
        if let denied @ QuotaDecision::Denied(_) = self.can_make_call(now) {
            return denied;
        }

        let usage = self.usage(now);
        if usage.daily_remaining < 2 {
            return QuotaDecision::Denied(format!(
                "Need at least 2 API calls, only {} remaining today",
                usage.daily_remaining
            ));
        }

        let days_left = days_left_in_month(now);
        if usage.monthly_remaining < 10 && days_left > 5 {
            return QuotaDecision::Denied(format!(
                "Conserving API calls: {} left for {} days",
                usage.monthly_remaining, days_left
            ));
        }

        info!(
            monthly_remaining = usage.monthly_remaining,
            daily_remaining = usage.daily_remaining,
            "Within call quota"
        );
        QuotaDecision::Allowed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_fresh_ledger_allows_calls() {
        let ledger = QuotaLedger::default();
        let now = at(2025, 6, 15, 12);
        assert!(ledger.can_make_call(now).is_allowed());
        assert!(ledger.should_run(now).is_allowed());

        let usage = ledger.usage(now);
        assert_eq!(usage.monthly_remaining, 100);
        assert_eq!(usage.daily_remaining, 3);
        assert_eq!(usage.success_rate, 0.0);
    }

    #[test]
    fn test_daily_limit_resets_at_midnight() {
        let mut ledger = QuotaLedger::new(100, 3);
        let now = at(2025, 6, 15, 12);
        for _ in 0..3 {
            ledger.log_call("search", true, now);
        }
        assert!(matches!(ledger.can_make_call(now), QuotaDecision::Denied(r) if r.starts_with("Daily")));
        assert!(ledger.can_make_call(at(2025, 6, 16, 0)).is_allowed());
    }

    #[test]
    fn test_monthly_limit_resets_on_the_first() {
        let mut ledger = QuotaLedger::new(5, 10);
        let mut t = at(2025, 6, 1, 9);
        for _ in 0..5 {
            ledger.log_call("search", false, t);
            t += Duration::days(1);
        }
        assert!(matches!(ledger.can_make_call(t), QuotaDecision::Denied(r) if r.starts_with("Monthly")));
        assert!(ledger.can_make_call(at(2025, 7, 1, 0)).is_allowed());
    }

    #[test]
    fn test_should_run_needs_two_calls_today() {
        let mut ledger = QuotaLedger::new(100, 3);
        let now = at(2025, 6, 15, 12);
        ledger.log_call("search", true, now);
        ledger.log_call("search", true, now);
        assert!(ledger.can_make_call(now).is_allowed());
        assert!(!ledger.should_run(now).is_allowed());
    }

    #[test]
    fn test_should_run_conserves_late_budget() {
        let mut ledger = QuotaLedger::new(12, 10);
        let early = at(2025, 6, 2, 12);
        for _ in 0..3 {
            ledger.log_call("search", true, early);
        }
        // 9 left with 20 days to go.
        let mid = at(2025, 6, 10, 12);
        assert!(matches!(ledger.should_run(mid), QuotaDecision::Denied(r) if r.starts_with("Conserving")));
        // Same budget in the last days of the month is fine to spend.
        assert!(ledger.should_run(at(2025, 6, 28, 12)).is_allowed());
    }

    #[test]
    fn test_old_calls_are_pruned() {
        let mut ledger = QuotaLedger::new(100, 3);
        ledger.log_call("search", true, at(2025, 1, 10, 12));
        ledger.log_call("search", true, at(2025, 4, 10, 12));
        assert_eq!(ledger.calls().len(), 1);
    }

    #[test]
    fn test_success_rate_and_recommendation() {
        let mut ledger = QuotaLedger::new(100, 3);
        let now = at(2025, 6, 20, 12);
        ledger.log_call("search", true, now);
        ledger.log_call("search", false, now);
        let usage = ledger.usage(now);
        assert_eq!(usage.success_rate, 50.0);
        // 98 remaining over 10 days, capped by the daily limit.
        assert_eq!(ledger.recommended_daily_limit(now), 3);
        assert_eq!(days_left_in_month(now), 10);
        assert_eq!(days_left_in_month(at(2024, 2, 28, 1)), 1);
        assert_eq!(days_left_in_month(at(2025, 12, 31, 1)), 0);
    }

    #[test]
    fn test_ledger_round_trips_through_json() {
        let mut ledger = QuotaLedger::new(100, 3);
        ledger.log_call("search", true, at(2025, 6, 15, 12));
        let json = serde_json::to_string(&ledger).unwrap();
        let back: QuotaLedger = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ledger);
    }
}
