//! Remaining-call budget for rate-limited APIs (Mastodon-style
//! `X-RateLimit-Remaining` / `X-RateLimit-Reset` headers).
//!
//! Semantics:
//! - The budget is unknown until the first response is observed; unknown
//!   budgets never block.
//! - Each `acquire` spends one call. Once `remaining` drops to the `floor`,
//!   every caller waits until the advertised reset instant. The first call
//!   made after that instant finds the budget unknown again, and the next
//!   response refreshes it.
//!
//! The wait is a single sleep to an explicit timestamp, never a
//! sleep-and-recheck loop.

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const REMAINING_HEADERS: &[&str] = &["x-ratelimit-remaining", "x-rate-limit-remaining"];
const RESET_HEADERS: &[&str] = &["x-ratelimit-reset", "x-rate-limit-reset"];
/// Used when the server exhausts the budget without advertising a reset.
const FALLBACK_WAIT: Duration = Duration::from_secs(150);

#[derive(Debug, Default)]
struct BudgetState {
    remaining: Option<u64>,
    reset_at: Option<DateTime<Utc>>,
}

/// Shared, cloneable rate budget. Clones observe and spend the same counter.
#[derive(Clone, Debug)]
pub struct RateBudget {
    state: Arc<Mutex<BudgetState>>,
    floor: u64,
}

impl RateBudget {
    /// Budget that starts waiting once `floor` calls or fewer remain.
    pub fn new(floor: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(BudgetState::default())),
            floor,
        }
    }

    pub fn remaining(&self) -> Option<u64> {
        self.state.lock().ok().and_then(|s| s.remaining)
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.state.lock().ok().and_then(|s| s.reset_at)
    }

    /// Refresh the budget from rate-limit response headers, if present.
    pub fn observe(&self, headers: &HeaderMap) {
        self.observe_at(headers, Utc::now());
    }

    fn observe_at(&self, headers: &HeaderMap, now: DateTime<Utc>) {
        let remaining = first_header(headers, REMAINING_HEADERS).and_then(|v| v.parse().ok());
        let reset_at = first_header(headers, RESET_HEADERS).and_then(|v| parse_reset(v, now));
        if remaining.is_none() && reset_at.is_none() {
            return;
        }
        if let Ok(mut state) = self.state.lock() {
            if remaining.is_some() {
                state.remaining = remaining;
            }
            if reset_at.is_some() {
                state.reset_at = reset_at;
            }
            tracing::trace!(
                target: "rate",
                remaining=?state.remaining,
                reset_at=?state.reset_at,
                "rate.budget.observed"
            );
        }
    }

    /// Spend one call, returning how long the caller must wait first.
    ///
    /// An exhausted budget keeps its reset instant until that instant has
    /// passed, so every caller arriving before it waits for the same moment.
    fn reserve(&self, now: DateTime<Utc>) -> Duration {
        let Ok(mut state) = self.state.lock() else {
            return Duration::ZERO;
        };
        match state.remaining {
            None => Duration::ZERO,
            Some(n) if n > self.floor => {
                state.remaining = Some(n - 1);
                Duration::ZERO
            }
            Some(_) => match state.reset_at {
                Some(at) if at > now => (at - now).to_std().unwrap_or(FALLBACK_WAIT),
                Some(_) => {
                    // Unknown again until the next response after the reset.
                    state.remaining = None;
                    state.reset_at = None;
                    Duration::ZERO
                }
                None => {
                    state.reset_at = chrono::Duration::from_std(FALLBACK_WAIT)
                        .ok()
                        .map(|wait| now + wait);
                    FALLBACK_WAIT
                }
            },
        }
    }

    /// Wait (if needed) and spend one call.
    pub async fn acquire(&self) {
        let wait = self.reserve(Utc::now());
        if !wait.is_zero() {
            tracing::info!(
                target: "rate",
                wait_ms = wait.as_millis() as u64,
                floor = self.floor,
                "rate.budget.exhausted"
            );
            tokio::time::sleep(wait).await;
        }
    }
}

fn first_header<'a>(headers: &'a HeaderMap, names: &[&str]) -> Option<&'a str> {
    names
        .iter()
        .find_map(|n| headers.get(*n))
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
}

/// Reset values come as RFC 3339 (Mastodon), epoch seconds (Twitter) or a
/// relative number of seconds (small integers).
fn parse_reset(raw: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let secs: i64 = raw.parse().ok()?;
    if secs > 1_000_000_000 {
        Utc.timestamp_opt(secs, 0).single()
    } else {
        Some(now + chrono::Duration::seconds(secs.max(0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_str(v).unwrap());
        }
        h
    }

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn unknown_budget_never_waits() {
        let budget = RateBudget::new(50);
        assert_eq!(budget.reserve(Utc::now()), Duration::ZERO);
        assert_eq!(budget.remaining(), None);
    }

    #[test]
    fn spends_down_to_the_floor() {
        let budget = RateBudget::new(2);
        let now = at("2026-01-01T00:00:00Z");
        budget.observe_at(
            &headers(&[
                ("x-ratelimit-remaining", "4"),
                ("x-ratelimit-reset", "2026-01-01T00:05:00.000Z"),
            ]),
            now,
        );
        assert_eq!(budget.reserve(now), Duration::ZERO);
        assert_eq!(budget.reserve(now), Duration::ZERO);
        assert_eq!(budget.remaining(), Some(2));
        assert_eq!(budget.reserve(now), Duration::from_secs(300));
        assert_eq!(budget.remaining(), Some(2));
        assert_eq!(budget.reset_at(), Some(at("2026-01-01T00:05:00Z")));

        let after = at("2026-01-01T00:05:01Z");
        assert_eq!(budget.reserve(after), Duration::ZERO);
        assert_eq!(budget.remaining(), None);
        assert_eq!(budget.reset_at(), None);
    }

    #[test]
    fn every_caller_before_the_reset_is_held() {
        let budget = RateBudget::new(1);
        let now = at("2026-01-01T00:00:00Z");
        budget.observe_at(
            &headers(&[
                ("x-ratelimit-remaining", "1"),
                ("x-ratelimit-reset", "2026-01-01T00:02:00Z"),
            ]),
            now,
        );
        assert_eq!(budget.reserve(now), Duration::from_secs(120));
        assert_eq!(budget.reserve(now), Duration::from_secs(120));
        assert_eq!(
            budget.reserve(at("2026-01-01T00:01:30Z")),
            Duration::from_secs(30)
        );
        assert_eq!(budget.reserve(at("2026-01-01T00:02:00Z")), Duration::ZERO);
    }

    #[test]
    fn reset_in_the_past_does_not_wait() {
        let budget = RateBudget::new(10);
        let now = at("2026-01-01T00:10:00Z");
        budget.observe_at(
            &headers(&[
                ("x-ratelimit-remaining", "3"),
                ("x-ratelimit-reset", "2026-01-01T00:05:00Z"),
            ]),
            now,
        );
        assert_eq!(budget.reserve(now), Duration::ZERO);
    }

    #[test]
    fn exhausted_without_reset_uses_fallback() {
        let budget = RateBudget::new(0);
        let now = at("2026-01-01T00:00:00Z");
        budget.observe_at(&headers(&[("x-rate-limit-remaining", "0")]), now);
        assert_eq!(budget.reserve(now), FALLBACK_WAIT);
        assert_eq!(
            budget.reserve(at("2026-01-01T00:01:00Z")),
            FALLBACK_WAIT - Duration::from_secs(60)
        );
    }

    #[test]
    fn parses_epoch_and_relative_resets() {
        let now = at("2026-01-01T00:00:00Z");
        let epoch = parse_reset("1767225660", now).unwrap();
        assert_eq!(epoch, at("2026-01-01T00:01:00Z"));
        let rel = parse_reset("30", now).unwrap();
        assert_eq!(rel, at("2026-01-01T00:00:30Z"));
        assert!(parse_reset("soon", now).is_none());
    }

    #[test]
    fn clones_share_the_counter() {
        let a = RateBudget::new(0);
        let b = a.clone();
        a.observe_at(&headers(&[("x-ratelimit-remaining", "5")]), Utc::now());
        b.reserve(Utc::now());
        assert_eq!(a.remaining(), Some(4));
    }
}
