//! Retry policy and adaptive provider rate limiting.
//!
//! Every AI call waits for its governor permit via `until_ready()`. On 429 the
//! governor is slowed and the call site backs off before retrying; other
//! transient failures use bounded exponential backoff.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::ai::AiError;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one.
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    /// Retry responses whose JSON payload could not be parsed.
    pub retry_malformed: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            retry_malformed: true,
        }
    }
}

impl RetryPolicy {
    /// Whether `err` after attempt number `attempt` (1-based) warrants another try.
    pub fn should_retry(&self, attempt: u32, err: &AiError) -> bool {
        if attempt >= self.max_attempts.max(1) {
            return false;
        }
        err.is_transient() || (self.retry_malformed && err.raw_response().is_some())
    }

    /// Deterministic part of the wait after attempt `attempt`: `base * 2^(attempt-1)`, capped.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_backoff
            .saturating_mul(1u32 << exp)
            .min(self.max_backoff)
    }

    /// Wait before the next attempt, with up to 25% jitter. A provider's
    /// Retry-After is honored when it is longer.
    pub fn delay(&self, attempt: u32, err: &AiError) -> Duration {
        let base = self.base_delay(attempt);
        let jitter_ms = (base.as_millis() as u64) / 4;
        let delay = base + Duration::from_millis(fastrand::u64(0..=jitter_ms));
        match err {
            AiError::RateLimited {
                retry_after: Some(wait),
            } => delay.max(*wait),
            _ => delay,
        }
    }
}

/// Provider rate limiter with adaptive slowdown via ArcSwap.
///
/// When a 429 is received, the governor is atomically swapped to a slower rate.
/// After 60s with no 429s, the original rate is restored.
pub struct AdaptiveLimiter {
    limiter: ArcSwap<DirectLimiter>,
    base_period: Duration,
    /// Current slowdown factor (1 = normal, 2 = half rate, etc.).
    current_factor: AtomicU32,
    last_429: std::sync::Mutex<Option<Instant>>,
}

fn quota_for(period: Duration) -> Quota {
    Quota::with_period(period).unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
}

impl AdaptiveLimiter {
    pub fn new(period: Duration) -> Self {
        let period = period.max(Duration::from_millis(1));
        let limiter = Arc::new(DirectLimiter::direct(quota_for(period)));
        Self {
            limiter: ArcSwap::from(limiter),
            base_period: period,
            current_factor: AtomicU32::new(1),
            last_429: std::sync::Mutex::new(None),
        }
    }

    /// Allow `n` requests per minute.
    pub fn per_minute(n: u32) -> Self {
        Self::new(Duration::from_secs(60) / n.max(1))
    }

    /// Wait until the limiter allows a request.
    pub async fn acquire(&self) {
        self.try_decay();
        let limiter = self.limiter.load();
        limiter.until_ready().await;
    }

    /// Double the slowdown factor (capped at 16x) and swap the governor.
    pub fn on_rate_limited(&self) {
        if let Ok(mut last) = self.last_429.lock() {
            *last = Some(Instant::now());
        }

        let _ = self
            .current_factor
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |f| {
                Some((f * 2).min(16))
            });

        let factor = self.current_factor.load(Ordering::SeqCst);
        if let Some(scaled) = self.base_period.checked_mul(factor) {
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(scaled))));
        }
    }

    pub fn slowdown_factor(&self) -> u32 {
        self.current_factor.load(Ordering::SeqCst)
    }

    fn try_decay(&self) {
        let should_restore = self
            .last_429
            .lock()
            .ok()
            .and_then(|last| last.map(|t| t.elapsed().as_secs() >= 60))
            .unwrap_or(false);

        if should_restore && self.current_factor.load(Ordering::SeqCst) > 1 {
            self.current_factor.store(1, Ordering::SeqCst);
            self.limiter
                .store(Arc::new(DirectLimiter::direct(quota_for(self.base_period))));
        }
    }
}

/// Parse a Retry-After header value (seconds or HTTP-date).
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    if let Ok(secs) = value.trim().parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }
    // HTTP-date: fall back to a conservative fixed wait
    if value.contains(',') || value.contains("GMT") {
        return Some(Duration::from_secs(5));
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(5),
            ..RetryPolicy::default()
        };
        assert_eq!(policy.base_delay(1), Duration::from_secs(1));
        assert_eq!(policy.base_delay(2), Duration::from_secs(2));
        assert_eq!(policy.base_delay(3), Duration::from_secs(4));
        assert_eq!(policy.base_delay(4), Duration::from_secs(5));
        assert_eq!(policy.base_delay(40), Duration::from_secs(5));
    }

    #[test]
    fn jitter_stays_within_a_quarter() {
        let policy = RetryPolicy::default();
        for _ in 0..50 {
            let d = policy.delay(1, &AiError::Timeout);
            assert!(d >= Duration::from_secs(2));
            assert!(d <= Duration::from_millis(2500));
        }
    }

    #[test]
    fn retry_after_wins_when_longer() {
        let policy = RetryPolicy::default();
        let err = AiError::RateLimited {
            retry_after: Some(Duration::from_secs(30)),
        };
        assert_eq!(policy.delay(1, &err), Duration::from_secs(30));
    }

    #[test]
    fn attempts_are_bounded() {
        let policy = RetryPolicy {
            max_attempts: 3,
            ..RetryPolicy::default()
        };
        assert!(policy.should_retry(1, &AiError::Timeout));
        assert!(policy.should_retry(2, &AiError::Timeout));
        assert!(!policy.should_retry(3, &AiError::Timeout));
    }

    #[test]
    fn malformed_retry_is_optional() {
        let err = AiError::MalformedResponse {
            reason: "no json".into(),
            raw: "sorry".into(),
        };
        assert!(RetryPolicy::default().should_retry(1, &err));
        let strict = RetryPolicy {
            retry_malformed: false,
            ..RetryPolicy::default()
        };
        assert!(!strict.should_retry(1, &err));
    }

    #[test]
    fn rate_limit_slows_down_and_caps() {
        let limiter = AdaptiveLimiter::per_minute(60);
        assert_eq!(limiter.slowdown_factor(), 1);
        for _ in 0..6 {
            limiter.on_rate_limited();
        }
        assert_eq!(limiter.slowdown_factor(), 16);
    }

    #[test]
    fn parses_retry_after_values() {
        assert_eq!(parse_retry_after("12"), Some(Duration::from_secs(12)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::from_secs(5))
        );
        assert_eq!(parse_retry_after("soon"), None);
    }
}
