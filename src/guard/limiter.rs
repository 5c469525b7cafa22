//! Fixed-window attempt counters for the access guard.
//!
//! A window opens at the first hit for a key and resets entirely once the
//! class's decay interval has elapsed, as opposed to a sliding window.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::config::{LimitClass, LimitRule};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CounterKey {
    class: LimitClass,
    identity: String,
}

#[derive(Debug, Clone, Copy)]
struct Window {
    count: u32,
    started: Instant,
}

/// Outcome of a single admission check.
#[derive(Debug, Clone, Copy)]
pub struct Decision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    /// Time until the current window resets.
    pub reset_after: Duration,
}

#[derive(Debug, Default)]
pub struct RateLimiter {
    windows: Mutex<HashMap<CounterKey, Window>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check the key against its rule and, if admitted, count the attempt.
    /// A missing entry reads as zero attempts.
    pub fn check_and_record(&self, class: LimitClass, identity: &str, rule: LimitRule) -> Decision {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        let key = CounterKey { class, identity: identity.to_string() };
        let window = windows.entry(key).or_insert(Window { count: 0, started: now });

        if now.duration_since(window.started) >= rule.decay {
            window.count = 0;
            window.started = now;
        }

        let reset_after = rule.decay.saturating_sub(now.duration_since(window.started));

        if window.count >= rule.max_attempts {
            return Decision {
                allowed: false,
                limit: rule.max_attempts,
                remaining: 0,
                reset_after,
            };
        }

        window.count += 1;
        Decision {
            allowed: true,
            limit: rule.max_attempts,
            remaining: rule.max_attempts - window.count,
            reset_after,
        }
    }

    /// Drop windows whose decay interval has fully elapsed.
    pub fn cleanup(&self, rule_for: impl Fn(LimitClass) -> LimitRule) {
        let now = Instant::now();
        let mut windows = self.windows.lock();
        windows.retain(|key, window| {
            now.duration_since(window.started) < rule_for(key.class).decay
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn sixth_attempt_is_denied() {
        let limiter = RateLimiter::new();
        let rule = LimitRule { max_attempts: 5, decay: Duration::from_secs(900) };

        for i in 0..5 {
            let d = limiter.check_and_record(LimitClass::Login, "1.2.3.4", rule);
            assert!(d.allowed);
            assert_eq!(d.remaining, 4 - i);
        }

        let d = limiter.check_and_record(LimitClass::Login, "1.2.3.4", rule);
        assert!(!d.allowed);
        assert_eq!(d.remaining, 0);
        assert!(d.reset_after > Duration::ZERO);
    }

    #[test]
    fn keys_are_independent_per_class_and_identity() {
        let limiter = RateLimiter::new();
        let rule = LimitRule { max_attempts: 1, decay: Duration::from_secs(60) };

        assert!(limiter.check_and_record(LimitClass::Login, "1.2.3.4", rule).allowed);
        assert!(!limiter.check_and_record(LimitClass::Login, "1.2.3.4", rule).allowed);

        // same identity, other class: separate window
        assert!(limiter.check_and_record(LimitClass::Api, "1.2.3.4", rule).allowed);
        // same class, other identity
        assert!(limiter.check_and_record(LimitClass::Login, "user:7", rule).allowed);
    }

    #[test]
    fn window_resets_fully_after_decay() {
        let limiter = RateLimiter::new();
        let rule = LimitRule { max_attempts: 2, decay: Duration::from_millis(50) };

        assert!(limiter.check_and_record(LimitClass::Guest, "ip", rule).allowed);
        assert!(limiter.check_and_record(LimitClass::Guest, "ip", rule).allowed);
        assert!(!limiter.check_and_record(LimitClass::Guest, "ip", rule).allowed);

        sleep(Duration::from_millis(60));

        // fixed window: the whole budget is back, not a gradual refill
        let d = limiter.check_and_record(LimitClass::Guest, "ip", rule);
        assert!(d.allowed);
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn denied_attempts_do_not_extend_the_window() {
        let limiter = RateLimiter::new();
        let rule = LimitRule { max_attempts: 1, decay: Duration::from_millis(50) };

        assert!(limiter.check_and_record(LimitClass::Guest, "ip", rule).allowed);
        sleep(Duration::from_millis(30));
        // denied; window start stays at the first hit
        assert!(!limiter.check_and_record(LimitClass::Guest, "ip", rule).allowed);
        sleep(Duration::from_millis(30));
        // decay measured from the first hit has elapsed
        assert!(limiter.check_and_record(LimitClass::Guest, "ip", rule).allowed);
    }

    #[test]
    fn cleanup_drops_expired_windows() {
        let limiter = RateLimiter::new();
        let rule = LimitRule { max_attempts: 5, decay: Duration::from_millis(20) };

        limiter.check_and_record(LimitClass::Guest, "ip", rule);
        assert_eq!(limiter.windows.lock().len(), 1);

        sleep(Duration::from_millis(30));
        limiter.cleanup(|_| rule);
        assert!(limiter.windows.lock().is_empty());
    }
}
