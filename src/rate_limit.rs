use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Fixed budget for one endpoint bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePolicy {
    pub bucket: &'static str,
    pub max_attempts: u64,
    pub window: Duration,
}

impl RatePolicy {
    pub const CHECK_UNIQUENESS: RatePolicy = RatePolicy {
        bucket: "check_uniqueness",
        max_attempts: 20,
        window: Duration::from_secs(60),
    };
    pub const REGISTER: RatePolicy = RatePolicy {
        bucket: "register",
        max_attempts: 5,
        window: Duration::from_secs(15 * 60),
    };
    pub const VERIFY_EMAIL: RatePolicy = RatePolicy {
        bucket: "verify_email",
        max_attempts: 10,
        window: Duration::from_secs(15 * 60),
    };
    pub const FORGOT_PASSWORD: RatePolicy = RatePolicy {
        bucket: "forgot_password",
        max_attempts: 3,
        window: Duration::from_secs(15 * 60),
    };
    pub const RESET_PASSWORD: RatePolicy = RatePolicy {
        bucket: "reset_password",
        max_attempts: 10,
        window: Duration::from_secs(15 * 60),
    };
    pub const LOGIN: RatePolicy = RatePolicy {
        bucket: "login",
        max_attempts: 5,
        window: Duration::from_secs(15 * 60),
    };

    /// Longest window of any policy; entries older than this are dead.
    pub const MAX_WINDOW: Duration = Duration::from_secs(15 * 60);

    pub fn key(&self, client: &str) -> String {
        format!("{}:{}", self.bucket, client)
    }
}

/// In-memory rate limiter keyed by (bucket, client).
/// Each bucket has its own max attempts and sliding window.
pub struct RateLimiter {
    entries: Mutex<HashMap<String, Vec<Instant>>>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    pub fn new() -> Self {
        RateLimiter {
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Instant>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record an attempt and return true if the attempt is allowed (under the limit).
    /// `key` should be something like "login:<ip>".
    pub fn check_and_record(&self, key: &str, max_attempts: u64, window: Duration) -> bool {
        let mut map = self.lock();
        let now = Instant::now();

        let attempts = map.entry(key.to_string()).or_default();
        attempts.retain(|t| now.duration_since(*t) < window);

        if (attempts.len() as u64) < max_attempts {
            attempts.push(now);
            true
        } else {
            false
        }
    }

    pub fn allow(&self, policy: &RatePolicy, client: &str) -> bool {
        let allowed = self.check_and_record(&policy.key(client), policy.max_attempts, policy.window);
        if !allowed {
            log::warn!("[rate_limit] {} rejected for {}", policy.bucket, client);
        }
        allowed
    }

    /// Drop stale entries. Returns how many keys were removed.
    pub fn cleanup(&self, max_age: Duration) -> usize {
        let mut map = self.lock();
        let now = Instant::now();
        let before = map.len();
        map.retain(|_, attempts| {
            attempts.retain(|t| now.duration_since(*t) < max_age);
            !attempts.is_empty()
        });
        before - map.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_after_threshold() {
        let limiter = RateLimiter::new();
        let policy = RatePolicy::LOGIN;
        for _ in 0..policy.max_attempts {
            assert!(limiter.allow(&policy, "10.0.0.1"));
        }
        assert!(!limiter.allow(&policy, "10.0.0.1"));
    }

    #[test]
    fn buckets_and_clients_are_independent() {
        let limiter = RateLimiter::new();
        for _ in 0..RatePolicy::FORGOT_PASSWORD.max_attempts {
            assert!(limiter.allow(&RatePolicy::FORGOT_PASSWORD, "a"));
        }
        assert!(!limiter.allow(&RatePolicy::FORGOT_PASSWORD, "a"));
        assert!(limiter.allow(&RatePolicy::FORGOT_PASSWORD, "b"));
        assert!(limiter.allow(&RatePolicy::LOGIN, "a"));
    }

    #[test]
    fn window_expiry_frees_budget() {
        let limiter = RateLimiter::new();
        let window = Duration::from_millis(30);
        assert!(limiter.check_and_record("k", 1, window));
        assert!(!limiter.check_and_record("k", 1, window));
        std::thread::sleep(Duration::from_millis(50));
        assert!(limiter.check_and_record("k", 1, window));
    }

    #[test]
    fn cleanup_drops_stale_keys() {
        let limiter = RateLimiter::new();
        assert!(limiter.check_and_record("old", 3, Duration::from_secs(60)));
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(limiter.cleanup(Duration::from_millis(5)), 1);
        assert!(limiter.check_and_record("old", 1, Duration::from_secs(60)));
    }
}
