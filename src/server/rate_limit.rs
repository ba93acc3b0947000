// ! Request rate limiting
// !
// ! Token buckets checked before routing, either one per client or one shared by
// ! the whole server. Buckets of clients that went quiet are swept periodically.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::warn;

use crate::core::error::{McpError, McpResult};

const GLOBAL_BUCKET: &str = "*";

/// Rate limiting configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained requests per second
    pub requests_per_second: f64,
    /// Requests allowed in a burst above the sustained rate
    pub burst: u32,
    /// One bucket per client instead of one for the server
    pub per_client: bool,
    /// Buckets idle this long are dropped
    pub idle_ttl_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst: 20,
            per_client: true,
            idle_ttl_secs: 300,
        }
    }
}

#[derive(Debug)]
struct TokenBucket {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    fn full(burst: u32, now: Instant) -> Self {
        Self {
            tokens: f64::from(burst),
            last_refill: now,
        }
    }

    fn try_take(&mut self, rate: f64, burst: u32, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * rate).min(f64::from(burst));
        self.last_refill = now;

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }
}

#[derive(Debug)]
struct Buckets {
    by_key: HashMap<String, TokenBucket>,
    last_sweep: Instant,
}

/// Token-bucket limiter shared by all requests of a server
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    buckets: Mutex<Buckets>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Mutex::new(Buckets {
                by_key: HashMap::new(),
                last_sweep: Instant::now(),
            }),
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Take one token for `client_id`, or fail with [`McpError::RateLimited`]
    pub fn check(&self, client_id: &str) -> McpResult<()> {
        let key = if self.config.per_client {
            client_id
        } else {
            GLOBAL_BUCKET
        };
        let now = Instant::now();
        let ttl = Duration::from_secs(self.config.idle_ttl_secs);

        let mut buckets = self.buckets.lock();
        if now.saturating_duration_since(buckets.last_sweep) >= ttl {
            sweep(&mut buckets.by_key, now, ttl);
            buckets.last_sweep = now;
        }

        let allowed = buckets
            .by_key
            .entry(key.to_string())
            .or_insert_with(|| TokenBucket::full(self.config.burst, now))
            .try_take(self.config.requests_per_second, self.config.burst, now);

        if allowed {
            Ok(())
        } else {
            warn!(client_id, "Rate limit exceeded");
            Err(McpError::RateLimited("rate limit exceeded".to_string()))
        }
    }

    /// Drop buckets idle longer than the configured TTL
    pub fn cleanup(&self) -> usize {
        let ttl = Duration::from_secs(self.config.idle_ttl_secs);
        let now = Instant::now();
        let mut buckets = self.buckets.lock();
        let before = buckets.by_key.len();
        sweep(&mut buckets.by_key, now, ttl);
        buckets.last_sweep = now;
        before - buckets.by_key.len()
    }

    pub fn tracked_clients(&self) -> usize {
        self.buckets.lock().by_key.len()
    }
}

fn sweep(buckets: &mut HashMap<String, TokenBucket>, now: Instant, ttl: Duration) {
    buckets.retain(|_, bucket| now.saturating_duration_since(bucket.last_refill) < ttl);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(burst: u32, per_client: bool) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            requests_per_second: 0.001,
            burst,
            per_client,
            idle_ttl_secs: 300,
        })
    }

    #[test]
    fn test_burst_then_limited() {
        let limiter = limiter(2, true);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_ok());

        let err = limiter.check("a").unwrap_err();
        assert!(matches!(err, McpError::RateLimited(_)));
        assert_eq!(err.code(), -32429);
    }

    #[test]
    fn test_clients_have_separate_buckets() {
        let limiter = limiter(1, true);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("a").is_err());
        assert!(limiter.check("b").is_ok());
        assert_eq!(limiter.tracked_clients(), 2);
    }

    #[test]
    fn test_global_bucket_is_shared() {
        let limiter = limiter(1, false);
        assert!(limiter.check("a").is_ok());
        assert!(limiter.check("b").is_err());
        assert_eq!(limiter.tracked_clients(), 1);
    }

    #[test]
    fn test_tokens_refill() {
        let limiter = RateLimiter::new(RateLimitConfig {
            requests_per_second: 1000.0,
            burst: 1,
            ..Default::default()
        });
        assert!(limiter.check("a").is_ok());
        std::thread::sleep(Duration::from_millis(10));
        assert!(limiter.check("a").is_ok());
    }

    #[test]
    fn test_cleanup_drops_idle_buckets() {
        let limiter = RateLimiter::new(RateLimitConfig {
            idle_ttl_secs: 0,
            ..Default::default()
        });
        limiter.check("a").unwrap();
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked_clients(), 0);
    }
}
