//! In-memory fixed-window rate limiter keyed by client.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use reviews_core::ports::{RateLimitError, RateLimitResult, RateLimiter};

/// In-memory rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests per window.
    pub max_requests: u32,
    /// Window duration.
    pub window: Duration,
    /// Buckets untouched for this long are evicted. Never shorter than `window`.
    pub idle_timeout: Duration,
    /// Upper bound on tracked client keys.
    pub max_keys: usize,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 100,
            window: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(300),
            max_keys: 10_000,
        }
    }
}

#[derive(Debug)]
struct Bucket {
    count: u32,
    window_start: Instant,
    last_seen: Instant,
}

impl Bucket {
    fn new(now: Instant) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }
}

type SharedBucket = Arc<Mutex<Bucket>>;

/// Fixed-window limiter: each key gets `max_requests` per `window`.
///
/// Every key has its own fair mutex, so concurrent requests for one key are
/// checked one at a time in arrival order while different keys never wait
/// on each other. Note: limits are per-process, not distributed across
/// instances.
pub struct InMemoryRateLimiter {
    buckets: DashMap<String, SharedBucket>,
    config: RateLimitConfig,
}

impl InMemoryRateLimiter {
    pub fn new(mut config: RateLimitConfig) -> Self {
        config.max_requests = config.max_requests.max(1);
        config.max_keys = config.max_keys.max(1);
        config.idle_timeout = config.idle_timeout.max(config.window);

        Self {
            buckets: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Number of tracked client keys.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Evict buckets idle for longer than `idle_timeout`. Returns how many
    /// were removed.
    ///
    /// A bucket is only removed while nobody else holds it, so an in-flight
    /// check can never be applied to an evicted bucket.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let idle_timeout = self.config.idle_timeout;
        let before = self.buckets.len();

        self.buckets.retain(|_, bucket| {
            if Arc::strong_count(bucket) > 1 {
                return true;
            }
            match bucket.try_lock() {
                Ok(state) => now.duration_since(state.last_seen) < idle_timeout,
                Err(_) => true,
            }
        });

        before.saturating_sub(self.buckets.len())
    }

    /// Periodically sweep idle buckets until the limiter is dropped.
    pub fn spawn_sweeper(limiter: &Arc<Self>) -> JoinHandle<()> {
        let period = limiter.config.idle_timeout;
        let weak: Weak<Self> = Arc::downgrade(limiter);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(limiter) = weak.upgrade() else {
                    break;
                };
                let evicted = limiter.sweep();
                if evicted > 0 {
                    tracing::debug!(evicted, tracked = limiter.len(), "Evicted idle rate limit buckets");
                }
            }
        })
    }

    fn bucket_for(&self, key: &str) -> SharedBucket {
        if let Some(bucket) = self.buckets.get(key) {
            return bucket.value().clone();
        }

        if self.buckets.len() >= self.config.max_keys {
            self.make_room();
        }

        self.buckets
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Bucket::new(Instant::now()))))
            .value()
            .clone()
    }

    /// Sweep idle buckets, then evict the least recently seen one if the
    /// map is still full.
    fn make_room(&self) {
        self.sweep();
        if self.buckets.len() < self.config.max_keys {
            return;
        }

        let oldest = self
            .buckets
            .iter()
            .filter_map(|entry| {
                let last_seen = entry.value().try_lock().ok()?.last_seen;
                Some((entry.key().clone(), last_seen))
            })
            .min_by_key(|(_, last_seen)| *last_seen)
            .map(|(key, _)| key);

        if let Some(key) = oldest {
            self.buckets
                .remove_if(&key, |_, bucket| Arc::strong_count(bucket) == 1);
            tracing::debug!(client = %key, "Evicted least recently seen rate limit bucket");
        }
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let bucket = self.bucket_for(key);
        let mut bucket = bucket.lock().await;

        let now = Instant::now();
        let window = self.config.window;
        if now.duration_since(bucket.window_start) >= window {
            bucket.window_start = now;
            bucket.count = 0;
        }
        bucket.last_seen = now;

        let reset_after = window.saturating_sub(now.duration_since(bucket.window_start));
        let max_requests = self.config.max_requests;

        if bucket.count < max_requests {
            bucket.count += 1;
            Ok(RateLimitResult {
                allowed: true,
                remaining: max_requests - bucket.count,
                reset_after,
            })
        } else {
            Ok(RateLimitResult {
                allowed: false,
                remaining: 0,
                reset_after,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(max_requests: u32, window: Duration) -> InMemoryRateLimiter {
        InMemoryRateLimiter::new(RateLimitConfig {
            max_requests,
            window,
            ..Default::default()
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_then_reject_with_retry_hint() {
        let limiter = limiter(5, Duration::from_secs(1));

        for expected_remaining in (0..5).rev() {
            let result = limiter.check("A").await.unwrap();
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let sixth = limiter.check("A").await.unwrap();
        assert!(!sixth.allowed);
        assert!(sixth.reset_after <= Duration::from_secs(1));
        assert_eq!(sixth.retry_after_secs(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_budget_recovers_at_window_boundary() {
        let limiter = limiter(2, Duration::from_secs(1));

        assert!(limiter.check("A").await.unwrap().allowed);
        assert!(limiter.check("A").await.unwrap().allowed);
        assert!(!limiter.check("A").await.unwrap().allowed);

        tokio::time::advance(Duration::from_millis(400)).await;
        let still_limited = limiter.check("A").await.unwrap();
        assert!(!still_limited.allowed);
        assert_eq!(still_limited.reset_after, Duration::from_millis(600));

        tokio::time::advance(Duration::from_millis(600)).await;
        assert!(limiter.check("A").await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = limiter(1, Duration::from_secs(60));

        assert!(limiter.check("A").await.unwrap().allowed);
        assert!(!limiter.check("A").await.unwrap().allowed);
        assert!(limiter.check("B").await.unwrap().allowed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_burst_admits_exactly_capacity() {
        let capacity = 25;
        let limiter = Arc::new(limiter(capacity, Duration::from_secs(60)));
        let barrier = Arc::new(tokio::sync::Barrier::new(capacity as usize * 2));

        let handles: Vec<_> = (0..capacity * 2)
            .map(|_| {
                let limiter = limiter.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    limiter.check("burst").await.unwrap().allowed
                })
            })
            .collect();

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                admitted += 1;
            }
        }

        assert_eq!(admitted, capacity);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_buckets() {
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            max_requests: 10,
            window: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(5),
            max_keys: 100,
        });

        limiter.check("old").await.unwrap();
        tokio::time::advance(Duration::from_secs(4)).await;
        limiter.check("fresh").await.unwrap();
        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(limiter.sweep(), 1);
        assert_eq!(limiter.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_key_churn_is_bounded() {
        let limiter = InMemoryRateLimiter::new(RateLimitConfig {
            max_requests: 10,
            window: Duration::from_secs(1),
            idle_timeout: Duration::from_secs(60),
            max_keys: 3,
        });

        for i in 0..10 {
            limiter.check(&format!("10.0.0.{i}")).await.unwrap();
            tokio::time::advance(Duration::from_millis(10)).await;
        }

        assert_eq!(limiter.len(), 3);
        assert!(limiter.buckets.contains_key("10.0.0.9"));
        assert!(!limiter.buckets.contains_key("10.0.0.0"));
    }
}
