//! Redis fixed-window rate limiter, shared by every server instance.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{Client, Script};

use reviews_core::ports::{RateLimitError, RateLimitResult, RateLimiter};

/// Redis rate limiter configuration.
#[derive(Debug, Clone)]
pub struct RedisRateLimitConfig {
    /// Redis URL (e.g., redis://localhost:6379)
    pub url: String,
    pub connect_timeout: Duration,
    /// Maximum requests per window
    pub max_requests: u32,
    pub window: Duration,
    /// Key prefix for rate limit keys
    pub key_prefix: String,
}

impl Default for RedisRateLimitConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            connect_timeout: Duration::from_secs(5),
            max_requests: 100,
            window: Duration::from_secs(60),
            key_prefix: "reviews:ratelimit".to_string(),
        }
    }
}

/// Counter per key that expires with its window. INCR and PEXPIRE run in
/// one Lua script so the check-and-decrement is atomic on the server.
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    config: RedisRateLimitConfig,
    script: Script,
}

impl RedisRateLimiter {
    pub async fn new(config: RedisRateLimitConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(config.url.as_str())
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let conn = tokio::time::timeout(config.connect_timeout, ConnectionManager::new(client))
            .await
            .map_err(|_| RateLimitError::Backend("Connection timed out".to_string()))?
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        // Returns: [current_count, pttl_remaining]
        let script = Script::new(
            r#"
            local current = redis.call('INCR', KEYS[1])
            if current == 1 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
            end
            local ttl = redis.call('PTTL', KEYS[1])
            if ttl < 0 then
                redis.call('PEXPIRE', KEYS[1], ARGV[1])
                ttl = tonumber(ARGV[1])
            end
            return {current, ttl}
            "#,
        );

        tracing::info!(url = %config.url, "Connected to Redis rate limiter");

        Ok(Self {
            conn,
            config,
            script,
        })
    }

    fn make_key(&self, key: &str) -> String {
        format!("{}:{}", self.config.key_prefix, key)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let mut conn = self.conn.clone();
        let window_ms = self.config.window.as_millis().max(1) as u64;

        let (count, ttl_ms): (i64, i64) = self
            .script
            .key(self.make_key(key))
            .arg(window_ms)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        let max_requests = i64::from(self.config.max_requests);
        let allowed = count <= max_requests;

        Ok(RateLimitResult {
            allowed,
            remaining: (max_requests - count).max(0) as u32,
            reset_after: Duration::from_millis(ttl_ms.max(0) as u64),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_limiter() -> Option<RedisRateLimiter> {
        let config = RedisRateLimitConfig {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            connect_timeout: Duration::from_secs(1),
            max_requests: 2,
            window: Duration::from_secs(1),
            key_prefix: format!("test_ratelimit:{}", uuid::Uuid::new_v4()),
        };

        RedisRateLimiter::new(config).await.ok()
    }

    #[tokio::test]
    async fn test_redis_fixed_window() {
        // Skipped when no Redis server is reachable.
        let Some(limiter) = test_limiter().await else {
            return;
        };

        let res = limiter.check("client").await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 1);

        let res = limiter.check("client").await.unwrap();
        assert!(res.allowed);
        assert_eq!(res.remaining, 0);

        let res = limiter.check("client").await.unwrap();
        assert!(!res.allowed);
        assert!(res.reset_after <= Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(limiter.check("client").await.unwrap().allowed);
    }
}
