//! Application configuration loaded from environment variables.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use reviews_infra::database::DatabaseConfig;
use reviews_infra::rate_limit::RateLimitConfig;

/// Deployment environment. Drives cookie security, HSTS and log verbosity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "production" | "prod" => Ok(Environment::Production),
            other => Err(format!("unknown environment: {other}")),
        }
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Where rate limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub backend: RateLimitBackend,
    pub limits: RateLimitConfig,
    pub redis_url: Option<String>,
    /// Key clients by `Forwarded`/`X-Forwarded-For` instead of the peer
    /// address. Only safe behind a proxy that overwrites these headers.
    pub trust_forwarded_for: bool,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub public_url: String,
    pub database: Option<DatabaseConfig>,
    pub rate_limit: RateLimitSettings,
    pub shutdown_timeout: Duration,
    pub healthcheck_delay: Duration,
    pub unit_of_work_timeout: Option<Duration>,
    pub metrics_token: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub csrf_exempt_paths: Vec<String>,
}

fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn parse_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(false)
}

/// Split a comma-separated list, dropping blanks.
fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = parse_or("PORT", 8080);

        let database = non_empty("DATABASE_URL").map(|url| {
            let mut config = DatabaseConfig::new(url);
            config.max_connections = parse_or("DB_MAX_CONNECTIONS", config.max_connections);
            config.min_connections = parse_or("DB_MIN_CONNECTIONS", config.min_connections);
            config
        });

        let defaults = RateLimitConfig::default();
        let rate_limit = RateLimitSettings {
            backend: match env::var("RATE_LIMIT_BACKEND").as_deref() {
                Ok("redis") => RateLimitBackend::Redis,
                _ => RateLimitBackend::Memory,
            },
            limits: RateLimitConfig {
                max_requests: parse_or("RATE_LIMIT_MAX_REQUESTS", defaults.max_requests),
                window: Duration::from_secs(parse_or(
                    "RATE_LIMIT_WINDOW_SECS",
                    defaults.window.as_secs(),
                )),
                idle_timeout: Duration::from_secs(parse_or(
                    "RATE_LIMIT_IDLE_SECS",
                    defaults.idle_timeout.as_secs(),
                )),
                max_keys: parse_or("RATE_LIMIT_MAX_KEYS", defaults.max_keys),
            },
            redis_url: non_empty("REDIS_URL"),
            trust_forwarded_for: parse_flag("TRUST_FORWARDED_FOR"),
        };

        Self {
            public_url: env::var("PUBLIC_URL").unwrap_or_else(|_| format!("http://{host}:{port}")),
            host,
            port,
            environment: env::var("APP_ENV")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or_default(),
            database,
            rate_limit,
            shutdown_timeout: Duration::from_secs(parse_or("SHUTDOWN_TIMEOUT_SECS", 10)),
            healthcheck_delay: Duration::from_millis(parse_or("HEALTHCHECK_DELAY_MS", 5000)),
            unit_of_work_timeout: non_empty("UNIT_OF_WORK_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs),
            metrics_token: non_empty("METRICS_TOKEN"),
            notify_webhook_url: non_empty("NOTIFY_WEBHOOK_URL"),
            csrf_exempt_paths: env::var("CSRF_EXEMPT_PATHS")
                .map(|raw| parse_list(&raw))
                .unwrap_or_else(|_| vec!["/webhook".to_string()]),
        }
    }
}
