use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

use crate::services::batch::{Backoff, BatchConfig};

#[derive(Clone, Debug)]
pub struct Config {
    pub server_addr: String,
    pub api_prefix: String,

    /// `production` switches self-calls to `public_app_url`.
    pub app_env: String,
    pub public_app_url: String,

    // Upstream ERP
    pub upstream_base_url: String,
    pub upstream_web_origin: String,
    pub request_timeout: Duration,
    pub subject_fetch_timeout: Duration,
    pub quiz_timeout: Duration,

    // Per-subject fan-out
    pub batch_max_concurrency: usize,
    pub batch_retry_attempts: u32,

    // Caches
    pub response_cache_ttl: Duration,
    pub response_cache_capacity: usize,
    pub summary_cache_ttl: Duration,
    pub quiz_cache_ttl: Duration,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_protected_per_min: u32,

    /// Single browser origin allowed by CORS, with credentials.
    pub cors_allowed_origin: String,

    pub log_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: "127.0.0.1:3001".to_string(),
            api_prefix: "/api".to_string(),
            app_env: "development".to_string(),
            public_app_url: "http://localhost:3001".to_string(),
            upstream_base_url: "https://abes.platform.simplifii.com/api/v1".to_string(),
            upstream_web_origin: "https://abes.web.simplifii.com".to_string(),
            request_timeout: Duration::from_secs(10),
            subject_fetch_timeout: Duration::from_secs(8),
            quiz_timeout: Duration::from_secs(8),
            batch_max_concurrency: 6,
            batch_retry_attempts: 2,
            response_cache_ttl: Duration::from_secs(2 * 60),
            response_cache_capacity: 100,
            summary_cache_ttl: Duration::from_secs(5 * 60),
            quiz_cache_ttl: Duration::from_secs(5 * 60),
            rate_login_per_min: 60,
            rate_protected_per_min: 1000,
            cors_allowed_origin: "http://localhost:3000".to_string(),
            log_dir: "logs".to_string(),
        }
    }
}

fn var_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw:?}")),
        Err(_) => Ok(default),
    }
}

fn secs_or(key: &str, default: Duration) -> Result<Duration> {
    var_or(key, default.as_secs()).map(Duration::from_secs)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let d = Self::default();

        Ok(Self {
            server_addr: var_or("SERVER_ADDR", d.server_addr)?,
            api_prefix: var_or("API_PREFIX", d.api_prefix)?,
            app_env: var_or("APP_ENV", d.app_env)?,
            public_app_url: var_or("PUBLIC_APP_URL", d.public_app_url)?,

            upstream_base_url: var_or("UPSTREAM_BASE_URL", d.upstream_base_url)?,
            upstream_web_origin: var_or("UPSTREAM_WEB_ORIGIN", d.upstream_web_origin)?,
            request_timeout: secs_or("REQUEST_TIMEOUT_SECS", d.request_timeout)?,
            subject_fetch_timeout: secs_or("SUBJECT_FETCH_TIMEOUT_SECS", d.subject_fetch_timeout)?,
            quiz_timeout: secs_or("QUIZ_TIMEOUT_SECS", d.quiz_timeout)?,

            batch_max_concurrency: var_or("BATCH_MAX_CONCURRENCY", d.batch_max_concurrency)?,
            batch_retry_attempts: var_or("BATCH_RETRY_ATTEMPTS", d.batch_retry_attempts)?,

            response_cache_ttl: secs_or("RESPONSE_CACHE_TTL_SECS", d.response_cache_ttl)?,
            response_cache_capacity: var_or("RESPONSE_CACHE_CAPACITY", d.response_cache_capacity)?,
            summary_cache_ttl: secs_or("SUMMARY_CACHE_TTL_SECS", d.summary_cache_ttl)?,
            quiz_cache_ttl: secs_or("QUIZ_CACHE_TTL_SECS", d.quiz_cache_ttl)?,

            rate_login_per_min: var_or("RATE_LOGIN_PER_MIN", d.rate_login_per_min)?,
            rate_protected_per_min: var_or("RATE_PROTECTED_PER_MIN", d.rate_protected_per_min)?,

            cors_allowed_origin: var_or("CORS_ALLOWED_ORIGIN", d.cors_allowed_origin)?,

            log_dir: var_or("LOG_DIR", d.log_dir)?,
        })
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    /// Base URL the dashboard client should use to reach this server.
    pub fn self_base_url(&self) -> String {
        if self.is_production() {
            self.public_app_url.trim_end_matches('/').to_string()
        } else {
            let port = self
                .server_addr
                .rsplit_once(':')
                .map(|(_, p)| p)
                .unwrap_or("3001");
            format!("http://localhost:{port}")
        }
    }

    pub fn batch_config(&self) -> BatchConfig {
        BatchConfig {
            max_concurrency: self.batch_max_concurrency,
            retry_attempts: self.batch_retry_attempts,
            timeout: self.subject_fetch_timeout,
            backoff: Backoff::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn development_self_calls_use_localhost_port() {
        let config = Config {
            server_addr: "0.0.0.0:8080".to_string(),
            ..Config::default()
        };
        assert_eq!(config.self_base_url(), "http://localhost:8080");
    }

    #[test]
    fn production_self_calls_use_public_url() {
        let config = Config {
            app_env: "Production".to_string(),
            public_app_url: "https://attendance.example.edu/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.self_base_url(), "https://attendance.example.edu");
    }

    #[test]
    fn batch_config_follows_subject_timeout() {
        let config = Config {
            subject_fetch_timeout: Duration::from_secs(6),
            batch_max_concurrency: 4,
            ..Config::default()
        };
        let batch = config.batch_config();
        assert_eq!(batch.timeout, Duration::from_secs(6));
        assert_eq!(batch.max_concurrency, 4);
        assert_eq!(batch.retry_attempts, 2);
    }
}
