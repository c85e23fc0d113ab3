//! Dashboard-side client for the aggregate attendance route.
//!
//! Wraps the HTTP call in a [`ClientAttendanceCache`] so repeated renders reuse
//! one payload, and refreshes stale payloads in the background.

pub mod cache;

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::auth::auth::BearerToken;
use crate::config::Config;
use crate::model::dashboard::AllAttendanceResponse;
use crate::utils::clock::{self, SharedClock};

pub use cache::{CachedValue, ClientAttendanceCache};

pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("request timed out")]
    Timeout,

    #[error("server returned {status}: {message}")]
    Status { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("invalid response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ClientError::Timeout
        } else if e.is_decode() {
            ClientError::Decode(e.to_string())
        } else {
            ClientError::Transport(e.to_string())
        }
    }
}

#[derive(Clone)]
pub struct DashboardClient {
    http: Client,
    api_base: String,
    token: BearerToken,
    cache: ClientAttendanceCache<AllAttendanceResponse>,
}

impl DashboardClient {
    /// Client for this server as reached from the dashboard, chosen by `APP_ENV`.
    pub fn new(config: &Config, token: BearerToken) -> Result<Self, ClientError> {
        let api_base = format!(
            "{}{}",
            config.self_base_url(),
            config.api_prefix.trim_end_matches('/')
        );
        Self::with_api_base(api_base, token, clock::system())
    }

    pub fn with_api_base(
        api_base: impl Into<String>,
        token: BearerToken,
        clock: SharedClock,
    ) -> Result<Self, ClientError> {
        let http = Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token,
            cache: ClientAttendanceCache::with_defaults(clock),
        })
    }

    pub fn cache(&self) -> &ClientAttendanceCache<AllAttendanceResponse> {
        &self.cache
    }

    pub fn cache_key(&self) -> String {
        format!("all-attendance:{}", self.token.fingerprint())
    }

    /// Aggregate attendance through the de-duplicating cache.
    pub async fn all_attendance(&self, force: bool) -> Result<AllAttendanceResponse, ClientError> {
        let http = self.http.clone();
        let url = format!("{}/all-attendance", self.api_base);
        let token = self.token.clone();

        self.cache
            .fetch_with_deduplication(&self.cache_key(), force, move || {
                fetch_all_attendance(http, url, token)
            })
            .await
    }

    /// Stale-while-revalidate load: a stale hit is returned at once while a
    /// forced refresh runs in the background; a miss waits for the fetch.
    pub async fn load(&self) -> Result<AllAttendanceResponse, ClientError> {
        if let Some(CachedValue { data, is_stale }) = self.cache.get(&self.cache_key()) {
            if is_stale {
                debug!("Serving stale attendance, refreshing in background");
                let this = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = this.all_attendance(true).await {
                        warn!(error = %e, "Background attendance refresh failed");
                    }
                });
            }
            return Ok(data);
        }

        self.all_attendance(false).await
    }

    /// Clears the local cache, then asks the server to drop its entries.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.cache.clear();

        let response = self
            .http
            .post(format!("{}/logout", self.api_base))
            .bearer_auth(self.token.as_str())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                message: "logout rejected".to_string(),
            });
        }

        info!("Logged out, caches cleared");
        Ok(())
    }
}

async fn fetch_all_attendance(
    http: Client,
    url: String,
    token: BearerToken,
) -> Result<AllAttendanceResponse, ClientError> {
    let response = http.get(&url).bearer_auth(token.as_str()).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body: Value = response.json().await.unwrap_or_default();
        let message = body
            .get("error")
            .and_then(Value::as_str)
            .unwrap_or("Failed to fetch attendance")
            .to_string();
        return Err(ClientError::Status {
            status: status.as_u16(),
            message,
        });
    }

    Ok(response.json().await?)
}
