use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, instrument};

use crate::auth::auth::BearerToken;
use crate::config::Config;
use crate::error::AppError;
use crate::services::attendance::CacheStatus;
use crate::services::erp::ErpClient;
use crate::utils::summary_cache::SummaryCache;

/// Evaluated quizzes per session, coalesced and held for `quiz_cache_ttl`.
pub struct QuizService {
    erp: ErpClient,
    cache: SummaryCache<Arc<Value>>,
}

impl QuizService {
    pub fn new(config: &Config, erp: ErpClient) -> Self {
        Self {
            erp,
            cache: SummaryCache::new(config.quiz_cache_ttl, config.response_cache_capacity as u64),
        }
    }

    #[instrument(skip_all, fields(session = %token.fingerprint()))]
    pub async fn quizzes(&self, token: &BearerToken) -> Result<(Arc<Value>, CacheStatus), AppError> {
        let key = token.fingerprint().to_string();
        if let Some(body) = self.cache.get(&key).await {
            debug!("Quiz cache hit");
            return Ok((body, CacheStatus::Hit));
        }

        let body = self
            .cache
            .get_or_fetch(&key, async {
                self.erp.quizzes(token.as_str()).await.map(Arc::new)
            })
            .await
            .map_err(|e: Arc<AppError>| (*e).clone())?;

        Ok((body, CacheStatus::Miss))
    }

    pub async fn forget(&self, token: &BearerToken) {
        let key = token.fingerprint().to_string();
        self.cache.invalidate(&key).await;
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}
