use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

/// Credential-keyed cache for the ERP attendance summary.
///
/// Backed by moka, so concurrent misses on the same key share one upstream
/// call through `try_get_with`.
#[derive(Clone)]
pub struct SummaryCache<V: Clone + Send + Sync + 'static> {
    inner: Cache<String, V>,
}

impl<V: Clone + Send + Sync + 'static> SummaryCache<V> {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(max_capacity)
                .time_to_live(ttl)
                .build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<V> {
        self.inner.get(key).await
    }

    /// Returns the cached value or runs `init` once for all concurrent callers.
    /// Errors are not cached.
    pub async fn get_or_fetch<F, E>(&self, key: &str, init: F) -> Result<V, Arc<E>>
    where
        F: Future<Output = Result<V, E>>,
        E: Send + Sync + 'static,
    {
        self.inner.try_get_with(key.to_string(), init).await
    }

    pub async fn invalidate(&self, key: &str) {
        self.inner.invalidate(key).await;
        log::debug!("Summary cache invalidated {}", key);
    }

    pub fn entry_count(&self) -> u64 {
        self.inner.entry_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn concurrent_misses_share_one_fetch() {
        let cache: SummaryCache<String> = SummaryCache::new(Duration::from_secs(60), 10);
        let calls = Arc::new(AtomicUsize::new(0));

        let fetch = |calls: Arc<AtomicUsize>| async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok::<_, String>("summary".to_string())
        };

        let (a, b) = tokio::join!(
            cache.get_or_fetch("tok", fetch(calls.clone())),
            cache.get_or_fetch("tok", fetch(calls.clone())),
        );

        assert_eq!(a.unwrap(), "summary");
        assert_eq!(b.unwrap(), "summary");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("tok").await.as_deref(), Some("summary"));
    }

    #[tokio::test]
    async fn errors_are_not_cached() {
        let cache: SummaryCache<String> = SummaryCache::new(Duration::from_secs(60), 10);

        let err = cache
            .get_or_fetch("tok", async { Err::<String, _>("upstream down".to_string()) })
            .await
            .unwrap_err();
        assert_eq!(err.as_str(), "upstream down");

        let ok = cache
            .get_or_fetch("tok", async { Ok::<_, String>("fresh".to_string()) })
            .await
            .unwrap();
        assert_eq!(ok, "fresh");
    }

    #[tokio::test]
    async fn invalidate_drops_entry() {
        let cache: SummaryCache<u32> = SummaryCache::new(Duration::from_secs(60), 10);
        cache
            .get_or_fetch("tok", async { Ok::<_, String>(7) })
            .await
            .unwrap();

        cache.invalidate("tok").await;
        assert_eq!(cache.get("tok").await, None);
    }
}
