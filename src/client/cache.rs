use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use super::ClientError;
use crate::utils::clock::SharedClock;

pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_STALE_DURATION: Duration = Duration::from_secs(2 * 60);

type SharedFetch<T> = Shared<BoxFuture<'static, Result<T, ClientError>>>;

struct Entry<T> {
    data: T,
    fetched_at: i64,
}

struct Pending<T> {
    id: u64,
    fetch: SharedFetch<T>,
}

struct Inner<T> {
    entries: HashMap<String, Entry<T>>,
    in_flight: HashMap<String, Pending<T>>,
    /// Bumped by `invalidate` and `clear`; fetches started under an older
    /// generation do not write through.
    generation: u64,
    next_fetch_id: u64,
}

/// A cached payload and whether it has passed the soft threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedValue<T> {
    pub data: T,
    pub is_stale: bool,
}

/// Client-side cache with two thresholds and in-flight de-duplication.
///
/// Entries younger than `stale_duration` are fresh, entries up to
/// `cache_duration` are served but flagged stale, older ones are dropped.
/// Concurrent fetches for one key share a single future.
pub struct ClientAttendanceCache<T> {
    inner: Arc<Mutex<Inner<T>>>,
    cache_duration: Duration,
    stale_duration: Duration,
    clock: SharedClock,
}

impl<T> Clone for ClientAttendanceCache<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            cache_duration: self.cache_duration,
            stale_duration: self.stale_duration,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<T> ClientAttendanceCache<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(cache_duration: Duration, stale_duration: Duration, clock: SharedClock) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
                generation: 0,
                next_fetch_id: 0,
            })),
            cache_duration,
            stale_duration: stale_duration.min(cache_duration),
            clock,
        }
    }

    pub fn with_defaults(clock: SharedClock) -> Self {
        Self::new(DEFAULT_CACHE_DURATION, DEFAULT_STALE_DURATION, clock)
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lookup(&self, inner: &mut Inner<T>, key: &str) -> Option<CachedValue<T>> {
        let age = self.clock.now_ms() - inner.entries.get(key)?.fetched_at;
        if age > self.cache_duration.as_millis() as i64 {
            inner.entries.remove(key);
            log::debug!("Client cache entry {} expired after {}ms", key, age);
            return None;
        }

        inner.entries.get(key).map(|e| CachedValue {
            data: e.data.clone(),
            is_stale: age > self.stale_duration.as_millis() as i64,
        })
    }

    pub fn get(&self, key: &str) -> Option<CachedValue<T>> {
        let mut inner = self.lock();
        self.lookup(&mut inner, key)
    }

    pub fn set(&self, key: impl Into<String>, data: T) {
        let fetched_at = self.clock.now_ms();
        self.lock()
            .entries
            .insert(key.into(), Entry { data, fetched_at });
    }

    /// Returns a fresh cached value, joins a fetch already running for `key`,
    /// or starts exactly one new fetch.
    ///
    /// `force` skips the fresh-entry shortcut but still joins an in-flight
    /// fetch. A successful result is written through before any caller sees it.
    pub async fn fetch_with_deduplication<F, Fut>(
        &self,
        key: &str,
        force: bool,
        fetch: F,
    ) -> Result<T, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let pending = {
            let mut inner = self.lock();

            if !force {
                if let Some(hit) = self.lookup(&mut inner, key) {
                    if !hit.is_stale {
                        return Ok(hit.data);
                    }
                }
            }

            match inner.in_flight.get(key) {
                Some(pending) => {
                    log::debug!("Joining in-flight fetch for {}", key);
                    pending.fetch.clone()
                }
                None => {
                    inner.next_fetch_id += 1;
                    let id = inner.next_fetch_id;
                    let generation = inner.generation;
                    let pending = self.start(key.to_string(), id, generation, fetch());
                    inner.in_flight.insert(
                        key.to_string(),
                        Pending {
                            id,
                            fetch: pending.clone(),
                        },
                    );
                    pending
                }
            }
        };

        pending.await
    }

    fn start<Fut>(&self, key: String, id: u64, generation: u64, fetch: Fut) -> SharedFetch<T>
    where
        Fut: Future<Output = Result<T, ClientError>> + Send + 'static,
    {
        let cache = self.clone();
        async move {
            let result = fetch.await;
            let fetched_at = cache.clock.now_ms();
            let mut inner = cache.lock();

            // A newer fetch may own the slot after a clear.
            if inner.in_flight.get(&key).is_some_and(|p| p.id == id) {
                inner.in_flight.remove(&key);
            }

            match &result {
                Ok(_) if inner.generation != generation => {
                    log::debug!("Dropping result for {} fetched before invalidation", key);
                }
                Ok(data) => {
                    inner.entries.insert(
                        key,
                        Entry {
                            data: data.clone(),
                            fetched_at,
                        },
                    );
                }
                Err(e) => log::warn!("Client fetch for {} failed: {}", key, e),
            }
            result
        }
        .boxed()
        .shared()
    }

    pub fn invalidate(&self, key: &str) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.remove(key);
        inner.in_flight.remove(key);
    }

    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.generation += 1;
        inner.entries.clear();
        inner.in_flight.clear();
    }

    pub fn in_flight(&self) -> usize {
        self.lock().in_flight.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn cache(clock: &Arc<ManualClock>) -> ClientAttendanceCache<u32> {
        ClientAttendanceCache::with_defaults(clock.clone())
    }

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, ClientError>> + use<> {
        delayed_fetch(calls, value, 50)
    }

    fn delayed_fetch(
        calls: &Arc<AtomicUsize>,
        value: u32,
        ms: u64,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<u32, ClientError>> + use<> {
        let calls = calls.clone();
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(ms)).await;
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_fetch() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.fetch_with_deduplication("k", false, counting_fetch(&calls, 7)),
            cache.fetch_with_deduplication("k", false, counting_fetch(&calls, 8)),
        );

        assert_eq!(a.unwrap(), 7);
        assert_eq!(b.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn fresh_entry_skips_the_network_unless_forced() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set("k", 1);
        let v = cache
            .fetch_with_deduplication("k", false, counting_fetch(&calls, 2))
            .await
            .unwrap();
        assert_eq!(v, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        let v = cache
            .fetch_with_deduplication("k", true, counting_fetch(&calls, 2))
            .await
            .unwrap();
        assert_eq!(v, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get("k").unwrap().data, 2);
    }

    #[test]
    fn entries_turn_stale_then_expire() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        cache.set("k", 5);

        clock.advance_secs(60);
        assert_eq!(cache.get("k"), Some(CachedValue { data: 5, is_stale: false }));

        clock.advance_secs(90);
        assert_eq!(cache.get("k"), Some(CachedValue { data: 5, is_stale: true }));

        clock.advance_secs(151);
        assert_eq!(cache.get("k"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_entry_is_refetched() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        cache.set("k", 1);
        clock.advance_secs(3 * 60);
        let v = cache
            .fetch_with_deduplication("k", false, counting_fetch(&calls, 9))
            .await
            .unwrap();
        assert_eq!(v, 9);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_clears_in_flight_and_caches_nothing() {
        let clock = Arc::new(ManualClock::new(0));
        let cache: ClientAttendanceCache<u32> = cache(&clock);

        let err = cache
            .fetch_with_deduplication("k", false, || async { Err(ClientError::Timeout) })
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Timeout));
        assert_eq!(cache.in_flight(), 0);
        assert!(cache.get("k").is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let v = cache
            .fetch_with_deduplication("k", false, counting_fetch(&calls, 3))
            .await
            .unwrap();
        assert_eq!(v, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_during_fetch_discards_old_result_and_keeps_newer_fetch() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        let old = tokio::spawn({
            let cache = cache.clone();
            let fetch = delayed_fetch(&calls, 111, 100);
            async move { cache.fetch_with_deduplication("k", true, fetch).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        cache.clear();

        let newer = tokio::spawn({
            let cache = cache.clone();
            let fetch = delayed_fetch(&calls, 222, 500);
            async move { cache.fetch_with_deduplication("k", true, fetch).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;

        // old fetch settles while the newer one is still running
        assert_eq!(old.await.unwrap().unwrap(), 111);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.in_flight(), 1);

        let joined = cache
            .fetch_with_deduplication("k", false, delayed_fetch(&calls, 333, 10))
            .await
            .unwrap();
        assert_eq!(joined, 222);
        assert_eq!(newer.await.unwrap().unwrap(), 222);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.get("k").unwrap().data, 222);
    }

    #[tokio::test(start_paused = true)]
    async fn invalidate_during_fetch_skips_write_through() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        let calls = Arc::new(AtomicUsize::new(0));

        let pending = tokio::spawn({
            let cache = cache.clone();
            let fetch = counting_fetch(&calls, 5);
            async move { cache.fetch_with_deduplication("k", false, fetch).await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.invalidate("k");

        assert_eq!(pending.await.unwrap().unwrap(), 5);
        assert!(cache.get("k").is_none());
        assert_eq!(cache.in_flight(), 0);
    }

    #[test]
    fn invalidate_and_clear_drop_entries() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(&clock);
        cache.set("a", 1);
        cache.set("b", 2);

        cache.invalidate("a");
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());

        cache.clear();
        assert!(cache.get("b").is_none());
    }
}
