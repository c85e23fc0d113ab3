use std::sync::Mutex;
use std::time::Duration;

use indexmap::IndexMap;

use crate::utils::clock::SharedClock;

pub const DEFAULT_TTL: Duration = Duration::from_secs(2 * 60);
pub const DEFAULT_CAPACITY: usize = 100;

#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    /// Epoch milliseconds at which the entry was stored.
    pub timestamp: i64,
}

/// Per-credential TTL cache for aggregate attendance responses.
///
/// Entries expire lazily on read. When the map grows past `capacity`, the
/// oldest inserted entry is dropped.
pub struct ResponseCache<T> {
    entries: Mutex<IndexMap<String, CacheEntry<T>>>,
    ttl: Duration,
    capacity: usize,
    clock: SharedClock,
}

impl<T: Clone> ResponseCache<T> {
    pub fn new(ttl: Duration, capacity: usize, clock: SharedClock) -> Self {
        Self {
            entries: Mutex::new(IndexMap::new()),
            ttl,
            capacity: capacity.max(1),
            clock,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, IndexMap<String, CacheEntry<T>>> {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Cached payload if it was stored no more than `ttl` ago.
    pub fn get(&self, key: &str) -> Option<T> {
        let now = self.clock.now_ms();
        let mut entries = self.lock();

        let age = now - entries.get(key)?.timestamp;
        if age <= self.ttl.as_millis() as i64 {
            log::debug!("Response cache hit for {} (age {}ms)", key, age);
            return entries.get(key).map(|e| e.data.clone());
        }

        entries.shift_remove(key);
        log::debug!("Response cache entry for {} expired after {}ms", key, age);
        None
    }

    pub fn set(&self, key: impl Into<String>, data: T) {
        let entry = CacheEntry {
            data,
            timestamp: self.clock.now_ms(),
        };
        let mut entries = self.lock();
        entries.insert(key.into(), entry);

        while entries.len() > self.capacity {
            if let Some((evicted, _)) = entries.shift_remove_index(0) {
                log::info!("Response cache full, evicted {}", evicted);
            }
        }
    }

    pub fn invalidate(&self, key: &str) -> bool {
        self.lock().shift_remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::clock::ManualClock;
    use std::sync::Arc;

    fn cache(clock: Arc<ManualClock>) -> ResponseCache<String> {
        ResponseCache::new(DEFAULT_TTL, DEFAULT_CAPACITY, clock)
    }

    #[test]
    fn entry_is_served_within_ttl() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = cache(clock.clone());
        cache.set("abcdefghij0123456789", "payload".to_string());

        clock.advance_secs(119);
        assert_eq!(cache.get("abcdefghij0123456789").as_deref(), Some("payload"));
    }

    #[test]
    fn entry_expires_after_ttl_and_is_evicted() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let cache = cache(clock.clone());
        cache.set("k", "payload".to_string());

        clock.advance_secs(121);
        assert_eq!(cache.get("k"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn ttl_boundary_is_inclusive() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock.clone());
        cache.set("k", "v".to_string());

        clock.advance_ms(120_000);
        assert!(cache.get("k").is_some());
        clock.advance_ms(1);
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn oldest_entry_is_evicted_past_capacity() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = ResponseCache::new(DEFAULT_TTL, 3, clock.clone());

        for key in ["a", "b", "c"] {
            cache.set(key, key.to_string());
            clock.advance_ms(10);
        }
        // refreshing a key keeps its original insertion slot
        cache.set("a", "a2".to_string());
        cache.set("d", "d".to_string());

        assert_eq!(cache.len(), 3);
        assert_eq!(cache.get("a"), None);
        assert_eq!(cache.get("b").as_deref(), Some("b"));
        assert_eq!(cache.get("d").as_deref(), Some("d"));
    }

    #[test]
    fn invalidate_and_clear() {
        let clock = Arc::new(ManualClock::new(0));
        let cache = cache(clock);
        cache.set("a", "1".to_string());
        cache.set("b", "2".to_string());

        assert!(cache.invalidate("a"));
        assert!(!cache.invalidate("a"));
        assert_eq!(cache.len(), 1);

        cache.clear();
        assert!(cache.get("b").is_none());
    }
}
