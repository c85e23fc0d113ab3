use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// Recent requests kept for `/metrics`.
pub const RECENT_LIMIT: usize = 100;

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetric {
    pub route: String,
    pub status: u16,
    pub duration_ms: u64,
    #[schema(value_type = String, format = "date-time")]
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RouteStats {
    pub requests: u64,
    pub errors: u64,
    pub total_ms: u64,
    pub max_ms: u64,
    pub avg_ms: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub request_counters: BTreeMap<String, u64>,
    pub error_counters: BTreeMap<String, u64>,
    pub routes: BTreeMap<String, RouteStats>,
    pub recent: Vec<RequestMetric>,
}

#[derive(Default)]
struct Inner {
    routes: BTreeMap<String, RouteStats>,
    recent: VecDeque<RequestMetric>,
}

/// In-process request counters, durations and errors keyed by route.
#[derive(Default)]
pub struct PerformanceMonitor {
    inner: Mutex<Inner>,
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Statuses of 400 and above count as errors.
    pub fn record(&self, route: &str, status: u16, elapsed: Duration) {
        let duration_ms = elapsed.as_millis() as u64;
        let mut inner = self.lock();

        let stats = inner.routes.entry(route.to_string()).or_default();
        stats.requests += 1;
        stats.total_ms += duration_ms;
        stats.max_ms = stats.max_ms.max(duration_ms);
        stats.avg_ms = stats.total_ms / stats.requests;
        if status >= 400 {
            stats.errors += 1;
        }

        if inner.recent.len() == RECENT_LIMIT {
            inner.recent.pop_front();
        }
        inner.recent.push_back(RequestMetric {
            route: route.to_string(),
            status,
            duration_ms,
            at: Utc::now(),
        });
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        MetricsSnapshot {
            request_counters: inner
                .routes
                .iter()
                .map(|(route, s)| (route.clone(), s.requests))
                .collect(),
            error_counters: inner
                .routes
                .iter()
                .filter(|(_, s)| s.errors > 0)
                .map(|(route, s)| (route.clone(), s.errors))
                .collect(),
            routes: inner.routes.clone(),
            recent: inner.recent.iter().cloned().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_requests_errors_and_durations_per_route() {
        let monitor = PerformanceMonitor::new();
        monitor.record("GET /api/quiz", 200, Duration::from_millis(30));
        monitor.record("GET /api/quiz", 502, Duration::from_millis(90));
        monitor.record("GET /api/health", 200, Duration::from_millis(1));

        let snap = monitor.snapshot();
        assert_eq!(snap.request_counters["GET /api/quiz"], 2);
        assert_eq!(snap.error_counters["GET /api/quiz"], 1);
        assert!(!snap.error_counters.contains_key("GET /api/health"));

        let quiz = &snap.routes["GET /api/quiz"];
        assert_eq!(quiz.max_ms, 90);
        assert_eq!(quiz.avg_ms, 60);
        assert_eq!(snap.recent.len(), 3);
        assert_eq!(snap.recent[1].status, 502);
    }

    #[test]
    fn recent_list_is_bounded() {
        let monitor = PerformanceMonitor::new();
        for i in 0..RECENT_LIMIT + 5 {
            monitor.record("GET /api/health", 200, Duration::from_millis(i as u64));
        }

        let snap = monitor.snapshot();
        assert_eq!(snap.recent.len(), RECENT_LIMIT);
        assert_eq!(snap.recent[0].duration_ms, 5);
        assert_eq!(snap.request_counters["GET /api/health"], (RECENT_LIMIT + 5) as u64);
    }
}
