// ! Dispatch metrics
// !
// ! Counters a server keeps about the requests it handles. Each server owns its
// ! own collector; nothing is process-global.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::core::error::McpError;

/// Bucket for requests naming a method the server does not serve
pub const UNKNOWN_METHOD: &str = "unknown";

/// Metrics collector for one server
#[derive(Debug, Default)]
pub struct DispatchStats {
    requests: AtomicU64,
    notifications: AtomicU64,
    errors: AtomicU64,
    panics: AtomicU64,
    rate_limited: AtomicU64,
    timeouts: AtomicU64,
    errors_by_code: Mutex<HashMap<i32, u64>>,
    requests_by_method: Mutex<HashMap<String, u64>>,
}

/// Point-in-time copy of [`DispatchStats`]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub notifications: u64,
    pub errors: u64,
    pub panics: u64,
    pub rate_limited: u64,
    pub timeouts: u64,
    pub errors_by_code: HashMap<i32, u64>,
    pub requests_by_method: HashMap<String, u64>,
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an id-bearing request or a notification. `method` is `None` for
    /// names the server does not serve, which share one counter.
    pub fn record_request(&self, method: Option<&str>, is_notification: bool) {
        if is_notification {
            self.notifications.fetch_add(1, Ordering::Relaxed);
        } else {
            self.requests.fetch_add(1, Ordering::Relaxed);
        }
        *self
            .requests_by_method
            .lock()
            .entry(method.unwrap_or(UNKNOWN_METHOD).to_string())
            .or_insert(0) += 1;
    }

    /// Record a failed request
    pub fn record_error(&self, error: &McpError) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        match error {
            McpError::RateLimited(_) => {
                self.rate_limited.fetch_add(1, Ordering::Relaxed);
            }
            McpError::Timeout(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }
        *self.errors_by_code.lock().entry(error.code()).or_insert(0) += 1;

        debug!(
            target: "mcp_metrics",
            error_category = error.category(),
            error_code = error.code(),
            "Error recorded in metrics"
        );
    }

    /// Record a recovered handler panic
    pub fn record_panic(&self) {
        self.panics.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            notifications: self.notifications.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            panics: self.panics.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            errors_by_code: self.errors_by_code.lock().clone(),
            requests_by_method: self.requests_by_method.lock().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = DispatchStats::new();
        stats.record_request(Some("tools/call"), false);
        stats.record_request(Some("tools/call"), false);
        stats.record_request(Some("notifications/initialized"), true);
        stats.record_error(&McpError::RateLimited("x".into()));
        stats.record_error(&McpError::timeout("x"));
        stats.record_panic();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests, 2);
        assert_eq!(snapshot.notifications, 1);
        assert_eq!(snapshot.errors, 2);
        assert_eq!(snapshot.rate_limited, 1);
        assert_eq!(snapshot.timeouts, 1);
        assert_eq!(snapshot.panics, 1);
        assert_eq!(snapshot.errors_by_code.get(&-32429), Some(&1));
        assert_eq!(snapshot.errors_by_code.get(&-32603), Some(&1));
        assert_eq!(snapshot.requests_by_method.get("tools/call"), Some(&2));
    }

    #[test]
    fn test_unknown_methods_share_one_counter() {
        let stats = DispatchStats::new();
        stats.record_request(None, false);
        stats.record_request(None, true);
        stats.record_request(Some("ping"), false);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.requests_by_method.len(), 2);
        assert_eq!(snapshot.requests_by_method.get(UNKNOWN_METHOD), Some(&2));
    }
}
