//! Consecutive-failure health tracking for external providers.
//!
//! This is deliberately not a timed circuit breaker: there is no half-open
//! probe and no automatic recovery. A provider marked down stays down until a
//! call to it succeeds, and the fallback coordinator decides whether a down
//! provider is still worth attempting.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, warn};

/// Consecutive errors at which a provider is considered down.
pub const DEFAULT_ERROR_THRESHOLD: u32 = 3;

/// Health status of a single provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Down,
}

/// Snapshot of one provider's health.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub error_count: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub message: Option<String>,
}

impl ServiceHealth {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            error_count: 0,
            last_check: None,
            last_success: None,
            message: None,
        }
    }
}

/// Tracks per-provider consecutive-error counts.
///
/// Providers are registered explicitly at startup; recording an outcome for
/// an unknown name registers it on the fly so the tracker never loses data.
pub struct HealthTracker {
    threshold: u32,
    services: RwLock<HashMap<String, ServiceHealth>>,
}

impl HealthTracker {
    /// Create a tracker with the given down threshold (see
    /// [`DEFAULT_ERROR_THRESHOLD`]).
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            services: RwLock::new(HashMap::new()),
        }
    }

    /// Register a provider so it appears in snapshots before its first call.
    pub fn register(&self, name: &str) {
        self.services
            .write()
            .entry(name.to_string())
            .or_insert_with(|| ServiceHealth::new(name));
    }

    /// Record a failed call.
    ///
    /// Increments the consecutive-error count; below the threshold the
    /// provider becomes degraded, at or above it the provider is down.
    pub fn record_error(&self, name: &str, message: &str) {
        let mut services = self.services.write();
        let entry = services
            .entry(name.to_string())
            .or_insert_with(|| ServiceHealth::new(name));

        entry.error_count += 1;
        entry.status = if entry.error_count >= self.threshold {
            HealthStatus::Down
        } else {
            HealthStatus::Degraded
        };
        entry.last_check = Some(Utc::now());
        entry.message = Some(message.to_string());

        if entry.status == HealthStatus::Down {
            warn!(
                provider = name,
                error_count = entry.error_count,
                message = message,
                "Provider marked down"
            );
        } else {
            debug!(
                provider = name,
                error_count = entry.error_count,
                message = message,
                "Provider error recorded"
            );
        }
    }

    /// Record a successful call. Resets the error count and restores healthy
    /// status from any prior state.
    pub fn record_success(&self, name: &str) {
        let mut services = self.services.write();
        let entry = services
            .entry(name.to_string())
            .or_insert_with(|| ServiceHealth::new(name));

        let was_down = entry.status == HealthStatus::Down;
        entry.error_count = 0;
        entry.status = HealthStatus::Healthy;
        let now = Utc::now();
        entry.last_check = Some(now);
        entry.last_success = Some(now);
        entry.message = None;

        if was_down {
            debug!(provider = name, "Provider recovered");
        }
    }

    /// Current status for a provider. Unregistered providers are healthy.
    pub fn status(&self, name: &str) -> HealthStatus {
        self.services
            .read()
            .get(name)
            .map(|s| s.status)
            .unwrap_or(HealthStatus::Healthy)
    }

    /// Whether the provider has hit the consecutive-error threshold.
    pub fn is_down(&self, name: &str) -> bool {
        self.status(name) == HealthStatus::Down
    }

    /// Snapshot of all tracked providers, sorted by name.
    pub fn snapshot(&self) -> Vec<ServiceHealth> {
        let mut all: Vec<ServiceHealth> = self.services.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

impl Default for HealthTracker {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_errors_mark_provider_down() {
        let tracker = HealthTracker::new(3);
        tracker.register("tmdb");
        assert_eq!(tracker.status("tmdb"), HealthStatus::Healthy);

        tracker.record_error("tmdb", "timeout");
        assert_eq!(tracker.status("tmdb"), HealthStatus::Degraded);

        tracker.record_error("tmdb", "timeout");
        assert_eq!(tracker.status("tmdb"), HealthStatus::Degraded);

        tracker.record_error("tmdb", "timeout");
        assert_eq!(tracker.status("tmdb"), HealthStatus::Down);
        assert!(tracker.is_down("tmdb"));
    }

    #[test]
    fn success_resets_from_any_state() {
        let tracker = HealthTracker::new(3);
        for _ in 0..5 {
            tracker.record_error("tmdb", "server error");
        }
        assert!(tracker.is_down("tmdb"));

        tracker.record_success("tmdb");
        let snapshot = tracker.snapshot();
        let health = snapshot.iter().find(|s| s.name == "tmdb").unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(health.error_count, 0);
        assert!(health.message.is_none());
        assert!(health.last_success.is_some());
    }

    #[test]
    fn no_automatic_recovery() {
        let tracker = HealthTracker::new(1);
        tracker.record_error("douban", "boom");
        assert!(tracker.is_down("douban"));

        // Status is sticky until an explicit success.
        assert!(tracker.is_down("douban"));
        tracker.record_success("douban");
        assert!(!tracker.is_down("douban"));
    }

    #[test]
    fn unknown_provider_is_healthy() {
        let tracker = HealthTracker::default();
        assert_eq!(tracker.status("nobody"), HealthStatus::Healthy);
    }

    #[test]
    fn snapshot_sorted_by_name() {
        let tracker = HealthTracker::default();
        tracker.register("wikipedia");
        tracker.register("douban");
        tracker.register("tmdb");

        let names: Vec<String> = tracker.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["douban", "tmdb", "wikipedia"]);
    }
}
