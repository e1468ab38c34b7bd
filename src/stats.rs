use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Counters shared between the cleaning pipeline and the publisher worker.
#[derive(Debug, Default)]
pub struct CleaningStats {
    pub samples_accepted: AtomicU64,
    pub samples_dropped: AtomicU64,
    pub windows_fitted: AtomicU64,
    pub fit_failures: AtomicU64,
    pub dirty_points: AtomicU64,
    pub events_queued: AtomicU64,
    pub events_dropped: AtomicU64,
    pub events_published: AtomicU64,
    pub publish_failures: AtomicU64,
    pub last_error: Mutex<Option<String>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub samples_accepted: u64,
    pub samples_dropped: u64,
    pub windows_fitted: u64,
    pub fit_failures: u64,
    pub dirty_points: u64,
    pub events_queued: u64,
    pub events_dropped: u64,
    pub events_published: u64,
    pub publish_failures: u64,
}

impl CleaningStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self, err: impl Into<String>) {
        if let Ok(mut guard) = self.last_error.lock() {
            *guard = Some(err.into());
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|guard| guard.clone())
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            samples_accepted: self.samples_accepted.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            windows_fitted: self.windows_fitted.load(Ordering::Relaxed),
            fit_failures: self.fit_failures.load(Ordering::Relaxed),
            dirty_points: self.dirty_points.load(Ordering::Relaxed),
            events_queued: self.events_queued.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            events_published: self.events_published.load(Ordering::Relaxed),
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
        }
    }
}
