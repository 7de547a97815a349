use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Per-upstream health counters, mutated on every attempt.
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct EndpointMetrics {
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EndpointStatus {
    pub index: usize,
    pub url: String,
    pub active: bool,
    #[serde(flatten)]
    pub metrics: EndpointMetrics,
}

/// Ordered, fixed set of upstream base URLs plus the sticky "active" pointer.
pub struct UpstreamRegistry {
    urls: Vec<String>,
    metrics: Vec<Mutex<EndpointMetrics>>,
    active: AtomicUsize,
}

impl UpstreamRegistry {
    pub fn new(urls: Vec<String>) -> Self {
        let urls: Vec<String> = urls
            .into_iter()
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .collect();
        let metrics = urls.iter().map(|_| Mutex::new(EndpointMetrics::default())).collect();
        Self {
            urls,
            metrics,
            active: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn base_url(&self, index: usize) -> &str {
        &self.urls[index]
    }

    /// Join a base URL and a path without doubling slashes
    pub fn url_for(&self, index: usize, path: &str) -> String {
        format!("{}/{}", self.urls[index], path.trim_start_matches('/'))
    }

    pub fn active_index(&self) -> usize {
        match self.urls.len() {
            0 => 0,
            len => self.active.load(Ordering::Acquire) % len,
        }
    }

    pub fn active_url(&self) -> Option<&str> {
        self.urls.get(self.active_index()).map(String::as_str)
    }

    /// Indices in try-order, starting from the active upstream and wrapping.
    pub fn rotation(&self) -> Vec<usize> {
        let len = self.urls.len();
        let start = self.active_index();
        (0..len).map(|offset| (start + offset) % len).collect()
    }

    pub fn record_success(&self, index: usize) {
        if index >= self.urls.len() {
            return;
        }
        {
            let mut metrics = self.metrics[index].lock();
            metrics.last_success_at = Some(Utc::now());
            metrics.consecutive_failures = 0;
            metrics.last_error = None;
        }
        let previous = self.active.swap(index, Ordering::AcqRel);
        if previous != index {
            tracing::info!(
                upstream = %self.urls[index],
                previous = %self.urls[previous % self.urls.len()],
                "Active upstream changed"
            );
        }
    }

    pub fn record_failure(&self, index: usize, error: &str) {
        if index >= self.urls.len() {
            return;
        }
        let mut metrics = self.metrics[index].lock();
        metrics.last_failure_at = Some(Utc::now());
        metrics.consecutive_failures += 1;
        metrics.last_error = Some(error.to_string());
    }

    pub fn metrics(&self, index: usize) -> EndpointMetrics {
        self.metrics[index].lock().clone()
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        let active = self.active_index();
        self.urls
            .iter()
            .enumerate()
            .map(|(index, url)| EndpointStatus {
                index,
                url: url.clone(),
                active: index == active,
                metrics: self.metrics(index),
            })
            .collect()
    }
}
