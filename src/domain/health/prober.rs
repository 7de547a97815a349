use chrono::{DateTime, Utc};
use moka::future::Cache;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::infrastructure::upstream::{CallProfile, RetryingExecutor, UpstreamRequest};

const HEALTH_CACHE_KEY: &str = "upstreams";
pub const PROBE_PATH: &str = "/health";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct UpstreamProbe {
    pub url: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub latency_ms: u64,
    pub error: Option<String>,
}

/// Aggregate reachability snapshot shared by every caller inside the TTL.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub captured_at: DateTime<Utc>,
    pub active_upstream: Option<String>,
    pub reachable_count: usize,
    pub upstreams: Vec<UpstreamProbe>,
}

impl HealthReport {
    pub fn any_reachable(&self) -> bool {
        self.reachable_count > 0
    }
}

/// Liveness prober with a TTL cache.
///
/// The moka cache coalesces concurrent loads for the same key, so a burst of
/// callers after expiry runs exactly one probe round and all of them observe
/// its result.
pub struct HealthProber {
    executor: Arc<RetryingExecutor>,
    cache: Option<Cache<&'static str, Arc<HealthReport>>>,
    probes_run: AtomicU64,
}

impl HealthProber {
    pub fn new(executor: Arc<RetryingExecutor>, ttl: Duration) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(1)
                .time_to_live(ttl)
                .build()
        });

        Self {
            executor,
            cache,
            probes_run: AtomicU64::new(0),
        }
    }

    pub async fn probe(&self) -> Arc<HealthReport> {
        match &self.cache {
            Some(cache) => cache.get_with(HEALTH_CACHE_KEY, self.run_probe()).await,
            None => self.run_probe().await,
        }
    }

    /// Number of probe rounds actually executed (cache misses)
    pub fn probes_run(&self) -> u64 {
        self.probes_run.load(Ordering::Relaxed)
    }

    async fn run_probe(&self) -> Arc<HealthReport> {
        self.probes_run.fetch_add(1, Ordering::Relaxed);
        let registry = self.executor.registry();
        let request = UpstreamRequest::get(PROBE_PATH);

        let checks = (0..registry.len()).map(|index| {
            let request = &request;
            async move {
                let start_time = Instant::now();
                let result = self
                    .executor
                    .execute(index, request, CallProfile::Probe)
                    .await;
                let latency_ms = start_time.elapsed().as_millis() as u64;
                let url = registry.base_url(index).to_string();

                match result {
                    Ok(response) => {
                        let reachable = response.status.is_success()
                            || response.status.is_client_error();
                        UpstreamProbe {
                            url,
                            reachable,
                            status: Some(response.status.as_u16()),
                            latency_ms,
                            error: (!reachable).then(|| response.detail()),
                        }
                    }
                    Err(e) => UpstreamProbe {
                        url,
                        reachable: false,
                        status: e.status(),
                        latency_ms,
                        error: Some(e.to_string()),
                    },
                }
            }
        });

        let upstreams = futures::future::join_all(checks).await;
        let reachable_count = upstreams.iter().filter(|p| p.reachable).count();

        tracing::info!(
            upstreams = upstreams.len(),
            reachable = reachable_count,
            "Upstream health probe completed"
        );

        Arc::new(HealthReport {
            captured_at: Utc::now(),
            active_upstream: registry.active_url().map(str::to_string),
            reachable_count,
            upstreams,
        })
    }
}
