use parking_lot::Mutex;
use serde::Serialize;
use std::time::{Duration, Instant};

use super::error::UpstreamError;
use crate::infrastructure::config::CircuitBreakerConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    open_until: Option<Instant>,
    total_failures: u64,
    total_successes: u64,
    trips: u64,
}

/// Point-in-time view of the breaker for health reporting.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BreakerSnapshot {
    pub open: bool,
    pub remaining_cooldown_ms: u64,
    pub pending_failures: u32,
    pub threshold: u32,
    pub cooldown_ms: u64,
    pub total_failures: u64,
    pub total_successes: u64,
    pub trips: u64,
}

/// Process-wide failure gate shared by every code path that talks to an upstream.
///
/// Counts recorded failures and, once `failure_threshold` is reached, rejects
/// every new attempt for `cooldown` without touching the network. Any recorded
/// success closes it again.
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(BreakerState::default()),
        }
    }

    /// Fail fast while the breaker is open.
    pub fn ensure_available(&self) -> Result<(), UpstreamError> {
        let state = self.state.lock();
        match state.open_until {
            Some(until) => {
                let now = Instant::now();
                if now < until {
                    Err(UpstreamError::CircuitOpen {
                        remaining: until - now,
                    })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.open_until.is_some() {
            tracing::info!("Circuit breaker closed after successful upstream call");
        }
        state.failure_count = 0;
        state.open_until = None;
        state.total_successes += 1;
    }

    pub fn record_failure(&self) {
        let mut state = self.state.lock();
        state.total_failures += 1;

        if self.config.failure_threshold == 0 {
            return;
        }

        state.failure_count += 1;
        if state.failure_count >= self.config.failure_threshold {
            state.open_until = Some(Instant::now() + self.config.cooldown);
            state.failure_count = 0;
            state.trips += 1;
            tracing::warn!(
                threshold = self.config.failure_threshold,
                cooldown_ms = self.config.cooldown.as_millis() as u64,
                "Circuit breaker opened"
            );
        }
    }

    pub fn is_open(&self) -> bool {
        self.ensure_available().is_err()
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let state = self.state.lock();
        let remaining = state
            .open_until
            .map(|until| until.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);

        BreakerSnapshot {
            open: !remaining.is_zero(),
            remaining_cooldown_ms: remaining.as_millis() as u64,
            pending_failures: state.failure_count,
            threshold: self.config.failure_threshold,
            cooldown_ms: self.config.cooldown.as_millis() as u64,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
            trips: state.trips,
        }
    }
}
