pub mod circuit_breaker;
pub mod error;
pub mod executor;
pub mod failover;
pub mod registry;

pub use circuit_breaker::{BreakerSnapshot, CircuitBreaker};
pub use error::{body_excerpt, UpstreamError};
pub use executor::{
    backoff_delay, is_retryable_status, CallProfile, RequestBody, RetryingExecutor,
    UpstreamRequest, UpstreamResponse,
};
pub use failover::FailoverOrchestrator;
pub use registry::{EndpointMetrics, EndpointStatus, UpstreamRegistry};
