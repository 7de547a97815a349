pub mod prober;

pub use prober::{HealthProber, HealthReport, UpstreamProbe};
