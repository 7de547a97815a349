pub mod dto;
pub mod error;
pub mod plan;
pub mod requirements;
pub mod service;
pub mod stats;

pub use dto::{
    GatewayHealth, HealthStatus, LegacyTtsParams, SpeakParams, SpeechParams, SynthesisRequest,
    SynthesisResult, Tuning, UploadReceipt, VoiceListing, VoiceSummary, VoiceUpload,
    DEFAULT_VOICE,
};
pub use error::GatewayError;
pub use plan::{Candidate, CandidatePlan, EndpointShape, Operation};
pub use requirements::requirements_document;
pub use service::{GatewayApi, GatewayService, VOICE_LISTING_PATHS};
pub use stats::{GatewayStats, StatsSnapshot};
