use crate::domain::voice::VoiceError;
use crate::error::AppError;
use crate::infrastructure::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    InvalidRequest(String),
    #[error("text is {length} characters, the limit is {limit}")]
    TextTooLong { length: usize, limit: usize },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
    #[error("no upstream combination produced audio after {tried} attempt(s), last: {last}")]
    NoAudio { tried: usize, last: String },
    #[error(transparent)]
    Voice(#[from] VoiceError),
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidRequest(msg) => AppError::BadRequest(msg),
            GatewayError::TextTooLong { .. } => AppError::PayloadTooLarge(err.to_string()),
            GatewayError::Upstream(e @ UpstreamError::CircuitOpen { .. })
            | GatewayError::Upstream(e @ UpstreamError::NoUpstreams) => {
                AppError::UpstreamUnavailable(e.to_string())
            }
            GatewayError::Upstream(e) => AppError::BadGateway(e.to_string()),
            GatewayError::NoAudio { .. } => AppError::BadGateway(err.to_string()),
            GatewayError::Voice(e) => e.into(),
        }
    }
}
