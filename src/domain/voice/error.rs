use crate::error::AppError;

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("voice name must contain at least one letter or digit")]
    InvalidName,
    #[error("uploaded sample is not recognizable audio")]
    NotAudio,
    #[error("voice metadata error: {0}")]
    Metadata(String),
    #[error("voice storage error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<VoiceError> for AppError {
    fn from(err: VoiceError) -> Self {
        match err {
            VoiceError::InvalidName | VoiceError::NotAudio => AppError::BadRequest(err.to_string()),
            VoiceError::Metadata(msg) => AppError::Internal(msg),
            VoiceError::Io(e) => AppError::Internal(e.to_string()),
        }
    }
}
