pub mod format;
pub mod transcoder;
pub mod validator;

pub use format::AudioFormat;
pub use transcoder::{FfmpegTranscoder, Transcoder};
pub use validator::{sniff, validate, AudioError, ValidatedAudio, MIN_AUDIO_BYTES};

use bytes::Bytes;
use std::sync::Arc;

/// Audio handed back to the caller after optional canonical-format forcing.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    pub bytes: Bytes,
    pub content_type: String,
    pub format: Option<AudioFormat>,
    pub transcoded: bool,
}

/// Applies the deployment's canonical output format to validated audio.
pub struct AudioNormalizer {
    canonical: Option<AudioFormat>,
    transcoder: Option<Arc<dyn Transcoder>>,
}

impl AudioNormalizer {
    pub fn new(canonical: Option<AudioFormat>, transcoder: Option<Arc<dyn Transcoder>>) -> Self {
        Self {
            canonical,
            transcoder,
        }
    }

    pub fn canonical(&self) -> Option<AudioFormat> {
        self.canonical
    }

    /// Transcode into the canonical container when one is configured and the
    /// audio is in a different, known container. Any failure keeps the original.
    pub async fn normalize(&self, audio: ValidatedAudio) -> NormalizedAudio {
        let passthrough = |audio: ValidatedAudio| NormalizedAudio {
            bytes: audio.bytes,
            content_type: audio.content_type,
            format: audio.format,
            transcoded: false,
        };

        let (Some(target), Some(source)) = (self.canonical, audio.format) else {
            return passthrough(audio);
        };
        if target == source {
            return passthrough(audio);
        }
        let Some(transcoder) = &self.transcoder else {
            tracing::warn!(
                from = %source,
                to = %target,
                "Canonical format requested but no encoder is configured"
            );
            return passthrough(audio);
        };

        match transcoder.transcode(&audio.bytes, source, target).await {
            Some(converted) => NormalizedAudio {
                bytes: Bytes::from(converted),
                content_type: target.content_type().to_string(),
                format: Some(target),
                transcoded: true,
            },
            None => passthrough(audio),
        }
    }
}
