use bytes::Bytes;

use super::format::{essence, AudioFormat};
use crate::infrastructure::upstream::body_excerpt;

/// Anything shorter than a bare WAV header cannot be playable audio.
pub const MIN_AUDIO_BYTES: usize = 44;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AudioError {
    #[error("audio payload too small ({0} bytes)")]
    TooSmall(usize),
    #[error("non-audio response ({content_type}): {detail}")]
    NonAudio { content_type: String, detail: String },
}

/// Audio bytes that passed validation, labelled with their real container.
#[derive(Debug, Clone)]
pub struct ValidatedAudio {
    pub bytes: Bytes,
    pub format: Option<AudioFormat>,
    pub content_type: String,
}

/// Identify the container from magic bytes.
pub fn sniff(bytes: &[u8]) -> Option<AudioFormat> {
    if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
        return Some(AudioFormat::Wav);
    }
    if bytes.starts_with(b"ID3") || is_mpeg_frame_sync(bytes) {
        return Some(AudioFormat::Mp3);
    }
    if bytes.starts_with(b"OggS") {
        return Some(AudioFormat::Ogg);
    }
    if bytes.starts_with(b"fLaC") {
        return Some(AudioFormat::Flac);
    }
    None
}

/// 11 set sync bits followed by a non-reserved version and layer.
/// ADTS (layer 00) is deliberately excluded.
fn is_mpeg_frame_sync(bytes: &[u8]) -> bool {
    if bytes.len() < 2 {
        return false;
    }
    let (b0, b1) = (bytes[0], bytes[1]);
    let version = (b1 >> 3) & 0b11;
    let layer = (b1 >> 1) & 0b11;
    b0 == 0xFF && (b1 & 0xE0) == 0xE0 && version != 0b01 && layer != 0b00
}

/// Decide whether an upstream payload is audio and what to label it.
///
/// Sniffed magic bytes win over the declared header. A declared `audio/*`
/// type is trusted when sniffing is inconclusive, and a generic
/// `application/octet-stream` is accepted under the `expected` format.
/// Everything else is rejected so error pages never reach callers as audio.
pub fn validate(
    bytes: Bytes,
    declared: Option<&str>,
    expected: Option<AudioFormat>,
) -> Result<ValidatedAudio, AudioError> {
    if bytes.len() < MIN_AUDIO_BYTES {
        return Err(AudioError::TooSmall(bytes.len()));
    }

    if let Some(format) = sniff(&bytes) {
        return Ok(ValidatedAudio {
            bytes,
            format: Some(format),
            content_type: format.content_type().to_string(),
        });
    }

    let declared_essence = declared.map(essence).unwrap_or_default();

    if declared_essence.starts_with("audio/") {
        return Ok(ValidatedAudio {
            format: AudioFormat::from_content_type(&declared_essence),
            content_type: declared_essence,
            bytes,
        });
    }

    if declared_essence == "application/octet-stream" {
        if let Some(format) = expected {
            return Ok(ValidatedAudio {
                bytes,
                format: Some(format),
                content_type: format.content_type().to_string(),
            });
        }
    }

    Err(AudioError::NonAudio {
        content_type: if declared_essence.is_empty() {
            "unknown".to_string()
        } else {
            declared_essence
        },
        detail: body_excerpt(&bytes, declared),
    })
}
