use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Audio containers the gateway knows how to request, sniff, or transcode to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Wav,
    Mp3,
    Ogg,
    Flac,
    Opus,
    Aac,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Opus => "opus",
            AudioFormat::Aac => "aac",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "audio/wav",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Ogg => "audio/ogg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Opus => "audio/opus",
            AudioFormat::Aac => "audio/aac",
        }
    }

    /// Muxer name understood by ffmpeg's `-f` flag
    pub fn ffmpeg_muxer(&self) -> &'static str {
        match self {
            AudioFormat::Wav => "wav",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Ogg | AudioFormat::Opus => "ogg",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "adts",
        }
    }

    /// Map a declared `Content-Type` (parameters allowed) to a format.
    pub fn from_content_type(content_type: &str) -> Option<Self> {
        match essence(content_type).as_str() {
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave" => Some(AudioFormat::Wav),
            "audio/mpeg" | "audio/mp3" | "audio/mpeg3" | "audio/x-mpeg" => Some(AudioFormat::Mp3),
            "audio/ogg" | "application/ogg" | "audio/vorbis" => Some(AudioFormat::Ogg),
            "audio/flac" | "audio/x-flac" => Some(AudioFormat::Flac),
            "audio/opus" => Some(AudioFormat::Opus),
            "audio/aac" | "audio/x-aac" => Some(AudioFormat::Aac),
            _ => None,
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        ext.trim_start_matches('.').parse().ok()
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "wav" | "wave" => Ok(AudioFormat::Wav),
            "mp3" | "mpeg" => Ok(AudioFormat::Mp3),
            "ogg" | "oga" => Ok(AudioFormat::Ogg),
            "flac" => Ok(AudioFormat::Flac),
            "opus" => Ok(AudioFormat::Opus),
            "aac" => Ok(AudioFormat::Aac),
            other => Err(format!("unsupported audio format '{}'", other)),
        }
    }
}

/// Lowercased media type without parameters (`audio/wav; rate=24000` -> `audio/wav`)
pub fn essence(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_lowercase()
}
