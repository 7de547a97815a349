use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::error::GatewayError;
use super::plan::EndpointShape;
use super::stats::StatsSnapshot;
use crate::domain::audio::AudioFormat;
use crate::domain::health::HealthReport;
use crate::infrastructure::upstream::{BreakerSnapshot, EndpointStatus};

pub const DEFAULT_VOICE: &str = "default";

/// Provider-specific knobs forwarded verbatim when present
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Tuning {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exaggeration: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cfg_weight: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
}

/// Shape-independent synthesis request built from any inbound surface.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SynthesisRequest {
    pub text: String,
    pub voice: Option<String>,
    pub format: Option<AudioFormat>,
    pub model: Option<String>,
    pub tuning: Tuning,
}

impl SynthesisRequest {
    /// Trimmed voice hint, falling back to the upstream's default voice
    pub fn voice_or_default(&self) -> &str {
        self.voice
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or(DEFAULT_VOICE)
    }
}

fn parse_format(raw: Option<String>) -> Result<Option<AudioFormat>, GatewayError> {
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => AudioFormat::from_str(value)
            .map(Some)
            .map_err(GatewayError::InvalidRequest),
    }
}

/// Legacy `GET /tts` query or `POST /tts` form
#[derive(Debug, Default, Deserialize)]
pub struct LegacyTtsParams {
    #[serde(alias = "input")]
    pub text: Option<String>,
    #[serde(alias = "voice_id")]
    pub voice: Option<String>,
    pub exaggeration: Option<f64>,
    #[serde(alias = "cfg")]
    pub cfg_weight: Option<f64>,
    pub temperature: Option<f64>,
    #[serde(alias = "response_format")]
    pub format: Option<String>,
}

impl LegacyTtsParams {
    pub fn into_request(self) -> Result<SynthesisRequest, GatewayError> {
        Ok(SynthesisRequest {
            text: self.text.unwrap_or_default(),
            voice: self.voice,
            format: parse_format(self.format)?,
            model: None,
            tuning: Tuning {
                exaggeration: self.exaggeration,
                cfg_weight: self.cfg_weight,
                temperature: self.temperature,
                speed: None,
            },
        })
    }
}

/// OpenAI-style `POST /v1/audio/speech`, JSON or form encoded
#[derive(Debug, Default, Deserialize)]
pub struct SpeechParams {
    #[serde(alias = "text")]
    pub input: Option<String>,
    #[serde(alias = "voice_id")]
    pub voice: Option<String>,
    pub model: Option<String>,
    #[serde(alias = "format")]
    pub response_format: Option<String>,
    pub exaggeration: Option<f64>,
    #[serde(alias = "cfg")]
    pub cfg_weight: Option<f64>,
    pub temperature: Option<f64>,
    pub speed: Option<f64>,
}

impl SpeechParams {
    pub fn into_request(self) -> Result<SynthesisRequest, GatewayError> {
        Ok(SynthesisRequest {
            text: self.input.unwrap_or_default(),
            voice: self.voice,
            format: parse_format(self.response_format)?,
            model: self.model,
            tuning: Tuning {
                exaggeration: self.exaggeration,
                cfg_weight: self.cfg_weight,
                temperature: self.temperature,
                speed: self.speed,
            },
        })
    }
}

/// Convenience `POST /api/speak`
#[derive(Debug, Default, Deserialize)]
pub struct SpeakParams {
    #[serde(alias = "input")]
    pub text: Option<String>,
    #[serde(alias = "voice")]
    pub voice_id: Option<String>,
}

impl SpeakParams {
    pub fn into_request(self) -> SynthesisRequest {
        SynthesisRequest {
            text: self.text.unwrap_or_default(),
            voice: self.voice_id,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub audio: Bytes,
    pub content_type: String,
    pub format: Option<AudioFormat>,
    pub upstream: String,
    pub endpoint: EndpointShape,
    pub voice_prompt_attached: bool,
    pub transcoded: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct VoiceSummary {
    pub id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub aliases: Vec<String>,
    pub local_sample: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct VoiceListing {
    /// `upstream` when a listing endpoint answered, `fallback` otherwise
    pub source: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<&'static str>,
    pub voices: Vec<VoiceSummary>,
}

/// Multipart upload after extraction from the request
#[derive(Debug, Clone, Default)]
pub struct VoiceUpload {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub bytes: Option<Bytes>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReceipt {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
pub struct GatewayHealth {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub active_upstream: Option<String>,
    pub breaker: BreakerSnapshot,
    pub upstreams: Vec<EndpointStatus>,
    pub probe: HealthReport,
    pub gateway: StatsSnapshot,
    pub voices_known: usize,
}
