use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::dto::{
    GatewayHealth, HealthStatus, SynthesisRequest, SynthesisResult, UploadReceipt, VoiceListing,
    VoiceSummary, VoiceUpload, DEFAULT_VOICE,
};
use super::error::GatewayError;
use super::plan::{Candidate, CandidatePlan, EndpointShape, Operation};
use super::stats::GatewayStats;
use crate::domain::audio::{validate, AudioFormat, AudioNormalizer};
use crate::domain::health::HealthProber;
use crate::domain::voice::{collect_entries, VoiceEntry, VoiceError, VoiceRegistry};
use crate::infrastructure::upstream::{
    CallProfile, FailoverOrchestrator, UpstreamError, UpstreamRequest,
};

/// Well-known voice listing paths, queried in order.
pub const VOICE_LISTING_PATHS: &[&str] = &["/v1/voices", "/voices", "/api/voices", "/v1/audio/voices"];
const FALLBACK_VOICES: &[&str] = &[DEFAULT_VOICE];
const DEFAULT_MODEL: &str = "tts-1";

struct RemoteListing {
    upstream: String,
    path: &'static str,
    entries: Vec<VoiceEntry>,
}

pub struct GatewayService {
    failover: Arc<FailoverOrchestrator>,
    prober: Arc<HealthProber>,
    voices: Arc<VoiceRegistry>,
    normalizer: AudioNormalizer,
    stats: GatewayStats,
    max_text_length: usize,
}

impl GatewayService {
    pub fn new(
        failover: Arc<FailoverOrchestrator>,
        prober: Arc<HealthProber>,
        voices: Arc<VoiceRegistry>,
        normalizer: AudioNormalizer,
        max_text_length: usize,
    ) -> Self {
        Self {
            failover,
            prober,
            voices,
            normalizer,
            stats: GatewayStats::default(),
            max_text_length,
        }
    }

    pub fn stats(&self) -> &GatewayStats {
        &self.stats
    }
}

#[async_trait]
pub trait GatewayApi: Send + Sync {
    /// Synthesize speech through the first `(endpoint, format)` candidate
    /// that yields validated audio.
    ///
    /// An open breaker is surfaced immediately. A rotation exhausted by
    /// transient failures, non-2xx responses (including 415/501 format
    /// rejections) and non-audio payloads advance to the next candidate.
    async fn synthesize(
        &self,
        request: SynthesisRequest,
        operation: Operation,
    ) -> Result<SynthesisResult, GatewayError>;

    /// Query the upstream voice listings, feeding the registry, or fall back
    /// to the locally known voices.
    async fn list_voices(&self) -> VoiceListing;

    /// Composite status; never fails.
    async fn health(&self) -> GatewayHealth;

    /// Store and register an uploaded voice sample. Without a file only an
    /// acknowledgement is returned.
    async fn upload_voice(&self, upload: VoiceUpload) -> Result<UploadReceipt, GatewayError>;
}

#[async_trait]
impl GatewayApi for GatewayService {
    async fn synthesize(
        &self,
        request: SynthesisRequest,
        operation: Operation,
    ) -> Result<SynthesisResult, GatewayError> {
        let text = self.check_text(&request.text)?;
        let voice = request.voice_or_default();
        let prompt = self.resolve_voice(voice).await;
        let plan =
            CandidatePlan::for_operation(operation, request.format, self.normalizer.canonical());

        tracing::info!(
            voice = %voice,
            text_length = text.chars().count(),
            voice_prompt = prompt.is_some(),
            candidates = plan.len(),
            "Synthesis request"
        );
        if prompt.is_some() {
            self.stats.voice_prompts_attached();
        }

        let mut last_failure = String::from("no candidates");
        for (tried, candidate) in plan.candidates().iter().enumerate() {
            self.stats.candidates_tried();
            let upstream_request =
                build_upstream_request(&request, text, voice, prompt.as_deref(), *candidate);

            let response = match self
                .failover
                .send(&upstream_request, CallProfile::Synthesis)
                .await
            {
                Ok(response) => response,
                Err(e @ UpstreamError::CircuitOpen { .. }) | Err(e @ UpstreamError::NoUpstreams) => {
                    self.stats.synthesis_failed();
                    return Err(e.into());
                }
                Err(e) => {
                    self.stats.upstream_exhausted();
                    last_failure = e.to_string();
                    tracing::warn!(
                        endpoint = %candidate.shape,
                        format = %candidate.format,
                        error = %e,
                        "Every upstream failed for candidate, trying next"
                    );
                    continue;
                }
            };

            if !response.is_success() {
                let status = response.status.as_u16();
                if status == 415 || status == 501 {
                    self.stats.format_rejections();
                } else {
                    self.stats.upstream_rejections();
                }
                last_failure = format!("HTTP {} from {}: {}", status, response.upstream, response.detail());
                tracing::warn!(
                    upstream = %response.upstream,
                    endpoint = %candidate.shape,
                    format = %candidate.format,
                    status = status,
                    "Candidate rejected by upstream, trying next"
                );
                continue;
            }

            let validated = match validate(
                response.body.clone(),
                response.content_type.as_deref(),
                Some(candidate.format),
            ) {
                Ok(validated) => validated,
                Err(e) => {
                    self.stats.non_audio_rejections();
                    last_failure = format!("{} from {}", e, response.upstream);
                    tracing::warn!(
                        upstream = %response.upstream,
                        endpoint = %candidate.shape,
                        format = %candidate.format,
                        error = %e,
                        "Upstream returned non-audio payload, trying next"
                    );
                    continue;
                }
            };

            let wants_transcode = matches!(
                (self.normalizer.canonical(), validated.format),
                (Some(target), Some(source)) if target != source
            );
            let audio = self.normalizer.normalize(validated).await;
            if wants_transcode {
                self.stats.transcodes();
                if !audio.transcoded {
                    self.stats.transcode_failures();
                    tracing::warn!(
                        format = ?audio.format,
                        "Returning untranscoded audio"
                    );
                }
            }

            self.stats.synthesis_ok();
            tracing::info!(
                upstream = %response.upstream,
                endpoint = %candidate.shape,
                format = ?audio.format,
                bytes = audio.bytes.len(),
                candidate = tried + 1,
                attempts = response.attempts,
                latency_ms = response.latency.as_millis() as u64,
                transcoded = audio.transcoded,
                "Synthesis succeeded"
            );

            return Ok(SynthesisResult {
                audio: audio.bytes,
                content_type: audio.content_type,
                format: audio.format,
                upstream: response.upstream,
                endpoint: candidate.shape,
                voice_prompt_attached: prompt.is_some(),
                transcoded: audio.transcoded,
            });
        }

        self.stats.synthesis_failed();
        Err(GatewayError::NoAudio {
            tried: plan.len(),
            last: last_failure,
        })
    }

    async fn list_voices(&self) -> VoiceListing {
        self.voices.refresh_local_if_stale();

        if let Some(listing) = self.fetch_remote_voices().await {
            let voices = listing
                .entries
                .iter()
                .filter_map(|entry| self.summarize(entry))
                .collect();
            return VoiceListing {
                source: "upstream",
                upstream: Some(listing.upstream),
                path: Some(listing.path),
                voices,
            };
        }

        let mut voices: Vec<VoiceSummary> = FALLBACK_VOICES
            .iter()
            .map(|id| VoiceSummary {
                id: id.to_string(),
                aliases: Vec::new(),
                local_sample: self.voices.resolve(id).is_some(),
            })
            .collect();
        voices.extend(
            self.voices
                .entries()
                .iter()
                .filter_map(|entry| self.summarize(entry))
                .filter(|summary| !FALLBACK_VOICES.contains(&summary.id.as_str())),
        );

        VoiceListing {
            source: "fallback",
            upstream: None,
            path: None,
            voices,
        }
    }

    async fn health(&self) -> GatewayHealth {
        let probe = self.prober.probe().await;
        let registry = self.failover.registry();
        let breaker = self.failover.executor().breaker().snapshot();

        let status = if probe.any_reachable() && !breaker.open {
            HealthStatus::Ok
        } else {
            HealthStatus::Degraded
        };

        GatewayHealth {
            status,
            timestamp: Utc::now(),
            active_upstream: registry.active_url().map(str::to_string),
            breaker,
            upstreams: registry.statuses(),
            probe: probe.as_ref().clone(),
            gateway: self.stats.snapshot(),
            voices_known: self.voices.len(),
        }
    }

    async fn upload_voice(&self, upload: VoiceUpload) -> Result<UploadReceipt, GatewayError> {
        let name = upload
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .or_else(|| {
                upload
                    .file_name
                    .as_deref()
                    .and_then(|f| Path::new(f).file_stem())
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
            });

        let bytes = match upload.bytes {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => {
                tracing::info!(name = ?name, "Voice upload received without audio");
                return Ok(UploadReceipt {
                    status: "received",
                    voice_id: None,
                    name,
                    path: None,
                    message: "Voice upload received; attach a 'file' field to register a sample"
                        .to_string(),
                });
            }
        };

        let name = name.ok_or_else(|| GatewayError::InvalidRequest("voice name is required".into()))?;
        let extension_format = upload
            .file_name
            .as_deref()
            .and_then(|f| Path::new(f).extension())
            .and_then(|e| e.to_str())
            .and_then(AudioFormat::from_extension);

        let validated = validate(bytes, upload.content_type.as_deref(), extension_format)
            .map_err(|e| {
                tracing::warn!(name = %name, error = %e, "Rejected voice upload");
                VoiceError::NotAudio
            })?;
        let format = validated
            .format
            .or(extension_format)
            .ok_or(VoiceError::NotAudio)?;

        let stored = self.voices.store_upload(&name, &validated.bytes, format)?;

        Ok(UploadReceipt {
            status: "stored",
            voice_id: Some(stored.id),
            name: Some(stored.name),
            path: Some(stored.path.to_string_lossy().into_owned()),
            message: "Voice sample stored and registered".to_string(),
        })
    }
}

impl GatewayService {
    fn check_text<'a>(&self, text: &'a str) -> Result<&'a str, GatewayError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GatewayError::InvalidRequest("text is required".to_string()));
        }
        let length = text.chars().count();
        if length > self.max_text_length {
            return Err(GatewayError::TextTooLong {
                length,
                limit: self.max_text_length,
            });
        }
        Ok(text)
    }

    /// Local sources first; an unknown non-default voice may trigger a
    /// rate-limited remote refresh before giving up.
    async fn resolve_voice(&self, voice: &str) -> Option<PathBuf> {
        self.voices.refresh_local_if_stale();
        if let Some(path) = self.voices.resolve(voice) {
            return Some(path);
        }
        if voice.eq_ignore_ascii_case(DEFAULT_VOICE) || !self.voices.remote_refresh_due(false) {
            return None;
        }
        self.fetch_remote_voices().await?;
        self.voices.resolve(voice)
    }

    async fn fetch_remote_voices(&self) -> Option<RemoteListing> {
        for path in VOICE_LISTING_PATHS {
            let request = UpstreamRequest::get(*path);
            match self.failover.send(&request, CallProfile::Discovery).await {
                Ok(response) if response.is_success() => {
                    let value: Value = match serde_json::from_slice(&response.body) {
                        Ok(value) => value,
                        Err(e) => {
                            tracing::debug!(path = path, error = %e, "Voice listing is not JSON");
                            continue;
                        }
                    };
                    if collect_entries(&value).is_empty() {
                        tracing::debug!(path = path, "Voice listing had no recognizable voices");
                        continue;
                    }
                    let entries = self.voices.merge_remote(&value);
                    return Some(RemoteListing {
                        upstream: response.upstream,
                        path,
                        entries,
                    });
                }
                Ok(response) => {
                    tracing::debug!(
                        path = path,
                        status = response.status.as_u16(),
                        "Voice listing path not available"
                    );
                }
                Err(e @ UpstreamError::CircuitOpen { .. }) | Err(e @ UpstreamError::NoUpstreams) => {
                    tracing::debug!(error = %e, "Skipping voice discovery");
                    break;
                }
                Err(e) if e.status().is_none() => {
                    tracing::warn!(error = %e, "Voice discovery failed, no upstream reachable");
                    break;
                }
                Err(e) => {
                    tracing::debug!(path = path, error = %e, "Voice listing failed");
                }
            }
        }

        self.stats.discovery_failures();
        self.voices.mark_remote_attempt();
        None
    }

    fn summarize(&self, entry: &VoiceEntry) -> Option<VoiceSummary> {
        let (id, aliases) = entry.keys.split_first()?;
        let local_sample = entry.path.as_deref().map(Path::is_file).unwrap_or(false)
            || self.voices.resolve(id).is_some();
        Some(VoiceSummary {
            id: id.clone(),
            aliases: aliases.to_vec(),
            local_sample,
        })
    }
}

/// Translate a shape-independent request into one candidate's wire shape.
pub fn build_upstream_request(
    request: &SynthesisRequest,
    text: &str,
    voice: &str,
    prompt: Option<&Path>,
    candidate: Candidate,
) -> UpstreamRequest {
    let tuning = request.tuning;
    let prompt = prompt.map(|p| p.to_string_lossy().into_owned());

    match candidate.shape {
        EndpointShape::Legacy => {
            let mut query = vec![
                ("text".to_string(), text.to_string()),
                ("voice".to_string(), voice.to_string()),
            ];
            let knobs = [
                ("exaggeration", tuning.exaggeration),
                ("cfg_weight", tuning.cfg_weight),
                ("temperature", tuning.temperature),
            ];
            for (name, value) in knobs {
                if let Some(value) = value {
                    query.push((name.to_string(), value.to_string()));
                }
            }
            if let Some(prompt) = prompt {
                query.push(("audio_prompt_path".to_string(), prompt));
            }
            query.push(("response_format".to_string(), candidate.format.to_string()));
            UpstreamRequest::get(candidate.shape.path()).with_query(query)
        }
        EndpointShape::OpenAiSpeech => {
            let mut body = Map::new();
            body.insert("input".into(), json!(text));
            body.insert("voice".into(), json!(voice));
            body.insert(
                "model".into(),
                json!(request.model.as_deref().unwrap_or(DEFAULT_MODEL)),
            );
            body.insert("response_format".into(), json!(candidate.format.as_str()));
            if let Ok(Value::Object(knobs)) = serde_json::to_value(tuning) {
                body.extend(knobs);
            }
            if let Some(prompt) = prompt {
                body.insert("audio_prompt_path".into(), json!(prompt));
            }
            UpstreamRequest::post_json(candidate.shape.path(), Value::Object(body))
        }
    }
}
