use serde_json::{json, Value};

use super::plan::{EndpointShape, STABLE_FORMATS};
use super::service::VOICE_LISTING_PATHS;
use crate::domain::health::prober::PROBE_PATH;
use crate::infrastructure::config::Config;

/// Machine-readable contract an upstream backend must satisfy, with the
/// gateway's live timeout/retry/breaker settings filled in.
pub fn requirements_document(config: &Config) -> Value {
    let stable: Vec<&str> = STABLE_FORMATS.iter().map(|f| f.as_str()).collect();

    json!({
        "summary": "HTTP text-to-speech backend reachable by the gateway",
        "required_endpoints": [
            {
                "method": "GET",
                "path": PROBE_PATH,
                "purpose": "liveness probe; any 2xx or 4xx counts as reachable",
            },
            {
                "method": "GET",
                "path": EndpointShape::Legacy.path(),
                "query": ["text", "voice", "exaggeration", "cfg_weight", "temperature", "audio_prompt_path", "response_format"],
                "produces": ["audio/wav", "audio/mpeg", "application/octet-stream"],
            },
            {
                "method": "POST",
                "path": EndpointShape::OpenAiSpeech.path(),
                "content_type": "application/json",
                "body": ["input", "voice", "model", "response_format", "exaggeration", "cfg_weight", "temperature", "speed", "audio_prompt_path"],
                "produces": ["audio/wav", "audio/mpeg", "application/octet-stream"],
            },
        ],
        "optional_endpoints": VOICE_LISTING_PATHS
            .iter()
            .map(|path| json!({"method": "GET", "path": path, "produces": "application/json"}))
            .collect::<Vec<_>>(),
        "voice_listing_shapes": [
            "[\"voice\", ...]",
            "[{\"id\": \"...\", \"name\": \"...\", \"audio_prompt_path\": \"...\"}, ...]",
            "{\"<voice>\": {\"file_path\": \"...\"}}",
            "{\"voices\" | \"results\" | \"data\" | \"items\": <any of the above>}",
        ],
        "audio": {
            "preferred_formats": stable,
            "accepted_content_types": ["audio/*", "application/octet-stream"],
            "minimum_bytes": crate::domain::audio::MIN_AUDIO_BYTES,
            "canonical_format": config.output.canonical_format.map(|f| f.as_str()),
        },
        "status_semantics": {
            "2xx": "success, body must be audio",
            "415/501": "format not supported, gateway tries another format",
            "4xx": "caller error, not retried",
            "5xx": "transient, retried with backoff then failed over",
        },
        "gateway": {
            "upstreams": config.upstream_urls,
            "timeouts_ms": {
                "connect": config.timeouts.connect.as_millis() as u64,
                "read": config.timeouts.read.as_millis() as u64,
                "write": config.timeouts.write.as_millis() as u64,
                "pool_idle": config.timeouts.pool_idle.as_millis() as u64,
                "probe": config.timeouts.probe.as_millis() as u64,
            },
            "retry": {
                "max_attempts": config.retry.max_attempts,
                "base_backoff_ms": config.retry.base_backoff.as_millis() as u64,
                "max_backoff_ms": config.retry.max_backoff.as_millis() as u64,
            },
            "circuit_breaker": {
                "failure_threshold": config.breaker.failure_threshold,
                "cooldown_ms": config.breaker.cooldown.as_millis() as u64,
            },
            "health_cache_ttl_ms": config.health_cache_ttl.as_millis() as u64,
            "max_text_length": config.max_text_length,
        },
    })
}
