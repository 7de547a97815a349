use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::domain::audio::AudioFormat;

pub const DEFAULT_UPSTREAM_URL: &str = "http://127.0.0.1:4123";

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub environment: Environment,
    pub log_format: LogFormat,
    pub upstream_urls: Vec<String>,
    pub timeouts: TimeoutConfig,
    pub retry: RetryConfig,
    pub breaker: CircuitBreakerConfig,
    pub health_cache_ttl: Duration,
    pub output: OutputConfig,
    pub voices: VoiceConfig,
    pub max_text_length: usize,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Layered HTTP timeouts. Synthesis calls get the long read budget, while
/// health probes and voice listing use the short probe profile.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    pub connect: Duration,
    pub read: Duration,
    pub write: Duration,
    pub pool_idle: Duration,
    pub pool_max_idle_per_host: usize,
    pub probe: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(120),
            write: Duration::from_secs(30),
            pool_idle: Duration::from_secs(30),
            pool_max_idle_per_host: 16,
            probe: Duration::from_secs(3),
        }
    }
}

/// Retry policy for a single upstream.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts per upstream, including the first one
    pub max_attempts: u32,
    /// First backoff step; doubled on every further attempt
    pub base_backoff: Duration,
    /// Ceiling for backoff including jitter
    pub max_backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_millis(4000),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive recorded failures before the breaker opens (0 disables it)
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct OutputConfig {
    /// When set, every response is normalized to this container
    pub canonical_format: Option<AudioFormat>,
    pub ffmpeg_path: String,
    pub transcode_timeout: Duration,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            canonical_format: None,
            ffmpeg_path: "ffmpeg".to_string(),
            transcode_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct VoiceConfig {
    pub asset_dir: PathBuf,
    pub upload_log: Option<PathBuf>,
    pub manifest: Option<PathBuf>,
    pub static_map: HashMap<String, PathBuf>,
    pub local_refresh_interval: Duration,
    pub remote_refresh_interval: Duration,
}

impl VoiceConfig {
    pub fn for_dir(asset_dir: impl Into<PathBuf>) -> Self {
        let asset_dir = asset_dir.into();
        Self {
            upload_log: Some(asset_dir.join("uploads.json")),
            manifest: Some(asset_dir.join("voices.json")),
            asset_dir,
            static_map: HashMap::new(),
            local_refresh_interval: Duration::from_secs(5),
            remote_refresh_interval: Duration::from_secs(60),
        }
    }
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self::for_dir("./voices")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            environment: Environment::Development,
            log_format: LogFormat::Pretty,
            upstream_urls: vec![DEFAULT_UPSTREAM_URL.to_string()],
            timeouts: TimeoutConfig::default(),
            retry: RetryConfig::default(),
            breaker: CircuitBreakerConfig::default(),
            health_cache_ttl: Duration::from_secs(10),
            output: OutputConfig::default(),
            voices: VoiceConfig::default(),
            max_text_length: 10_000,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        let upstream_urls = parse_upstream_list(
            &env::var("TTS_UPSTREAM_URLS").unwrap_or_else(|_| DEFAULT_UPSTREAM_URL.to_string()),
        );
        let upstream_urls = if upstream_urls.is_empty() {
            vec![DEFAULT_UPSTREAM_URL.to_string()]
        } else {
            upstream_urls
        };

        let asset_dir = PathBuf::from(
            env::var("VOICE_ASSET_DIR").unwrap_or_else(|_| "./voices".to_string()),
        );
        let mut voices = VoiceConfig::for_dir(&asset_dir);
        if let Ok(path) = env::var("VOICE_UPLOAD_LOG") {
            voices.upload_log = non_empty_path(&path);
        }
        if let Ok(path) = env::var("VOICE_MANIFEST") {
            voices.manifest = non_empty_path(&path);
        }
        voices.static_map = parse_voice_map(&env::var("VOICE_MAP").unwrap_or_default());
        voices.local_refresh_interval = secs_var("VOICE_LOCAL_REFRESH_SECS", 5)?;
        voices.remote_refresh_interval = secs_var("VOICE_REMOTE_REFRESH_SECS", 60)?;

        let force_mp3 = bool_var("FORCE_MP3");
        let canonical_format = match env::var("CANONICAL_FORMAT") {
            Ok(value) if !value.trim().is_empty() => Some(
                value
                    .parse::<AudioFormat>()
                    .map_err(|e| format!("CANONICAL_FORMAT: {}", e))?,
            ),
            _ if force_mp3 => Some(AudioFormat::Mp3),
            _ => None,
        };

        let config = Config {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()?,
            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "production" => Environment::Production,
                    _ => Environment::Development,
                })?,
            log_format: env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .parse::<String>()
                .map(|s| match s.as_str() {
                    "json" => LogFormat::Json,
                    _ => LogFormat::Pretty,
                })?,
            upstream_urls,
            timeouts: TimeoutConfig {
                connect: millis_var("UPSTREAM_CONNECT_TIMEOUT_MS", 5_000)?,
                read: millis_var("UPSTREAM_READ_TIMEOUT_MS", 120_000)?,
                write: millis_var("UPSTREAM_WRITE_TIMEOUT_MS", 30_000)?,
                pool_idle: millis_var("UPSTREAM_POOL_TIMEOUT_MS", 30_000)?,
                pool_max_idle_per_host: env::var("UPSTREAM_POOL_MAX_IDLE")
                    .unwrap_or_else(|_| "16".to_string())
                    .parse()?,
                probe: millis_var("UPSTREAM_PROBE_TIMEOUT_MS", 3_000)?,
            },
            retry: RetryConfig {
                max_attempts: env::var("RETRY_ATTEMPTS")
                    .unwrap_or_else(|_| "3".to_string())
                    .parse::<u32>()?
                    .max(1),
                base_backoff: millis_var("RETRY_BACKOFF_BASE_MS", 250)?,
                max_backoff: millis_var("RETRY_BACKOFF_MAX_MS", 4_000)?,
            },
            breaker: CircuitBreakerConfig {
                failure_threshold: env::var("BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                cooldown: secs_var("BREAKER_COOLDOWN_SECS", 30)?,
            },
            health_cache_ttl: secs_var("HEALTH_CACHE_TTL_SECS", 10)?,
            output: OutputConfig {
                canonical_format,
                ffmpeg_path: env::var("FFMPEG_PATH").unwrap_or(defaults.output.ffmpeg_path),
                transcode_timeout: millis_var("TRANSCODE_TIMEOUT_MS", 30_000)?,
            },
            voices,
            max_text_length: env::var("MAX_TEXT_LENGTH")
                .unwrap_or_else(|_| "10000".to_string())
                .parse()?,
        };

        Ok(config)
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }
}

/// Split an upstream list on `,` or `;`, dropping blanks, trailing slashes
/// and duplicates while keeping the configured order.
pub fn parse_upstream_list(raw: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for part in raw.split([',', ';']) {
        let url = part.trim().trim_end_matches('/');
        if url.is_empty() || urls.iter().any(|u| u == url) {
            continue;
        }
        urls.push(url.to_string());
    }
    urls
}

/// Parse `alias=path` pairs separated by `,` or `;`. Malformed pairs are skipped.
pub fn parse_voice_map(raw: &str) -> HashMap<String, PathBuf> {
    raw.split([',', ';'])
        .filter_map(|pair| {
            let (alias, path) = pair.split_once('=')?;
            let alias = alias.trim();
            let path = path.trim();
            if alias.is_empty() || path.is_empty() {
                return None;
            }
            Some((alias.to_string(), PathBuf::from(path)))
        })
        .collect()
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    let value = value.trim();
    (!value.is_empty()).then(|| PathBuf::from(value))
}

fn bool_var(name: &str) -> bool {
    env::var(name)
        .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

fn millis_var(name: &str, default: u64) -> Result<Duration, std::num::ParseIntError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map(Duration::from_millis)
}

fn secs_var(name: &str, default: u64) -> Result<Duration, std::num::ParseIntError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .trim()
        .parse()
        .map(Duration::from_secs)
}
