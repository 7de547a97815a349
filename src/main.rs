use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tts_gateway::controllers::{health::HealthController, tts::TtsController, voices::VoiceController};
use tts_gateway::domain::audio::{AudioNormalizer, FfmpegTranscoder, Transcoder};
use tts_gateway::domain::health::HealthProber;
use tts_gateway::domain::tts::{requirements_document, GatewayService};
use tts_gateway::domain::voice::VoiceRegistry;
use tts_gateway::infrastructure::config::{Config, LogFormat};
use tts_gateway::infrastructure::http::{build_router, start_http_server};
use tts_gateway::infrastructure::upstream::{
    CircuitBreaker, FailoverOrchestrator, RetryingExecutor, UpstreamRegistry,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    init_logging(&config);

    tracing::info!(
        "Starting TTS gateway on {}:{} ({:?})",
        config.host,
        config.port,
        config.environment
    );
    tracing::info!(
        upstreams = ?config.upstream_urls,
        retry_attempts = config.retry.max_attempts,
        breaker_threshold = config.breaker.failure_threshold,
        breaker_cooldown_secs = config.breaker.cooldown.as_secs(),
        canonical_format = ?config.output.canonical_format,
        "Upstream configuration loaded"
    );

    let config = Arc::new(config);

    // === DEPENDENCY INJECTION SETUP ===
    // 1. Shared upstream state
    tracing::info!("Instantiating upstream clients...");
    let registry = Arc::new(UpstreamRegistry::new(config.upstream_urls.clone()));
    let breaker = Arc::new(CircuitBreaker::new(config.breaker.clone()));
    let executor = Arc::new(RetryingExecutor::new(
        &config.timeouts,
        config.retry.clone(),
        registry,
        breaker,
    )?);
    let failover = Arc::new(FailoverOrchestrator::new(executor.clone()));

    // 2. Domain components
    tracing::info!("Instantiating services...");
    let prober = Arc::new(HealthProber::new(executor, config.health_cache_ttl));
    let voices = Arc::new(VoiceRegistry::new(config.voices.clone()));
    voices.refresh_local();
    tracing::info!(
        voices = voices.len(),
        dir = %voices.asset_dir().display(),
        "Local voice references loaded"
    );

    let transcoder = config.output.canonical_format.map(|_| {
        Arc::new(FfmpegTranscoder::new(
            config.output.ffmpeg_path.clone(),
            config.output.transcode_timeout,
        )) as Arc<dyn Transcoder>
    });
    let normalizer = AudioNormalizer::new(config.output.canonical_format, transcoder);

    let gateway = Arc::new(GatewayService::new(
        failover,
        prober,
        voices,
        normalizer,
        config.max_text_length,
    ));

    // 3. Instantiate controllers (inject services)
    tracing::info!("Instantiating controllers...");
    let tts_controller = Arc::new(TtsController::new(gateway.clone()));
    let voice_controller = Arc::new(VoiceController::new(gateway.clone()));
    let health_controller = Arc::new(HealthController::new(
        gateway,
        requirements_document(&config),
    ));

    // Start HTTP server with all routes
    let app = build_router(tts_controller, voice_controller, health_controller);
    start_http_server(config, app).await?;

    Ok(())
}

fn init_logging(config: &Config) {
    let default_filter = if config.is_development() {
        "tts_gateway=debug,tower_http=debug"
    } else {
        "tts_gateway=info,tower_http=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    if config.log_format == LogFormat::Json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}
