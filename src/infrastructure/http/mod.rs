pub mod request_id;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::controllers::{
    health::HealthController,
    tts::TtsController,
    voices::{VoiceController, MAX_UPLOAD_BYTES},
};
use crate::infrastructure::config::Config;

pub use request_id::{request_id_middleware, X_REQUEST_ID};

/// Assemble every public route around the given controllers
pub fn build_router(
    tts_controller: Arc<TtsController>,
    voice_controller: Arc<VoiceController>,
    health_controller: Arc<HealthController>,
) -> Router {
    // Synthesis shapes
    let tts_routes = Router::new()
        .route(
            "/tts",
            get(TtsController::legacy_query).post(TtsController::legacy_form),
        )
        .route("/v1/audio/speech", post(TtsController::speech))
        .route("/api/speak", post(TtsController::speak))
        .with_state(tts_controller);

    // Voice discovery and uploads
    let voice_routes = Router::new()
        .route("/api/voices", get(VoiceController::list_voices))
        .route(
            "/api/upload-voice",
            post(VoiceController::upload_voice).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .with_state(voice_controller);

    // Diagnostics
    let health_routes = Router::new()
        .route("/health", get(HealthController::health))
        .route("/api/requirements", get(HealthController::requirements))
        .with_state(health_controller);

    Router::new()
        .merge(health_routes)
        .merge(tts_routes)
        .merge(voice_routes)
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server and serve until Ctrl-C
pub async fn start_http_server(
    config: Arc<Config>,
    app: Router,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener =
        tokio::net::TcpListener::bind(format!("{}:{}", config.host, config.port)).await?;

    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received, draining connections"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for shutdown signal"),
    }
}
