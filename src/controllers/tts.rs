use axum::{
    body::Body,
    extract::{
        rejection::{FormRejection, QueryRejection},
        FromRequest, Query, Request, State,
    },
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Form, Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::{
    domain::tts::{
        GatewayApi, GatewayService, LegacyTtsParams, Operation, SpeakParams, SpeechParams,
        SynthesisRequest, SynthesisResult,
    },
    error::{AppError, AppResult},
};

pub const X_UPSTREAM: HeaderName = HeaderName::from_static("x-upstream");
pub const X_UPSTREAM_ENDPOINT: HeaderName = HeaderName::from_static("x-upstream-endpoint");
pub const X_AUDIO_FORMAT: HeaderName = HeaderName::from_static("x-audio-format");
pub const X_VOICE_PROMPT: HeaderName = HeaderName::from_static("x-voice-prompt");
pub const X_TRANSCODED: HeaderName = HeaderName::from_static("x-transcoded");

pub struct TtsController {
    gateway: Arc<GatewayService>,
}

impl TtsController {
    pub fn new(gateway: Arc<GatewayService>) -> Self {
        Self { gateway }
    }

    /// GET /tts - Legacy query-parameter synthesis
    pub async fn legacy_query(
        State(controller): State<Arc<TtsController>>,
        params: Result<Query<LegacyTtsParams>, QueryRejection>,
    ) -> AppResult<Response> {
        let Query(params) = params?;
        let request = params.into_request()?;
        controller.synthesize(request, Operation::Legacy).await
    }

    /// POST /tts - Legacy form-encoded synthesis
    pub async fn legacy_form(
        State(controller): State<Arc<TtsController>>,
        params: Result<Form<LegacyTtsParams>, FormRejection>,
    ) -> AppResult<Response> {
        let Form(params) = params?;
        let request = params.into_request()?;
        controller.synthesize(request, Operation::Legacy).await
    }

    /// POST /v1/audio/speech - OpenAI-style synthesis, JSON or form body
    pub async fn speech(
        State(controller): State<Arc<TtsController>>,
        request: Request,
    ) -> AppResult<Response> {
        let params: SpeechParams = extract_body(request).await?;
        let request = params.into_request()?;
        controller.synthesize(request, Operation::OpenAiSpeech).await
    }

    /// POST /api/speak - Minimal `{text, voice_id}` synthesis
    pub async fn speak(
        State(controller): State<Arc<TtsController>>,
        request: Request,
    ) -> AppResult<Response> {
        let params: SpeakParams = extract_body(request).await?;
        controller
            .synthesize(params.into_request(), Operation::Speak)
            .await
    }

    async fn synthesize(&self, request: SynthesisRequest, operation: Operation) -> AppResult<Response> {
        let result = self.gateway.synthesize(request, operation).await?;
        audio_response(result)
    }
}

/// Form bodies are decoded as forms, everything else as JSON.
async fn extract_body<T>(request: Request) -> AppResult<T>
where
    T: DeserializeOwned + Send + 'static,
{
    let is_form = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    if is_form {
        let Form(params) = Form::<T>::from_request(request, &()).await?;
        Ok(params)
    } else {
        let Json(params) = Json::<T>::from_request(request, &()).await?;
        Ok(params)
    }
}

fn audio_response(result: SynthesisResult) -> AppResult<Response> {
    let content_type = HeaderValue::from_str(&result.content_type)
        .map_err(|e| AppError::Internal(format!("invalid content type: {}", e)))?;
    let upstream = HeaderValue::from_str(&result.upstream)
        .map_err(|e| AppError::Internal(format!("invalid upstream header: {}", e)))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_TYPE, content_type);
    headers.insert(X_UPSTREAM, upstream);
    headers.insert(
        X_UPSTREAM_ENDPOINT,
        HeaderValue::from_static(result.endpoint.path()),
    );
    headers.insert(
        X_AUDIO_FORMAT,
        HeaderValue::from_static(result.format.map(|f| f.as_str()).unwrap_or("unknown")),
    );
    headers.insert(
        X_VOICE_PROMPT,
        HeaderValue::from_static(if result.voice_prompt_attached {
            "attached"
        } else {
            "none"
        }),
    );
    headers.insert(
        X_TRANSCODED,
        HeaderValue::from_static(if result.transcoded { "true" } else { "false" }),
    );

    Ok((StatusCode::OK, headers, Body::from(result.audio)).into_response())
}
