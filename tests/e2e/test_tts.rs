use crate::e2e::helpers;

use async_trait::async_trait;
use helpers::{
    mp3_bytes, test_config, wav_bytes, write_sample, FakeResponse, FakeUpstream, TestApp,
    TestContext,
};
use hyper::{Method, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use test_context::test_context;
use tts_gateway::domain::audio::{AudioFormat, FfmpegTranscoder, Transcoder};

/// Stands in for ffmpeg: always returns the same MP3 payload
struct FakeMp3Encoder;

#[async_trait]
impl Transcoder for FakeMp3Encoder {
    async fn transcode(&self, _: &[u8], _: AudioFormat, to: AudioFormat) -> Option<Vec<u8>> {
        (to == AudioFormat::Mp3).then(mp3_bytes)
    }
}

#[tokio::test]
async fn it_should_recover_from_a_transient_500_on_the_same_upstream() {
    let upstream = FakeUpstream::start(|req, seen| match (req.path.as_str(), seen) {
        ("/tts", 0) => FakeResponse::status(500),
        ("/tts", _) => FakeResponse::wav(),
        _ => FakeResponse::status(404),
    })
    .await;
    let ctx = TestContext::with_upstream(upstream, |_| {}).await.unwrap();

    let response = ctx
        .client()
        .get("/tts?text=Hello+world&voice=default")
        .await
        .unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("content-type", "audio/wav")
        .assert_header("x-audio-format", "wav")
        .assert_header("x-voice-prompt", "none")
        .assert_header("x-upstream", &ctx.upstream.url)
        .assert_audio(b"RIFF");
    assert_eq!(response.body_bytes, wav_bytes());

    let breaker = ctx.app.breaker.snapshot();
    assert_eq!(breaker.total_failures, 1);
    assert_eq!(breaker.total_successes, 1);
    assert!(!breaker.open);
    assert_eq!(ctx.upstream.hits_on("/tts"), 2);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_forward_legacy_query_parameters(ctx: &TestContext) {
    let response = ctx
        .client()
        .get("/tts?text=Good+morning&voice=alloy&exaggeration=0.7&cfg_weight=0.3")
        .await
        .unwrap();

    response.assert_status(StatusCode::OK);

    let requests = ctx.upstream.requests_on("/tts");
    assert_eq!(requests.len(), 1);
    let sent = &requests[0];
    assert_eq!(sent.query_param("text").as_deref(), Some("Good morning"));
    assert_eq!(sent.query_param("voice").as_deref(), Some("alloy"));
    assert_eq!(sent.query_param("exaggeration").as_deref(), Some("0.7"));
    assert_eq!(sent.query_param("cfg_weight").as_deref(), Some("0.3"));
    assert_eq!(sent.query_param("audio_prompt_path"), None);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_accept_legacy_form_posts(ctx: &TestContext) {
    let response = ctx
        .client()
        .post_form("/tts", &[("text", "Form encoded hello"), ("voice", "default")])
        .await
        .unwrap();

    response.assert_status(StatusCode::OK).assert_audio(b"RIFF");
    assert_eq!(
        ctx.upstream.requests_on("/tts")[0]
            .query_param("text")
            .as_deref(),
        Some("Form encoded hello")
    );
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_serve_openai_style_json_requests(ctx: &TestContext) {
    let response = ctx
        .client()
        .post(
            "/v1/audio/speech",
            &json!({
                "input": "Hello from the JSON shape",
                "voice": "default",
                "model": "chatterbox",
                "response_format": "wav",
                "exaggeration": 0.5,
                "cfg_weight": 0.4
            }),
        )
        .await
        .unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("x-upstream-endpoint", "/v1/audio/speech")
        .assert_audio(b"RIFF");

    let recorded = &ctx.upstream.requests_on("/v1/audio/speech")[0];
    assert_eq!(recorded.method, Method::POST);
    let sent = recorded.json().unwrap();
    assert_eq!(sent["input"], "Hello from the JSON shape");
    assert_eq!(sent["model"], "chatterbox");
    assert_eq!(sent["response_format"], "wav");
    assert_eq!(sent["exaggeration"], 0.5);
    assert_eq!(sent["cfg_weight"], 0.4);
    assert_eq!(ctx.upstream.hits_on("/tts"), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_serve_openai_style_form_requests(ctx: &TestContext) {
    let response = ctx
        .client()
        .post_form(
            "/v1/audio/speech",
            &[("input", "Hello form"), ("response_format", "wav")],
        )
        .await
        .unwrap();

    response.assert_status(StatusCode::OK).assert_audio(b"RIFF");
    assert_eq!(ctx.upstream.hits_on("/v1/audio/speech"), 1);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_try_legacy_shape_first_for_speak(ctx: &TestContext) {
    let response = ctx
        .client()
        .post("/api/speak", &json!({"text": "Quick one", "voice_id": "default"}))
        .await
        .unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("x-upstream-endpoint", "/tts");
    assert_eq!(ctx.upstream.hits_on("/tts"), 1);
    assert_eq!(ctx.upstream.hits_on("/v1/audio/speech"), 0);
}

#[tokio::test]
async fn it_should_fall_back_to_json_shape_when_legacy_is_missing() {
    let upstream = FakeUpstream::start(|req, _| match req.path.as_str() {
        "/v1/audio/speech" => FakeResponse::mp3(),
        _ => FakeResponse::status(404),
    })
    .await;
    let ctx = TestContext::with_upstream(upstream, |_| {}).await.unwrap();

    let response = ctx
        .client()
        .post("/api/speak", &json!({"text": "Fallback please"}))
        .await
        .unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("content-type", "audio/mpeg")
        .assert_header("x-upstream-endpoint", "/v1/audio/speech")
        .assert_audio(b"ID3");
    // legacy shape tried with both wav and mp3 before switching
    assert_eq!(ctx.upstream.hits_on("/tts"), 2);
}

#[tokio::test]
async fn it_should_try_another_format_after_a_415() {
    let upstream = FakeUpstream::start(|req, _| match (req.path.as_str(), req.format()) {
        ("/v1/audio/speech", Some(f)) if f == "mp3" => FakeResponse::status(415),
        ("/v1/audio/speech", _) => FakeResponse::wav(),
        _ => FakeResponse::status(404),
    })
    .await;
    let ctx = TestContext::with_upstream(upstream, |_| {}).await.unwrap();

    let response = ctx
        .client()
        .post(
            "/v1/audio/speech",
            &json!({"input": "Prefer mp3", "response_format": "mp3"}),
        )
        .await
        .unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("x-audio-format", "wav");

    let formats: Vec<Option<String>> = ctx
        .upstream
        .requests_on("/v1/audio/speech")
        .iter()
        .map(|r| r.format())
        .collect();
    assert_eq!(formats, vec![Some("mp3".to_string()), Some("wav".to_string())]);

    let stats = ctx.app.gateway.stats().snapshot();
    assert_eq!(stats.format_rejections, 1);
    // 415 is not transient, so nothing was retried or counted against the breaker
    assert_eq!(ctx.app.breaker.snapshot().total_failures, 0);
}

#[tokio::test]
async fn it_should_never_forward_an_error_page_as_audio() {
    let upstream = FakeUpstream::start(|req, _| match req.path.as_str() {
        "/tts" => FakeResponse::html_error(),
        "/v1/audio/speech" => FakeResponse::wav(),
        _ => FakeResponse::status(404),
    })
    .await;
    let ctx = TestContext::with_upstream(upstream, |_| {}).await.unwrap();

    let response = ctx.client().get("/tts?text=hello").await.unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("x-upstream-endpoint", "/v1/audio/speech")
        .assert_audio(b"RIFF");
    assert_eq!(ctx.upstream.hits_on("/tts"), 2);
    assert_eq!(ctx.app.gateway.stats().snapshot().non_audio_rejections, 2);
}

#[tokio::test]
async fn it_should_move_to_the_next_endpoint_when_every_upstream_fails_one() {
    let upstream = FakeUpstream::start(|req, _| match req.path.as_str() {
        "/tts" => FakeResponse::status(500),
        "/v1/audio/speech" => FakeResponse::wav(),
        _ => FakeResponse::status(404),
    })
    .await;
    let ctx = TestContext::with_upstream(upstream, |_| {}).await.unwrap();

    let response = ctx
        .client()
        .post("/api/speak", &json!({"text": "hello"}))
        .await
        .unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("x-upstream-endpoint", "/v1/audio/speech")
        .assert_audio(b"RIFF");
    // wav then mp3 on /tts, each retried once before moving on
    assert_eq!(ctx.upstream.hits_on("/tts"), 4);
    assert_eq!(ctx.upstream.hits_on("/v1/audio/speech"), 1);
    assert_eq!(ctx.app.gateway.stats().snapshot().upstream_exhausted, 2);
    assert!(!ctx.app.breaker.is_open());
}

#[tokio::test]
async fn it_should_return_bad_gateway_when_no_candidate_yields_audio() {
    let upstream = FakeUpstream::start(|req, _| match req.path.as_str() {
        "/health" => FakeResponse::status(200),
        _ => FakeResponse::html_error(),
    })
    .await;
    let ctx = TestContext::with_upstream(upstream, |_| {}).await.unwrap();

    let response = ctx.client().get("/tts?text=hello").await.unwrap();

    response
        .assert_status(StatusCode::BAD_GATEWAY)
        .assert_error_message("no upstream combination produced audio");
    // never retried: every 2xx is a clean response
    assert_eq!(ctx.upstream.hits_on("/tts"), 2);
    assert_eq!(ctx.upstream.hits_on("/v1/audio/speech"), 2);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_missing_text(ctx: &TestContext) {
    let response = ctx.client().get("/tts?voice=default").await.unwrap();
    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("text is required");

    let response = ctx
        .client()
        .post("/v1/audio/speech", &json!({"input": "   "}))
        .await
        .unwrap();
    response.assert_status(StatusCode::BAD_REQUEST);

    assert_eq!(ctx.upstream.hits(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_answer_malformed_parameters_with_a_json_error(ctx: &TestContext) {
    let response = ctx
        .client()
        .get("/tts?text=hi&exaggeration=abc")
        .await
        .unwrap();
    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_header("content-type", "application/json")
        .assert_error_message("Failed to deserialize query string");

    let response = ctx
        .client()
        .post_form("/tts", &[("text", "hi"), ("temperature", "warm")])
        .await
        .unwrap();
    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("Failed to deserialize form");

    assert_eq!(ctx.upstream.hits(), 0);
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_unknown_formats(ctx: &TestContext) {
    let response = ctx
        .client()
        .post(
            "/v1/audio/speech",
            &json!({"input": "hello", "response_format": "midi"}),
        )
        .await
        .unwrap();

    response
        .assert_status(StatusCode::BAD_REQUEST)
        .assert_error_message("unsupported audio format");
}

#[test_context(TestContext)]
#[tokio::test]
async fn it_should_reject_text_over_the_limit(ctx: &TestContext) {
    let text = "a".repeat(ctx.app.config.max_text_length + 1);
    let response = ctx
        .client()
        .post("/api/speak", &json!({ "text": text }))
        .await
        .unwrap();

    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(ctx.upstream.hits(), 0);
}

#[tokio::test]
async fn it_should_fail_fast_once_the_breaker_opens() {
    let upstream = FakeUpstream::start(|_, _| FakeResponse::status(503)).await;
    let ctx = TestContext::with_upstream(upstream, |config| {
        config.breaker.failure_threshold = 2;
        config.breaker.cooldown = Duration::from_secs(60);
    })
    .await
    .unwrap();

    // the first candidate trips the breaker, the second is refused at the gate
    let response = ctx.client().get("/tts?text=hello").await.unwrap();
    response
        .assert_status(StatusCode::SERVICE_UNAVAILABLE)
        .assert_error_message("circuit open");
    assert_eq!(ctx.upstream.hits(), 2);

    let response = ctx.client().get("/tts?text=hello").await.unwrap();
    response
        .assert_status(StatusCode::SERVICE_UNAVAILABLE)
        .assert_error_message("circuit open");
    // rejected without touching the network
    assert_eq!(ctx.upstream.hits(), 2);
    assert_eq!(ctx.app.breaker.snapshot().trips, 1);
}

#[tokio::test]
async fn it_should_attach_a_local_voice_prompt_when_the_sample_exists() {
    let upstream = FakeUpstream::healthy().await;
    let voice_dir = TempDir::new().unwrap();
    let sample = write_sample(voice_dir.path(), "natalie.wav");
    let config = test_config(vec![upstream.url.clone()], voice_dir.path());
    let app = TestApp::spawn(config, None).await.unwrap();

    let response = app.client.get("/tts?text=hello&voice=Natalie").await.unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("x-voice-prompt", "attached");
    let sent = &upstream.requests_on("/tts")[0];
    assert_eq!(
        sent.query_param("audio_prompt_path"),
        Some(sample.to_string_lossy().into_owned())
    );

    // a deleted sample degrades to passing the voice id through
    std::fs::remove_file(&sample).unwrap();
    let response = app.client.get("/tts?text=hello&voice=Natalie").await.unwrap();
    response
        .assert_status(StatusCode::OK)
        .assert_header("x-voice-prompt", "none");
    let sent = &upstream.requests_on("/tts")[1];
    assert_eq!(sent.query_param("audio_prompt_path"), None);
    assert_eq!(sent.query_param("voice").as_deref(), Some("Natalie"));
}

#[tokio::test]
async fn it_should_transcode_to_the_canonical_format() {
    let upstream = FakeUpstream::healthy().await;
    let voice_dir = TempDir::new().unwrap();
    let mut config = test_config(vec![upstream.url.clone()], voice_dir.path());
    config.output.canonical_format = Some(AudioFormat::Mp3);
    let app = TestApp::spawn(config, Some(Arc::new(FakeMp3Encoder)))
        .await
        .unwrap();

    let response = app.client.get("/tts?text=hello").await.unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("content-type", "audio/mpeg")
        .assert_header("x-audio-format", "mp3")
        .assert_header("x-transcoded", "true")
        .assert_audio(b"ID3");
    // the canonical format is requested first
    assert_eq!(
        upstream.requests_on("/tts")[0].format().as_deref(),
        Some("mp3")
    );
}

#[tokio::test]
async fn it_should_return_original_audio_when_the_encoder_is_missing() {
    let upstream = FakeUpstream::healthy().await;
    let voice_dir = TempDir::new().unwrap();
    let mut config = test_config(vec![upstream.url.clone()], voice_dir.path());
    config.output.canonical_format = Some(AudioFormat::Mp3);
    let encoder = FfmpegTranscoder::new("/nonexistent/ffmpeg-for-tests", Duration::from_secs(1));
    let app = TestApp::spawn(config, Some(Arc::new(encoder))).await.unwrap();

    let response = app.client.get("/tts?text=hello").await.unwrap();

    response
        .assert_status(StatusCode::OK)
        .assert_header("content-type", "audio/wav")
        .assert_header("x-transcoded", "false");
    assert_eq!(response.body_bytes, wav_bytes());

    let stats = app.gateway.stats().snapshot();
    assert_eq!(stats.transcodes, 1);
    assert_eq!(stats.transcode_failures, 1);
}
