use axum::{
    body::Bytes,
    extract::State,
    http::{header, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    Router,
};
use parking_lot::Mutex;
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;

/// What the fake backend saw
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Bytes,
}

impl RecordedRequest {
    pub fn query_param(&self, name: &str) -> Option<String> {
        let pairs: Vec<(String, String)> =
            serde_urlencoded::from_str(self.query.as_deref()?).ok()?;
        pairs
            .into_iter()
            .find_map(|(key, value)| (key == name).then_some(value))
    }

    pub fn json(&self) -> Option<Value> {
        serde_json::from_slice(&self.body).ok()
    }

    /// Requested format from either the query string or the JSON body
    pub fn format(&self) -> Option<String> {
        self.query_param("response_format").or_else(|| {
            self.json()?
                .get("response_format")?
                .as_str()
                .map(str::to_string)
        })
    }
}

#[derive(Debug, Clone)]
pub struct FakeResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FakeResponse {
    pub fn new(status: u16, content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            content_type: Some(content_type.to_string()),
            body: body.into(),
        }
    }

    pub fn wav() -> Self {
        Self::new(200, "audio/wav", wav_bytes())
    }

    pub fn mp3() -> Self {
        Self::new(200, "audio/mpeg", mp3_bytes())
    }

    pub fn json(body: Value) -> Self {
        Self::new(200, "application/json", body.to_string())
    }

    pub fn status(status: u16) -> Self {
        Self::new(status, "text/plain", format!("status {}", status))
    }

    pub fn html_error() -> Self {
        Self::new(
            200,
            "text/html",
            "<html><body><h1>Model crashed</h1><p>CUDA out of memory</p></body></html>",
        )
    }
}

/// `(request, index of this request among requests to the same path)`
type Responder = dyn Fn(&RecordedRequest, usize) -> FakeResponse + Send + Sync;

struct FakeState {
    responder: Box<Responder>,
    requests: Mutex<Vec<RecordedRequest>>,
}

/// In-process scripted backend bound to an ephemeral port
pub struct FakeUpstream {
    pub url: String,
    state: Arc<FakeState>,
}

impl FakeUpstream {
    pub async fn start<F>(responder: F) -> Self
    where
        F: Fn(&RecordedRequest, usize) -> FakeResponse + Send + Sync + 'static,
    {
        let state = Arc::new(FakeState {
            responder: Box::new(responder),
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new().fallback(handle).with_state(state.clone());
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind fake upstream");
        let url = format!("http://{}", listener.local_addr().expect("Failed to get local addr"));

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { url, state }
    }

    /// Healthy backend: `/health` answers, both synthesis shapes return WAV
    pub async fn healthy() -> Self {
        Self::start(|req, _| match req.path.as_str() {
            "/health" => FakeResponse::json(serde_json::json!({"status": "ok"})),
            "/tts" | "/v1/audio/speech" => FakeResponse::wav(),
            _ => FakeResponse::status(404),
        })
        .await
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().clone()
    }

    pub fn hits(&self) -> usize {
        self.state.requests.lock().len()
    }

    pub fn hits_on(&self, path: &str) -> usize {
        self.state
            .requests
            .lock()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn requests_on(&self, path: &str) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.path == path).collect()
    }
}

async fn handle(
    State(state): State<Arc<FakeState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let request = RecordedRequest {
        method,
        path: uri.path().to_string(),
        query: uri.query().map(str::to_string),
        body,
    };

    let seen = {
        let mut requests = state.requests.lock();
        let seen = requests.iter().filter(|r| r.path == request.path).count();
        requests.push(request.clone());
        seen
    };

    let reply = (state.responder)(&request, seen);
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match reply.content_type {
        Some(content_type) => {
            (status, [(header::CONTENT_TYPE, content_type)], reply.body).into_response()
        }
        None => (status, reply.body).into_response(),
    }
}

/// Address nothing is listening on
pub async fn dead_upstream_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind probe listener");
    let addr = listener.local_addr().expect("Failed to get local addr");
    drop(listener);
    format!("http://{}", addr)
}

pub fn wav_bytes() -> Vec<u8> {
    let mut bytes = b"RIFF\x24\x08\x00\x00WAVEfmt ".to_vec();
    bytes.resize(256, 0);
    bytes
}

pub fn mp3_bytes() -> Vec<u8> {
    let mut bytes = b"ID3\x04\x00\x00\x00\x00\x00\x00".to_vec();
    bytes.resize(256, 0);
    bytes
}
