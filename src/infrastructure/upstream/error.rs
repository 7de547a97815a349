use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Longest upstream error detail carried into logs and caller responses
pub const MAX_DETAIL_CHARS: usize = 300;

#[derive(Debug, Clone, thiserror::Error)]
pub enum UpstreamError {
    #[error("upstream temporarily unavailable: circuit open for another {}ms", remaining.as_millis())]
    CircuitOpen { remaining: Duration },

    #[error("upstream {url} exhausted after {attempts} attempt(s): {detail}")]
    Exhausted {
        url: String,
        attempts: u32,
        status: Option<u16>,
        detail: String,
    },

    #[error("no upstreams configured")]
    NoUpstreams,
}

impl UpstreamError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, UpstreamError::CircuitOpen { .. })
    }

    /// Last HTTP status observed before giving up, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            UpstreamError::Exhausted { status, .. } => *status,
            _ => None,
        }
    }
}

/// Short, printable summary of an upstream body for diagnostics. HTML error
/// pages are flattened to text before truncation.
pub fn body_excerpt(body: &[u8], content_type: Option<&str>) -> String {
    if body.is_empty() {
        return "<empty body>".to_string();
    }

    let looks_like_html = content_type
        .map(|ct| ct.to_lowercase().contains("html"))
        .unwrap_or(false)
        || body.iter().find(|b| !b.is_ascii_whitespace()) == Some(&b'<');

    let text = if looks_like_html {
        html2text::from_read(body, usize::MAX)
    } else if std::str::from_utf8(body).is_ok() {
        String::from_utf8_lossy(body).into_owned()
    } else {
        return format!("<{} bytes of binary data>", body.len());
    };

    let normalized = WHITESPACE.replace_all(text.trim(), " ");

    if normalized.chars().count() > MAX_DETAIL_CHARS {
        let truncated: String = normalized.chars().take(MAX_DETAIL_CHARS).collect();
        format!("{}...", truncated)
    } else {
        normalized.into_owned()
    }
}
