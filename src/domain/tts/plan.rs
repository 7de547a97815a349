use serde::Serialize;

use crate::domain::audio::AudioFormat;

/// Upstream API shapes the gateway knows how to speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointShape {
    /// `GET /tts?text=..&voice=..` returning audio
    Legacy,
    /// OpenAI-style `POST /v1/audio/speech` with a JSON body
    OpenAiSpeech,
}

impl EndpointShape {
    pub fn path(&self) -> &'static str {
        match self {
            EndpointShape::Legacy => "/tts",
            EndpointShape::OpenAiSpeech => "/v1/audio/speech",
        }
    }

    fn other(&self) -> Self {
        match self {
            EndpointShape::Legacy => EndpointShape::OpenAiSpeech,
            EndpointShape::OpenAiSpeech => EndpointShape::Legacy,
        }
    }
}

impl std::fmt::Display for EndpointShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Inbound operation, which decides the shape tried first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Legacy,
    OpenAiSpeech,
    Speak,
}

/// Formats believed most reliable for the supported upstream family, best first.
pub const STABLE_FORMATS: [AudioFormat; 2] = [AudioFormat::Wav, AudioFormat::Mp3];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub shape: EndpointShape,
    pub format: AudioFormat,
}

/// Ordered `(endpoint, format)` combinations consumed first-to-last until one
/// yields accepted audio.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidatePlan {
    candidates: Vec<Candidate>,
}

impl CandidatePlan {
    pub fn for_operation(
        operation: Operation,
        requested: Option<AudioFormat>,
        canonical: Option<AudioFormat>,
    ) -> Self {
        match operation {
            Operation::Legacy => Self::build(EndpointShape::Legacy, requested, canonical),
            Operation::OpenAiSpeech => Self::build(EndpointShape::OpenAiSpeech, requested, canonical),
            // the convenience shape only ever negotiates wav/mp3
            Operation::Speak => Self::build(
                EndpointShape::Legacy,
                None,
                canonical.filter(|f| STABLE_FORMATS.contains(f)),
            ),
        }
    }

    /// Formats: caller's explicit choice, then the canonical format, then the
    /// stable defaults. Shapes: the operation's own shape, then the other one.
    pub fn build(
        primary: EndpointShape,
        requested: Option<AudioFormat>,
        canonical: Option<AudioFormat>,
    ) -> Self {
        let mut formats: Vec<AudioFormat> = Vec::new();
        for format in requested
            .into_iter()
            .chain(canonical)
            .chain(STABLE_FORMATS)
        {
            if !formats.contains(&format) {
                formats.push(format);
            }
        }

        let candidates = [primary, primary.other()]
            .into_iter()
            .flat_map(|shape| formats.iter().map(move |&format| Candidate { shape, format }))
            .collect();

        Self { candidates }
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}
