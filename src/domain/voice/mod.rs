pub mod error;
pub mod normalizer;
pub mod registry;

pub use error::VoiceError;
pub use normalizer::{collect_entries, VoiceEntry};
pub use registry::{normalize_key, StoredVoice, VoiceRegistry};
