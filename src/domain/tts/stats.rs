use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for failures the façade recovers from locally, so nothing is
/// absorbed without a trace.
#[derive(Debug, Default)]
pub struct GatewayStats {
    synthesis_ok: AtomicU64,
    synthesis_failed: AtomicU64,
    candidates_tried: AtomicU64,
    format_rejections: AtomicU64,
    non_audio_rejections: AtomicU64,
    upstream_rejections: AtomicU64,
    upstream_exhausted: AtomicU64,
    transcodes: AtomicU64,
    transcode_failures: AtomicU64,
    voice_prompts_attached: AtomicU64,
    discovery_failures: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct StatsSnapshot {
    pub synthesis_ok: u64,
    pub synthesis_failed: u64,
    pub candidates_tried: u64,
    pub format_rejections: u64,
    pub non_audio_rejections: u64,
    pub upstream_rejections: u64,
    pub upstream_exhausted: u64,
    pub transcodes: u64,
    pub transcode_failures: u64,
    pub voice_prompts_attached: u64,
    pub discovery_failures: u64,
}

macro_rules! counter {
    ($name:ident) => {
        pub fn $name(&self) {
            self.$name.fetch_add(1, Ordering::Relaxed);
        }
    };
}

impl GatewayStats {
    counter!(synthesis_ok);
    counter!(synthesis_failed);
    counter!(candidates_tried);
    counter!(format_rejections);
    counter!(non_audio_rejections);
    counter!(upstream_rejections);
    counter!(upstream_exhausted);
    counter!(transcodes);
    counter!(transcode_failures);
    counter!(voice_prompts_attached);
    counter!(discovery_failures);

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            synthesis_ok: self.synthesis_ok.load(Ordering::Relaxed),
            synthesis_failed: self.synthesis_failed.load(Ordering::Relaxed),
            candidates_tried: self.candidates_tried.load(Ordering::Relaxed),
            format_rejections: self.format_rejections.load(Ordering::Relaxed),
            non_audio_rejections: self.non_audio_rejections.load(Ordering::Relaxed),
            upstream_rejections: self.upstream_rejections.load(Ordering::Relaxed),
            upstream_exhausted: self.upstream_exhausted.load(Ordering::Relaxed),
            transcodes: self.transcodes.load(Ordering::Relaxed),
            transcode_failures: self.transcode_failures.load(Ordering::Relaxed),
            voice_prompts_attached: self.voice_prompts_attached.load(Ordering::Relaxed),
            discovery_failures: self.discovery_failures.load(Ordering::Relaxed),
        }
    }
}
