use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use super::format::AudioFormat;

/// Converts audio between containers. `None` means the conversion could not
/// be done and the caller should keep the original bytes.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn transcode(&self, bytes: &[u8], from: AudioFormat, to: AudioFormat) -> Option<Vec<u8>>;
}

/// Pipes audio through an external ffmpeg process (stdin -> stdout).
pub struct FfmpegTranscoder {
    binary: String,
    timeout: Duration,
}

impl FfmpegTranscoder {
    pub fn new(binary: impl Into<String>, timeout: Duration) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    fn args(from: AudioFormat, to: AudioFormat) -> Vec<&'static str> {
        let mut args = vec![
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            from.ffmpeg_muxer(),
            "-i",
            "pipe:0",
        ];
        if to == AudioFormat::Opus {
            args.extend(["-c:a", "libopus"]);
        }
        args.extend(["-f", to.ffmpeg_muxer(), "pipe:1"]);
        args
    }

    async fn run(&self, bytes: &[u8], from: AudioFormat, to: AudioFormat) -> Result<Vec<u8>, String> {
        let mut child = Command::new(&self.binary)
            .args(Self::args(from, to))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| format!("failed to spawn {}: {}", self.binary, e))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| "encoder stdin unavailable".to_string())?;
        let input = bytes.to_vec();
        // Feed stdin concurrently so a full stdout pipe cannot deadlock the encoder.
        let writer = tokio::spawn(async move {
            let result = stdin.write_all(&input).await;
            drop(stdin);
            result
        });

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| format!("encoder timed out after {}ms", self.timeout.as_millis()))?
            .map_err(|e| format!("encoder failed: {}", e))?;

        if let Ok(Err(e)) = writer.await {
            tracing::debug!(error = %e, "Encoder closed stdin early");
        }

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(format!(
                "encoder exited with {}: {}",
                output.status,
                stderr.trim().chars().take(300).collect::<String>()
            ));
        }
        if output.stdout.is_empty() {
            return Err("encoder produced no output".to_string());
        }

        Ok(output.stdout)
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(&self, bytes: &[u8], from: AudioFormat, to: AudioFormat) -> Option<Vec<u8>> {
        let start_time = std::time::Instant::now();
        match self.run(bytes, from, to).await {
            Ok(output) => {
                tracing::debug!(
                    from = %from,
                    to = %to,
                    input_bytes = bytes.len(),
                    output_bytes = output.len(),
                    latency_ms = start_time.elapsed().as_millis(),
                    "Audio transcoded"
                );
                Some(output)
            }
            Err(e) => {
                tracing::warn!(
                    from = %from,
                    to = %to,
                    error = %e,
                    "Transcoding failed, keeping original audio"
                );
                None
            }
        }
    }
}
