use std::path::Path;
use std::process::Stdio;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::{debug, error, instrument};

use crate::error::AudioError;

use super::segment::{AudioSegment, CHANNELS, SAMPLE_RATE};

/// Bit rate of rendered MP3 files
pub const MP3_BITRATE: &str = "192k";

/// Audio codec using an ffmpeg subprocess
pub struct Ffmpeg;

impl Ffmpeg {
    /// Check if ffmpeg is available
    async fn ensure_available() -> Result<(), AudioError> {
        Command::new("ffmpeg")
            .arg("-version")
            .output()
            .await
            .map(|_| ())
            .map_err(|_| AudioError::FfmpegNotFound)
    }

    /// Decode any ffmpeg-readable file to 48kHz stereo f32 PCM
    #[instrument]
    pub async fn decode(path: &Path) -> Result<AudioSegment, AudioError> {
        Self::ensure_available().await?;

        // Output: f32le PCM at 48kHz stereo on stdout
        let output = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(path)
            .args([
                "-f",
                "f32le",
                "-acodec",
                "pcm_f32le",
                "-ar",
                &SAMPLE_RATE.to_string(),
                "-ac",
                &CHANNELS.to_string(),
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| AudioError::FfmpegError(format!("Failed to spawn ffmpeg: {}", e)))?;

        if !output.status.success() {
            let stderr_str = String::from_utf8_lossy(&output.stderr);
            error!(stderr = %stderr_str, "ffmpeg decode failed");
            return Err(AudioError::FfmpegFailed(output.status));
        }

        if output.stdout.is_empty() {
            return Err(AudioError::Empty(path.display().to_string()));
        }

        // Each sample is 4 bytes (f32 little-endian)
        let samples: Vec<f32> = output
            .stdout
            .chunks_exact(4)
            .map(|bytes| f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            .collect();

        debug!(
            output_samples = samples.len(),
            duration_secs = samples.len() as f32 / (SAMPLE_RATE as f32 * CHANNELS as f32),
            "Decode complete"
        );

        Ok(AudioSegment::new(samples, SAMPLE_RATE, CHANNELS))
    }

    /// Encode a segment to MP3 at a fixed bit rate
    #[instrument(skip(segment), fields(frames = segment.frame_count()))]
    pub async fn encode_mp3(segment: &AudioSegment, path: &Path) -> Result<(), AudioError> {
        Self::ensure_available().await?;

        // Input: f32le PCM on stdin, output: MP3 file
        let mut child = Command::new("ffmpeg")
            .args([
                "-y",
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "f32le",
                "-ar",
                &segment.sample_rate.to_string(),
                "-ac",
                &segment.channels.to_string(),
                "-i",
                "pipe:0",
                "-codec:a",
                "libmp3lame",
                "-b:a",
                MP3_BITRATE,
            ])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AudioError::FfmpegError(format!("Failed to spawn ffmpeg: {}", e)))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| AudioError::FfmpegError("Failed to get stdin".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| AudioError::FfmpegError("Failed to get stderr".into()))?;

        let input: Vec<u8> = segment
            .clipped_samples()
            .flat_map(|s| s.to_le_bytes())
            .collect();

        // Write input in a separate task to avoid deadlock
        let write_handle = tokio::spawn(async move {
            if let Err(e) = stdin.write_all(&input).await {
                error!(error = %e, "Failed to write to ffmpeg stdin");
            }
            drop(stdin); // Close stdin to signal EOF
        });

        let mut stderr_output = Vec::new();
        stderr
            .read_to_end(&mut stderr_output)
            .await
            .map_err(|e| AudioError::FfmpegError(format!("Failed to read stderr: {}", e)))?;

        let _ = write_handle.await;

        let status = child.wait().await?;
        if !status.success() {
            let stderr_str = String::from_utf8_lossy(&stderr_output);
            error!(stderr = %stderr_str, "ffmpeg encode failed");
            return Err(AudioError::FfmpegFailed(status));
        }

        debug!(path = ?path, "Encode complete");
        Ok(())
    }
}
