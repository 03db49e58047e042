mod decode;
mod effects;
mod mixer;
mod resample;
mod segment;
mod stream;
mod wav;

pub use decode::Ffmpeg;
pub use mixer::Mixer;
pub use segment::AudioSegment;
#[cfg(test)]
pub use segment::{CHANNELS, SAMPLE_RATE};
pub use stream::collect_frames;
pub use wav::{read_wav, write_pcm16, write_wav};

use std::path::{Path, PathBuf};

use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

use crate::error::AudioError;

/// Container used for the rendered song
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Compressed MP3 via ffmpeg
    Mp3,
    /// 16-bit PCM WAV, no external tools needed
    Wav,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Wav => "wav",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Wav => "audio/wav",
        }
    }

    /// Guess the format from a file name
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "mp3" => Some(OutputFormat::Mp3),
            "wav" => Some(OutputFormat::Wav),
            _ => None,
        }
    }
}

/// Decode an audio file into memory.
///
/// RIFF/WAVE files are read directly; everything else goes through ffmpeg.
#[instrument]
pub async fn load(path: &Path) -> Result<AudioSegment, AudioError> {
    let mut header = [0u8; 12];
    let mut file = tokio::fs::File::open(path).await?;
    let read = file.read(&mut header).await?;
    drop(file);

    let is_wav = read >= 12 && &header[..4] == b"RIFF" && &header[8..12] == b"WAVE";
    debug!(is_wav, "Loading audio");

    if is_wav {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || read_wav(&path)).await?
    } else {
        Ffmpeg::decode(path).await
    }
}

/// Write a segment to `path` in the given format; returns the duration written
#[instrument(skip(segment), fields(frames = segment.frame_count()))]
pub async fn render(
    segment: AudioSegment,
    path: &Path,
    format: OutputFormat,
) -> Result<f32, AudioError> {
    let duration_secs = segment.duration_secs();

    match format {
        OutputFormat::Mp3 => Ffmpeg::encode_mp3(&segment, path).await?,
        OutputFormat::Wav => {
            let path = path.to_path_buf();
            tokio::task::spawn_blocking(move || write_wav(&path, &segment)).await??
        }
    }

    Ok(duration_secs)
}
