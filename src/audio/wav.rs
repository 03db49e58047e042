use std::io::{Read, Seek};
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::error::AudioError;

use super::segment::AudioSegment;

/// Read a WAV file of any common sample format
pub fn read_wav(path: &Path) -> Result<AudioSegment, AudioError> {
    let reader = WavReader::open(path)?;
    read_from(reader, path)
}

fn read_from<R: Read + Seek>(reader: WavReader<R>, path: &Path) -> Result<AudioSegment, AudioError> {
    let spec = reader.spec();
    if spec.sample_rate == 0 {
        return Err(AudioError::InvalidSampleRate(spec.sample_rate));
    }

    let samples: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
    };

    if samples.is_empty() {
        return Err(AudioError::Empty(path.display().to_string()));
    }

    Ok(AudioSegment::new(samples, spec.sample_rate, spec.channels))
}

/// Write 16-bit PCM WAV, clamping to full scale
pub fn write_wav(path: &Path, segment: &AudioSegment) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels: segment.channels,
        sample_rate: segment.sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    for sample in segment.clipped_samples() {
        writer.write_sample((sample * i16::MAX as f32) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Write raw 16-bit little-endian interleaved PCM bytes as a WAV file
pub fn write_pcm16(
    path: &Path,
    pcm: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<(), AudioError> {
    let spec = WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };

    let mut writer = WavWriter::create(path, spec)?;
    // Drop any trailing partial frame
    let frame_bytes = 2 * channels as usize;
    let whole = pcm.len() - pcm.len() % frame_bytes;
    for bytes in pcm[..whole].chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([bytes[0], bytes[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}
