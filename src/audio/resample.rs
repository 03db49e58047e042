use rubato::{FastFixedIn, PolynomialDegree, Resampler as RubatoResampler};
use tracing::debug;

use crate::error::AudioError;

/// Most zero-filled chunks pushed through to drain the filter delay
const MAX_FLUSH_CHUNKS: usize = 4;

/// Sample rate conversion over interleaved audio
pub struct Resampler;

impl Resampler {
    /// Convert between two sample rates
    pub fn resample(
        input: &[f32],
        input_rate: u32,
        output_rate: u32,
        channels: u16,
    ) -> Result<Vec<f32>, AudioError> {
        if input_rate == 0 {
            return Err(AudioError::InvalidSampleRate(input_rate));
        }
        if output_rate == 0 {
            return Err(AudioError::InvalidSampleRate(output_rate));
        }
        if input_rate == output_rate {
            return Ok(input.to_vec());
        }
        Self::resample_ratio(input, channels, output_rate as f64 / input_rate as f64)
    }

    /// Resample by `ratio` output frames per input frame.
    ///
    /// The output always holds `round(frames * ratio)` frames, with the
    /// filter delay trimmed from the front.
    pub fn resample_ratio(input: &[f32], channels: u16, ratio: f64) -> Result<Vec<f32>, AudioError> {
        let channels = channels.max(1) as usize;
        let planar = Self::deinterleave(input, channels);
        let input_frames = planar[0].len();
        if input_frames == 0 {
            return Ok(Vec::new());
        }
        let expected = (input_frames as f64 * ratio).round() as usize;

        let mut resampler = FastFixedIn::<f32>::new(
            ratio,
            1.0,
            PolynomialDegree::Septic,
            input_frames,
            channels,
        )
        .map_err(|e| AudioError::Resample(format!("failed to create resampler: {}", e)))?;
        let delay = resampler.output_delay();

        let mut planar_output = resampler
            .process(&planar, None)
            .map_err(|e| AudioError::Resample(e.to_string()))?;

        for _ in 0..MAX_FLUSH_CHUNKS {
            if planar_output[0].len() >= expected + delay {
                break;
            }
            let tail = resampler
                .process_partial::<Vec<f32>>(None, None)
                .map_err(|e| AudioError::Resample(e.to_string()))?;
            if tail[0].is_empty() {
                break;
            }
            for (channel, rest) in planar_output.iter_mut().zip(tail) {
                channel.extend(rest);
            }
        }

        for channel in planar_output.iter_mut() {
            channel.drain(..delay.min(channel.len()));
            channel.resize(expected, 0.0);
        }

        debug!(
            ratio,
            input_frames,
            output_frames = expected,
            "Resampled"
        );

        Ok(Self::interleave(planar_output))
    }

    /// [L, R, L, R, ...] to [[L, L, ...], [R, R, ...]]
    fn deinterleave(samples: &[f32], channels: usize) -> Vec<Vec<f32>> {
        let frames = samples.len() / channels;
        let mut planar = vec![Vec::with_capacity(frames); channels];

        for frame in samples.chunks_exact(channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                planar[ch].push(sample);
            }
        }

        planar
    }

    fn interleave(planar: Vec<Vec<f32>>) -> Vec<f32> {
        let channels = planar.len();
        let frames = planar.first().map_or(0, Vec::len);
        let mut out = Vec::with_capacity(frames * channels);

        for i in 0..frames {
            for channel in &planar {
                out.push(channel[i]);
            }
        }

        out
    }
}
