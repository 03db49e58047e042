use crate::error::AudioError;

use super::resample::Resampler;

/// Standard sample rate for decoded audio
pub const SAMPLE_RATE: u32 = 48_000;

/// Number of audio channels (stereo)
pub const CHANNELS: u16 = 2;

/// Decoded audio held in memory
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSegment {
    /// Interleaved samples (f32, full scale is 1.0)
    pub samples: Vec<f32>,
    /// Frames per second
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl AudioSegment {
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples,
            sample_rate,
            channels,
        }
    }

    /// Silent segment of the given length in frames
    pub fn silent(frames: usize, sample_rate: u32, channels: u16) -> Self {
        Self::new(vec![0.0; frames * channels as usize], sample_rate, channels)
    }

    /// Number of frames (samples per channel)
    pub fn frame_count(&self) -> usize {
        self.samples.len() / self.channels.max(1) as usize
    }

    /// Duration in seconds
    pub fn duration_secs(&self) -> f32 {
        self.frame_count() as f32 / self.sample_rate as f32
    }

    /// Root-mean-square amplitude over all samples
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f64 = self.samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
        (sum / self.samples.len() as f64).sqrt() as f32
    }

    /// Loudness relative to full scale. Silence is negative infinity.
    pub fn dbfs(&self) -> f32 {
        let rms = self.rms();
        if rms == 0.0 {
            return f32::NEG_INFINITY;
        }
        20.0 * rms.log10()
    }

    /// Scale every sample by a gain expressed in decibels
    pub fn apply_gain(mut self, db: f32) -> Self {
        if db == 0.0 {
            return self;
        }
        let factor = 10f32.powf(db / 20.0);
        for s in self.samples.iter_mut() {
            *s *= factor;
        }
        self
    }

    /// Keep at most `frames` frames
    pub fn truncate_frames(&mut self, frames: usize) {
        self.samples.truncate(frames * self.channels as usize);
    }

    /// Add `other` onto this segment starting at frame zero.
    ///
    /// The result keeps this segment's length; anything in `other` past the
    /// end is dropped. Both segments must share rate and channel count.
    pub fn overlay(&mut self, other: &AudioSegment) {
        debug_assert_eq!(self.channels, other.channels);
        debug_assert_eq!(self.sample_rate, other.sample_rate);

        for (dst, src) in self.samples.iter_mut().zip(other.samples.iter()) {
            *dst += *src;
        }
    }

    /// Convert to the given channel count.
    ///
    /// Mono is duplicated across channels; anything else going down to mono
    /// is averaged. Other layouts keep the first channels and pad with the last.
    pub fn to_channels(self, channels: u16) -> Self {
        if channels == self.channels || self.channels == 0 {
            return self;
        }

        let src = self.channels as usize;
        let dst = channels as usize;
        let mut out = Vec::with_capacity(self.frame_count() * dst);

        for frame in self.samples.chunks_exact(src) {
            if dst == 1 {
                out.push(frame.iter().sum::<f32>() / src as f32);
            } else if src == 1 {
                out.extend(std::iter::repeat(frame[0]).take(dst));
            } else {
                for ch in 0..dst {
                    out.push(frame[ch.min(src - 1)]);
                }
            }
        }

        Self::new(out, self.sample_rate, channels)
    }

    /// Resample to `sample_rate`
    pub fn to_sample_rate(self, sample_rate: u32) -> Result<Self, AudioError> {
        if sample_rate == self.sample_rate {
            return Ok(self);
        }
        let samples = Resampler::resample(&self.samples, self.sample_rate, sample_rate, self.channels)?;
        Ok(Self::new(samples, sample_rate, self.channels))
    }

    /// Match rate and channel layout of `reference`
    pub fn conform_to(self, reference: &AudioSegment) -> Result<Self, AudioError> {
        self.to_channels(reference.channels)
            .to_sample_rate(reference.sample_rate)
    }

    /// Samples clamped to full scale
    pub fn clipped_samples(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().map(|s| s.clamp(-1.0, 1.0))
    }
}
