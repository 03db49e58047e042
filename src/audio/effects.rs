use tracing::{debug, instrument};

use crate::error::AudioError;

use super::resample::Resampler;
use super::segment::AudioSegment;

/// Low band cutoff for the bass control
pub const LOW_CUTOFF_HZ: f32 = 250.0;

/// High band cutoff for the treble control
pub const HIGH_CUTOFF_HZ: f32 = 4000.0;

/// Decibels applied per unit of bass/treble
pub const EQ_DB_PER_UNIT: f32 = 1.5;

/// Bring a segment to `target_dbfs` with a single uniform gain.
///
/// Silent segments have no measurable loudness and are returned untouched.
pub fn normalize(segment: AudioSegment, target_dbfs: f32) -> AudioSegment {
    let measured = segment.dbfs();
    if !measured.is_finite() {
        debug!("Skipping normalization of silent segment");
        return segment;
    }
    segment.apply_gain(target_dbfs - measured)
}

/// Single-pole RC low-pass, run independently per channel
pub fn low_pass(segment: &AudioSegment, cutoff_hz: f32) -> AudioSegment {
    let rc = 1.0 / (cutoff_hz * 2.0 * std::f32::consts::PI);
    let dt = 1.0 / segment.sample_rate as f32;
    let alpha = dt / (rc + dt);

    let channels = segment.channels as usize;
    let input = &segment.samples;
    let mut out = input.clone();
    if input.len() < channels {
        return AudioSegment::new(out, segment.sample_rate, segment.channels);
    }

    let mut last: Vec<f32> = input[..channels].to_vec();
    for frame in 1..segment.frame_count() {
        for ch in 0..channels {
            let i = frame * channels + ch;
            last[ch] += alpha * (input[i] - last[ch]);
            out[i] = last[ch];
        }
    }

    AudioSegment::new(out, segment.sample_rate, segment.channels)
}

/// Single-pole RC high-pass, run independently per channel
pub fn high_pass(segment: &AudioSegment, cutoff_hz: f32) -> AudioSegment {
    let rc = 1.0 / (cutoff_hz * 2.0 * std::f32::consts::PI);
    let dt = 1.0 / segment.sample_rate as f32;
    let alpha = rc / (rc + dt);

    let channels = segment.channels as usize;
    let input = &segment.samples;
    let mut out = input.clone();
    if input.len() < channels {
        return AudioSegment::new(out, segment.sample_rate, segment.channels);
    }

    let mut last: Vec<f32> = input[..channels].to_vec();
    for frame in 1..segment.frame_count() {
        for ch in 0..channels {
            let i = frame * channels + ch;
            let prev = i - channels;
            last[ch] = alpha * (last[ch] + input[i] - input[prev]);
            out[i] = last[ch];
        }
    }

    AudioSegment::new(out, segment.sample_rate, segment.channels)
}

/// Layer gain-adjusted low and high bands on top of the full-band signal.
///
/// Nothing happens when both controls are zero. Otherwise both bands are
/// derived from the unprocessed mix and added back onto it.
#[instrument(skip(segment), fields(frames = segment.frame_count()))]
pub fn equalize(segment: AudioSegment, bass: f32, treble: f32) -> AudioSegment {
    if bass == 0.0 && treble == 0.0 {
        return segment;
    }

    let low = low_pass(&segment, LOW_CUTOFF_HZ).apply_gain(bass * EQ_DB_PER_UNIT);
    let high = high_pass(&segment, HIGH_CUTOFF_HZ).apply_gain(treble * EQ_DB_PER_UNIT);

    debug!(
        bass_db = bass * EQ_DB_PER_UNIT,
        treble_db = treble * EQ_DB_PER_UNIT,
        "Applying EQ bands"
    );

    let mut out = segment;
    out.overlay(&low);
    out.overlay(&high);
    out
}

/// Playback-rate factor for a shift in semitones
pub fn pitch_factor(semitones: f32) -> f64 {
    2f64.powf(semitones as f64 / 12.0)
}

/// Shift pitch by changing playback speed.
///
/// The segment is treated as if recorded at `rate * factor` and then
/// resampled back to its nominal rate, so pitch and duration move together.
/// Zero semitones returns the input untouched.
#[instrument(skip(segment), fields(frames = segment.frame_count()))]
pub fn pitch_shift(segment: AudioSegment, semitones: f32) -> Result<AudioSegment, AudioError> {
    if semitones == 0.0 {
        return Ok(segment);
    }

    let factor = pitch_factor(semitones);
    let samples = Resampler::resample_ratio(&segment.samples, segment.channels, 1.0 / factor)?;

    debug!(
        factor,
        input_frames = segment.frame_count(),
        output_frames = samples.len() / segment.channels.max(1) as usize,
        "Pitch shift complete"
    );

    Ok(AudioSegment::new(samples, segment.sample_rate, segment.channels))
}
