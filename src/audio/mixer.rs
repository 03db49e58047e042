use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument};

use crate::app::StudioSettings;
use crate::error::AudioError;

use super::effects::{equalize, normalize, pitch_shift};
use super::segment::AudioSegment;
use super::{load, render, OutputFormat};

/// Reference loudness both tracks are normalized to before balancing
pub const TARGET_DBFS: f32 = -20.0;

/// Gain added to the vocal after normalization
pub const BASE_VOCAL_BOOST_DB: f32 = 6.0;

/// Gain removed from the instrumental after normalization
pub const BASE_INSTRUMENTAL_CUT_DB: f32 = 6.0;

/// A rendered song on disk
#[derive(Debug, Clone)]
pub struct MixOutput {
    pub path: PathBuf,
    pub duration_secs: f32,
}

/// Combines an instrumental and an optional vocal into a finished track
#[derive(Debug, Clone, Copy)]
pub struct Mixer {
    format: OutputFormat,
}

impl Mixer {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Decode, mix, post-process and render to `output`
    #[instrument(skip(self, studio))]
    pub async fn render(
        &self,
        instrumental: &Path,
        vocal: Option<&Path>,
        studio: &StudioSettings,
        output: &Path,
    ) -> Result<MixOutput, AudioError> {
        let instrumental = load(instrumental).await?;
        let vocal = match vocal {
            Some(path) => Some(load(path).await?),
            None => None,
        };

        debug!(
            instrumental_secs = instrumental.duration_secs(),
            vocal_secs = vocal.as_ref().map(|v| v.duration_secs()),
            "Tracks decoded"
        );

        let studio = studio.clone();
        let mixed =
            tokio::task::spawn_blocking(move || mix_tracks(instrumental, vocal, &studio)).await??;

        let duration_secs = render(mixed, output, self.format).await?;
        info!(path = ?output, duration_secs, "Final mix rendered");

        Ok(MixOutput {
            path: output.to_path_buf(),
            duration_secs,
        })
    }
}

/// Mix and post-process decoded tracks.
///
/// With a vocal, both tracks are normalized, balanced, and the vocal is laid
/// over the instrumental from the start, never extending past it. Without a
/// vocal the instrumental passes through as-is. EQ and pitch shift follow.
pub fn mix_tracks(
    instrumental: AudioSegment,
    vocal: Option<AudioSegment>,
    studio: &StudioSettings,
) -> Result<AudioSegment, AudioError> {
    let mut mixed = match vocal {
        Some(vocal) => {
            let instrumental = normalize(instrumental, TARGET_DBFS)
                .apply_gain(-(BASE_INSTRUMENTAL_CUT_DB - studio.vocal_balance));

            let mut vocal = normalize(vocal.conform_to(&instrumental)?, TARGET_DBFS)
                .apply_gain(BASE_VOCAL_BOOST_DB + studio.vocal_balance);

            if vocal.frame_count() > instrumental.frame_count() {
                vocal.truncate_frames(instrumental.frame_count());
            }

            let mut base = instrumental;
            base.overlay(&vocal);
            base
        }
        None => instrumental,
    };

    mixed = equalize(mixed, studio.bass, studio.treble);
    pitch_shift(mixed, studio.pitch)
}
