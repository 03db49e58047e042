use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::app::{AnalysisResult, PipelineResult, StudioConfig, StudioSettings};
use crate::audio::Mixer;
use crate::error::{MuseError, Result};
use crate::services::{Services, SessionSummary};

/// One memo to turn into a song
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub input_path: PathBuf,
    pub genre: String,
    pub studio: StudioConfig,
}

impl PipelineRequest {
    pub fn new(input_path: impl Into<PathBuf>, genre: impl Into<String>) -> Self {
        Self {
            input_path: input_path.into(),
            genre: genre.into(),
            studio: StudioConfig::default(),
        }
    }

    pub fn with_studio(mut self, studio: StudioConfig) -> Self {
        self.studio = studio;
        self
    }
}

/// Scratch and output files for a single run
struct RunFiles {
    instrumental: PathBuf,
    vocals: PathBuf,
    output: PathBuf,
}

impl RunFiles {
    fn new(work_dir: &Path, extension: &str) -> Self {
        let id = Uuid::new_v4().simple().to_string();
        Self {
            instrumental: work_dir.join(format!("instrumental_{}.wav", id)),
            vocals: work_dir.join(format!("vocals_{}.mp3", id)),
            output: work_dir.join(format!("song_{}.{}", id, extension)),
        }
    }
}

/// Orchestrates the external services and the mixer
pub struct Pipeline {
    services: Services,
    mixer: Mixer,
    work_dir: PathBuf,
}

impl Pipeline {
    pub fn new(services: Services, mixer: Mixer, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            services,
            mixer,
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Run every stage for one memo and return the rendered song
    #[instrument(skip(self, request), fields(input = ?request.input_path, genre = %request.genre))]
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineResult> {
        let studio = request.studio.resolve();
        let files = RunFiles::new(&self.work_dir, self.mixer.format().extension());

        // 1. Transcribe
        let transcript = self
            .services
            .transcriber
            .transcribe(&request.input_path)
            .await
            .map_err(MuseError::Transcription)?;
        info!(
            chars = transcript.chars().count(),
            "[1/6] Transcribed: {}",
            crate::services::truncate_chars(&transcript, 100)
        );

        // 2. Analyze
        let mut analysis = self
            .services
            .analyzer
            .analyze(&transcript, &request.genre)
            .await?;
        info!(
            mood = %analysis.mood,
            bpm = analysis.bpm,
            contains_lyrics = analysis.contains_lyrics,
            "[2/6] Analyzed"
        );

        // 3. Session memory
        let summary = SessionSummary::new(&transcript, &analysis, &request.genre);
        match self.services.session.store(&summary).await {
            Ok(()) => info!("[3/6] Session stored"),
            Err(e) => warn!(error = %e, "[3/6] Session memory skipped"),
        }

        // 4. Refine lyrics
        let lyrics_refined = self.refine_lyrics(&mut analysis, &request.genre).await;

        // 5. Instrumental and vocals together
        let (instrumental, vocals) = tokio::join!(
            self.services.instrumental.generate(
                &analysis.style_prompt,
                analysis.bpm,
                &files.instrumental
            ),
            self.generate_vocals(&analysis, &request.input_path, &files.vocals, &studio)
        );

        let instrumental = match instrumental {
            Ok(path) => path,
            Err(e) => {
                if let Some(vocals) = &vocals {
                    remove_quietly(vocals).await;
                }
                remove_quietly(&files.instrumental).await;
                return Err(MuseError::Instrumental(e));
            }
        };
        info!(vocals = vocals.is_some(), "[5/6] Audio generated");

        // 6. Mix
        let mixed = self
            .mixer
            .render(&instrumental, vocals.as_deref(), &studio, &files.output)
            .await;

        remove_quietly(&instrumental).await;
        if let Some(vocals) = &vocals {
            remove_quietly(vocals).await;
        }

        let mixed = match mixed {
            Ok(mixed) => mixed,
            Err(e) => {
                remove_quietly(&files.output).await;
                return Err(e.into());
            }
        };
        info!(path = ?mixed.path, duration_secs = mixed.duration_secs, "[6/6] Mixed");

        let genre = if analysis.detected_genre.trim().is_empty() {
            request.genre
        } else {
            analysis.detected_genre
        };

        Ok(PipelineResult {
            output_path: mixed.path,
            title: analysis.song_title,
            lyrics: analysis.cleaned_lyrics,
            mood: analysis.mood,
            bpm: analysis.bpm,
            genre,
            key: analysis.key,
            duration_secs: mixed.duration_secs,
            vocals_omitted: vocals.is_none(),
            lyrics_refined,
        })
    }

    /// Replace the lyrics with a refined version when one comes back
    async fn refine_lyrics(&self, analysis: &mut AnalysisResult, genre: &str) -> bool {
        match self
            .services
            .refiner
            .refine(&analysis.cleaned_lyrics, genre, &analysis.mood)
            .await
        {
            Ok(Some(refined)) if !refined.trim().is_empty() => {
                info!("[4/6] Lyrics refined");
                analysis.cleaned_lyrics = refined.trim().to_string();
                true
            }
            Ok(_) => {
                info!("[4/6] Refinement returned nothing, keeping lyrics");
                false
            }
            Err(e) => {
                warn!(error = %e, "[4/6] Refinement skipped");
                false
            }
        }
    }

    /// Sing the lyrics, or re-voice the memo when it had none.
    ///
    /// Failure is logged and yields `None`; any partial file is removed.
    async fn generate_vocals(
        &self,
        analysis: &AnalysisResult,
        input: &Path,
        output: &Path,
        studio: &StudioSettings,
    ) -> Option<PathBuf> {
        let voice = &self.services.voice;
        let result = if analysis.contains_lyrics {
            voice
                .synthesize(&analysis.cleaned_lyrics, output, &studio.voice)
                .await
        } else {
            voice.convert(input, output, studio.voice.voice_id()).await
        };

        match result {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(
                    error = %e,
                    contains_lyrics = analysis.contains_lyrics,
                    "Vocal generation failed, continuing instrumental only"
                );
                remove_quietly(output).await;
                None
            }
        }
    }
}

/// Delete a scratch file, ignoring any error
async fn remove_quietly(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        debug!(path = ?path, error = %e, "Scratch file not removed");
    }
}
