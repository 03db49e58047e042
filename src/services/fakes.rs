use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::net::TcpListener;

use crate::app::{AnalysisResult, VoiceSettings};
use crate::audio::{write_wav, AudioSegment, CHANNELS, SAMPLE_RATE};
use crate::error::{AnalysisError, ServiceError};

use super::{
    InstrumentalGenerator, LyricRefiner, Services, SessionStore, SessionSummary, SongAnalyzer,
    Transcriber, VoiceGenerator,
};

/// Serve `router` on an ephemeral local port and return its base URL
pub async fn spawn_mock(router: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn failure(what: &str) -> ServiceError {
    ServiceError::UnexpectedResponse(format!("{} unavailable", what))
}

/// A sine tone, loud enough to have a finite loudness
pub fn tone(frames: usize, sample_rate: u32, channels: u16) -> AudioSegment {
    let samples = (0..frames)
        .flat_map(|i| {
            let v = (i as f32 * 440.0 * std::f32::consts::TAU / sample_rate as f32).sin() * 0.5;
            std::iter::repeat(v).take(channels as usize)
        })
        .collect();
    AudioSegment::new(samples, sample_rate, channels)
}

pub struct FakeTranscriber {
    pub transcript: String,
    pub fail: bool,
    pub calls: Mutex<Vec<PathBuf>>,
}

impl FakeTranscriber {
    pub fn new(transcript: &str) -> Self {
        Self {
            transcript: transcript.to_string(),
            fail: false,
            calls: Mutex::default(),
        }
    }
}

#[async_trait]
impl Transcriber for FakeTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<String, ServiceError> {
        self.calls.lock().push(audio.to_path_buf());
        if self.fail {
            return Err(failure("transcription"));
        }
        Ok(self.transcript.clone())
    }
}

pub struct FakeAnalyzer {
    pub response: String,
    pub calls: Mutex<Vec<(String, String)>>,
}

impl FakeAnalyzer {
    /// Answers every request with `response` run through the real parser
    pub fn new(response: &str) -> Self {
        Self {
            response: response.to_string(),
            calls: Mutex::default(),
        }
    }
}

#[async_trait]
impl SongAnalyzer for FakeAnalyzer {
    async fn analyze(&self, transcript: &str, genre: &str) -> Result<AnalysisResult, AnalysisError> {
        self.calls
            .lock()
            .push((transcript.to_string(), genre.to_string()));
        super::parse_analysis(&self.response)
    }
}

/// What the refiner should do when called
pub enum Refinement {
    Returns(Option<String>),
    Fails,
}

pub struct FakeRefiner {
    pub behavior: Refinement,
    pub calls: Mutex<Vec<(String, String, String)>>,
}

impl FakeRefiner {
    pub fn new(behavior: Refinement) -> Self {
        Self {
            behavior,
            calls: Mutex::default(),
        }
    }
}

#[async_trait]
impl LyricRefiner for FakeRefiner {
    async fn refine(
        &self,
        lyrics: &str,
        genre: &str,
        mood: &str,
    ) -> Result<Option<String>, ServiceError> {
        self.calls
            .lock()
            .push((lyrics.to_string(), genre.to_string(), mood.to_string()));
        match &self.behavior {
            Refinement::Returns(value) => Ok(value.clone()),
            Refinement::Fails => Err(failure("refinement")),
        }
    }
}

#[derive(Default)]
pub struct FakeSessionStore {
    pub fail: bool,
    pub stored: Mutex<Vec<SessionSummary>>,
}

#[async_trait]
impl SessionStore for FakeSessionStore {
    async fn store(&self, summary: &SessionSummary) -> Result<(), ServiceError> {
        self.stored.lock().push(summary.clone());
        if self.fail {
            return Err(ServiceError::MissingCredentials("BACKBOARD_API_KEY"));
        }
        Ok(())
    }
}

/// Writes a stereo 48kHz tone of `seconds`
pub struct FakeInstrumental {
    pub seconds: f32,
    pub fail: bool,
    /// Write a WAV header with no readable body
    pub corrupt: bool,
    pub calls: Mutex<Vec<(String, u32)>>,
}

impl Default for FakeInstrumental {
    fn default() -> Self {
        Self {
            seconds: 1.0,
            fail: false,
            corrupt: false,
            calls: Mutex::default(),
        }
    }
}

#[async_trait]
impl InstrumentalGenerator for FakeInstrumental {
    async fn generate(
        &self,
        style_prompt: &str,
        bpm: u32,
        output: &Path,
    ) -> Result<PathBuf, ServiceError> {
        self.calls.lock().push((style_prompt.to_string(), bpm));
        if self.fail {
            return Err(failure("instrumental"));
        }
        if self.corrupt {
            std::fs::write(output, b"RIFF\0\0\0\0WAVEjunk")?;
            return Ok(output.to_path_buf());
        }
        let frames = (self.seconds * SAMPLE_RATE as f32) as usize;
        write_wav(output, &tone(frames, SAMPLE_RATE, CHANNELS))?;
        Ok(output.to_path_buf())
    }
}

/// Writes a mono 22.05kHz tone, longer than the default instrumental
pub struct FakeVoice {
    pub seconds: f32,
    pub fail: bool,
    /// Write a partial file before failing
    pub leave_partial: bool,
    pub synthesized: Mutex<Vec<(String, VoiceSettings)>>,
    pub converted: Mutex<Vec<(PathBuf, String)>>,
    pub outputs: Mutex<Vec<PathBuf>>,
}

impl Default for FakeVoice {
    fn default() -> Self {
        Self {
            seconds: 2.0,
            fail: false,
            leave_partial: false,
            synthesized: Mutex::default(),
            converted: Mutex::default(),
            outputs: Mutex::default(),
        }
    }
}

impl FakeVoice {
    fn produce(&self, output: &Path) -> Result<PathBuf, ServiceError> {
        self.outputs.lock().push(output.to_path_buf());
        if self.fail {
            if self.leave_partial {
                std::fs::write(output, b"partial")?;
            }
            return Err(failure("voice"));
        }
        let frames = (self.seconds * 22_050.0) as usize;
        write_wav(output, &tone(frames, 22_050, 1))?;
        Ok(output.to_path_buf())
    }
}

#[async_trait]
impl VoiceGenerator for FakeVoice {
    async fn synthesize(
        &self,
        lyrics: &str,
        output: &Path,
        settings: &VoiceSettings,
    ) -> Result<PathBuf, ServiceError> {
        self.synthesized
            .lock()
            .push((lyrics.to_string(), settings.clone()));
        self.produce(output)
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        voice_id: &str,
    ) -> Result<PathBuf, ServiceError> {
        self.converted
            .lock()
            .push((input.to_path_buf(), voice_id.to_string()));
        self.produce(output)
    }
}

/// Typed handles to every fake behind a `Services`
pub struct Fakes {
    pub transcriber: Arc<FakeTranscriber>,
    pub analyzer: Arc<FakeAnalyzer>,
    pub refiner: Arc<FakeRefiner>,
    pub session: Arc<FakeSessionStore>,
    pub instrumental: Arc<FakeInstrumental>,
    pub voice: Arc<FakeVoice>,
}

impl Fakes {
    /// Fakes for a transcript and analysis reply; refinement returns nothing
    pub fn new(transcript: &str, analysis: &str) -> Self {
        Self {
            transcriber: Arc::new(FakeTranscriber::new(transcript)),
            analyzer: Arc::new(FakeAnalyzer::new(analysis)),
            refiner: Arc::new(FakeRefiner::new(Refinement::Returns(None))),
            session: Arc::default(),
            instrumental: Arc::default(),
            voice: Arc::default(),
        }
    }

    pub fn services(&self) -> Services {
        Services {
            transcriber: self.transcriber.clone(),
            analyzer: self.analyzer.clone(),
            refiner: self.refiner.clone(),
            session: self.session.clone(),
            instrumental: self.instrumental.clone(),
            voice: self.voice.clone(),
        }
    }
}
