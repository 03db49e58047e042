mod backboard;
mod elevenlabs;
mod featherless;
mod gemini;
mod lyria;
mod whisper;

#[cfg(test)]
pub mod fakes;

pub use backboard::BackboardStore;
pub use elevenlabs::ElevenLabsVoice;
pub use featherless::FeatherlessRefiner;
pub use gemini::GeminiAnalyzer;
#[cfg(test)]
pub use gemini::parse_analysis;
pub use lyria::LyriaGenerator;
pub use whisper::WhisperTranscriber;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::app::{AnalysisResult, VoiceSettings};
use crate::error::{AnalysisError, ServiceError};

const USER_AGENT: &str = concat!("memomuse/", env!("CARGO_PKG_VERSION"));

/// Speech to text
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<String, ServiceError>;
}

/// Transcript to song metadata
#[async_trait]
pub trait SongAnalyzer: Send + Sync {
    async fn analyze(&self, transcript: &str, genre: &str) -> Result<AnalysisResult, AnalysisError>;
}

/// Optional lyric polishing; `None` means keep what you have
#[async_trait]
pub trait LyricRefiner: Send + Sync {
    async fn refine(
        &self,
        lyrics: &str,
        genre: &str,
        mood: &str,
    ) -> Result<Option<String>, ServiceError>;
}

/// Optional long-term memory of past sessions
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn store(&self, summary: &SessionSummary) -> Result<(), ServiceError>;
}

/// Style prompt to instrumental audio file
#[async_trait]
pub trait InstrumentalGenerator: Send + Sync {
    async fn generate(
        &self,
        style_prompt: &str,
        bpm: u32,
        output: &Path,
    ) -> Result<PathBuf, ServiceError>;
}

/// Vocal track generation
#[async_trait]
pub trait VoiceGenerator: Send + Sync {
    /// Sing/speak `lyrics` with the given voice settings
    async fn synthesize(
        &self,
        lyrics: &str,
        output: &Path,
        settings: &VoiceSettings,
    ) -> Result<PathBuf, ServiceError>;

    /// Re-voice a recording, keeping its melody and timing
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        voice_id: &str,
    ) -> Result<PathBuf, ServiceError>;
}

/// Longest excerpt of each free-text field kept in session memory
pub const SUMMARY_CHARS: usize = 200;

/// Condensed record of a session for the memory service
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSummary {
    pub transcript: String,
    pub lyrics: String,
    pub style_prompt: String,
    pub genre: String,
    pub mood: String,
}

impl SessionSummary {
    pub fn new(transcript: &str, analysis: &AnalysisResult, genre: &str) -> Self {
        Self {
            transcript: truncate_chars(transcript, SUMMARY_CHARS),
            lyrics: truncate_chars(&analysis.cleaned_lyrics, SUMMARY_CHARS),
            style_prompt: truncate_chars(&analysis.style_prompt, SUMMARY_CHARS),
            genre: genre.to_string(),
            mood: analysis.mood.clone(),
        }
    }
}

/// First `max` characters of `text`
pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

/// API keys and knobs for the concrete adapters
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub gemini_api_key: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub featherless_api_key: Option<String>,
    pub backboard_api_key: Option<String>,
    pub whisper_bin: String,
    pub whisper_model: String,
    pub instrumental_seconds: u32,
    pub scratch_dir: PathBuf,
}

/// Every collaborator the pipeline talks to
#[derive(Clone)]
pub struct Services {
    pub transcriber: Arc<dyn Transcriber>,
    pub analyzer: Arc<dyn SongAnalyzer>,
    pub refiner: Arc<dyn LyricRefiner>,
    pub session: Arc<dyn SessionStore>,
    pub instrumental: Arc<dyn InstrumentalGenerator>,
    pub voice: Arc<dyn VoiceGenerator>,
}

impl Services {
    /// Build the production adapters sharing one HTTP client
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            transcriber: Arc::new(WhisperTranscriber::new(
                &config.whisper_bin,
                &config.whisper_model,
                config.scratch_dir.clone(),
            )),
            analyzer: Arc::new(GeminiAnalyzer::new(
                client.clone(),
                config.gemini_api_key.clone(),
            )),
            refiner: Arc::new(FeatherlessRefiner::new(
                client.clone(),
                config.featherless_api_key.clone(),
            )),
            session: Arc::new(BackboardStore::new(
                client.clone(),
                config.backboard_api_key.clone(),
            )),
            instrumental: Arc::new(LyriaGenerator::new(
                config.gemini_api_key.clone(),
                config.instrumental_seconds,
            )),
            voice: Arc::new(ElevenLabsVoice::new(
                client,
                config.elevenlabs_api_key.clone(),
            )),
        })
    }
}

/// Fail with the standard error for a missing key
fn require_key<'a>(key: &'a Option<String>, name: &'static str) -> Result<&'a str, ServiceError> {
    key.as_deref()
        .filter(|k| !k.is_empty())
        .ok_or(ServiceError::MissingCredentials(name))
}

/// Turn a non-2xx response into an error carrying the body
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ServiceError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::HttpStatus {
        status,
        body: truncate_chars(&body, 500),
    })
}

/// Stream a response body to disk chunk by chunk
async fn write_body(response: reqwest::Response, output: &Path) -> Result<u64, ServiceError> {
    let mut file = tokio::fs::File::create(output).await?;
    let mut stream = response.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    if written == 0 {
        return Err(ServiceError::UnexpectedResponse("empty audio body".into()));
    }
    Ok(written)
}
