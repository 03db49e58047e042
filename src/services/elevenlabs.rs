use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::app::VoiceSettings;
use crate::error::ServiceError;

use super::{check_status, require_key, write_body, VoiceGenerator};

const BASE_URL: &str = "https://api.elevenlabs.io/v1";
const TTS_MODEL: &str = "eleven_multilingual_v2";
const STS_MODEL: &str = "eleven_multilingual_sts_v2";

#[derive(Debug, Serialize)]
struct TextToSpeechRequest<'a> {
    text: &'a str,
    model_id: &'static str,
    voice_settings: VoiceSettingsBody,
}

#[derive(Debug, Serialize)]
struct VoiceSettingsBody {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl From<&VoiceSettings> for VoiceSettingsBody {
    fn from(settings: &VoiceSettings) -> Self {
        Self {
            stability: settings.stability,
            similarity_boost: settings.similarity,
            style: settings.style,
            use_speaker_boost: true,
        }
    }
}

/// Vocals from ElevenLabs text-to-speech and speech-to-speech
pub struct ElevenLabsVoice {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl ElevenLabsVoice {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
        }
    }

    /// Point at a different API host
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl VoiceGenerator for ElevenLabsVoice {
    #[instrument(skip(self, lyrics, settings), fields(voice_id = settings.voice_id()))]
    async fn synthesize(
        &self,
        lyrics: &str,
        output: &Path,
        settings: &VoiceSettings,
    ) -> Result<PathBuf, ServiceError> {
        let key = require_key(&self.api_key, "ELEVENLABS_API_KEY")?;
        let url = format!("{}/text-to-speech/{}", self.base_url, settings.voice_id());

        let body = TextToSpeechRequest {
            text: lyrics,
            model_id: TTS_MODEL,
            voice_settings: settings.into(),
        };

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body)
            .send()
            .await?;

        let written = write_body(check_status(response).await?, output).await?;
        debug!(bytes = written, "Speech synthesized");
        Ok(output.to_path_buf())
    }

    #[instrument(skip(self))]
    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        voice_id: &str,
    ) -> Result<PathBuf, ServiceError> {
        let key = require_key(&self.api_key, "ELEVENLABS_API_KEY")?;
        let url = format!("{}/speech-to-speech/{}", self.base_url, voice_id);

        let audio = tokio::fs::read(input).await?;
        let file_name = input
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "recording".to_string());

        let form = Form::new()
            .part("audio", Part::bytes(audio).file_name(file_name))
            .text("model_id", STS_MODEL);

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .multipart(form)
            .send()
            .await?;

        let written = write_body(check_status(response).await?, output).await?;
        debug!(bytes = written, "Speech converted");
        Ok(output.to_path_buf())
    }
}
