use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures::{future, SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, instrument, warn};

use crate::audio::{collect_frames, write_pcm16};
use crate::error::ServiceError;

use super::{require_key, InstrumentalGenerator};

const WS_URL: &str = "wss://generativelanguage.googleapis.com/ws/\
     google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateMusic";
const MODEL: &str = "models/lyria-realtime-exp";

/// Lyria streams 16-bit stereo PCM at 48kHz
pub const LYRIA_SAMPLE_RATE: u32 = 48_000;
pub const LYRIA_CHANNELS: u16 = 2;

const TEMPERATURE: f32 = 1.0;
const GUIDANCE: f32 = 3.5;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerMessage {
    setup_complete: Option<serde_json::Value>,
    server_content: Option<ServerContent>,
    filtered_prompt: Option<serde_json::Value>,
    warning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerContent {
    #[serde(default)]
    audio_chunks: Vec<AudioChunk>,
}

#[derive(Debug, Deserialize)]
struct AudioChunk {
    data: String,
}

/// Instrumental generation with Lyria realtime music
pub struct LyriaGenerator {
    api_key: Option<String>,
    url: String,
    target_seconds: u32,
}

impl LyriaGenerator {
    pub fn new(api_key: Option<String>, target_seconds: u32) -> Self {
        Self {
            api_key,
            url: WS_URL.to_string(),
            target_seconds,
        }
    }

    /// Point at a different websocket endpoint
    #[cfg(test)]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Frames to collect before the session is stopped
    pub fn target_frames(&self) -> usize {
        LYRIA_SAMPLE_RATE as usize * self.target_seconds as usize
    }
}

fn parse_server_message(raw: &[u8]) -> Result<ServerMessage, ServiceError> {
    Ok(serde_json::from_slice(raw)?)
}

/// Decode any PCM carried by one websocket message
fn audio_from_message(
    message: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Result<Option<Vec<u8>>, ServiceError> {
    let parsed = match message? {
        Message::Text(text) => parse_server_message(text.as_bytes())?,
        Message::Binary(bytes) => parse_server_message(&bytes)?,
        _ => return Ok(None),
    };

    if let Some(filtered) = parsed.filtered_prompt {
        warn!(prompt = %filtered, "Lyria filtered a prompt");
    }
    if let Some(warning) = parsed.warning {
        warn!(warning = %warning, "Lyria warning");
    }

    let Some(content) = parsed.server_content else {
        return Ok(None);
    };
    if content.audio_chunks.is_empty() {
        return Ok(None);
    }

    let mut pcm = Vec::new();
    for chunk in content.audio_chunks {
        let bytes = BASE64
            .decode(chunk.data.as_bytes())
            .map_err(|e| ServiceError::UnexpectedResponse(format!("bad audio chunk: {}", e)))?;
        pcm.extend_from_slice(&bytes);
    }
    Ok(Some(pcm))
}

#[async_trait]
impl InstrumentalGenerator for LyriaGenerator {
    #[instrument(skip(self, style_prompt))]
    async fn generate(
        &self,
        style_prompt: &str,
        bpm: u32,
        output: &Path,
    ) -> Result<PathBuf, ServiceError> {
        let key = require_key(&self.api_key, "GEMINI_API_KEY")?;
        let url = format!("{}?key={}", self.url, urlencoding::encode(key));

        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut sink, mut source) = socket.split();

        sink.send(Message::text(json!({ "setup": { "model": MODEL } }).to_string()))
            .await?;

        // Wait until the session is ready for prompts
        loop {
            match source.next().await {
                Some(message) => {
                    let raw = match message? {
                        Message::Text(text) => text.as_bytes().to_vec(),
                        Message::Binary(bytes) => bytes.to_vec(),
                        _ => continue,
                    };
                    if parse_server_message(&raw)?.setup_complete.is_some() {
                        break;
                    }
                }
                None => {
                    return Err(ServiceError::UnexpectedResponse(
                        "session closed before setup completed".into(),
                    ))
                }
            }
        }
        debug!("Lyria session ready");

        let control = [
            json!({ "clientContent": { "weightedPrompts": [{ "text": style_prompt, "weight": 1.0 }] } }),
            json!({ "musicGenerationConfig": { "bpm": bpm, "temperature": TEMPERATURE, "guidance": GUIDANCE } }),
            json!({ "playbackControl": "PLAY" }),
        ];
        for message in control {
            sink.send(Message::text(message.to_string())).await?;
        }

        let target = self.target_frames();
        let chunks = source.filter_map(|message| future::ready(audio_from_message(message).transpose()));
        let capture = collect_frames(chunks, target).await?;

        // Best-effort shutdown; the audio is already in hand
        let _ = sink
            .send(Message::text(json!({ "playbackControl": "STOP" }).to_string()))
            .await;
        let _ = sink.close().await;

        if capture.frames == 0 {
            return Err(ServiceError::UnexpectedResponse("no audio received".into()));
        }
        if capture.ended_early {
            warn!(frames = capture.frames, target, "Lyria stream ended before target");
        }

        let path = output.to_path_buf();
        let pcm = capture.bytes;
        tokio::task::spawn_blocking(move || {
            write_pcm16(&path, &pcm, LYRIA_SAMPLE_RATE, LYRIA_CHANNELS)
        })
        .await
        .map_err(|e| ServiceError::UnexpectedResponse(format!("writer task failed: {}", e)))??;

        info!(
            frames = capture.frames,
            secs = capture.frames as f32 / LYRIA_SAMPLE_RATE as f32,
            "Instrumental captured"
        );
        Ok(output.to_path_buf())
    }
}
