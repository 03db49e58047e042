use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::app::AnalysisResult;
use crate::error::{AnalysisError, ServiceError};

use super::{check_status, require_key, SongAnalyzer};

const BASE_URL: &str = "https://generativelanguage.googleapis.com";
const MODEL: &str = "gemini-2.0-flash-001";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text of the first candidate
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        Some(text).filter(|t| !t.trim().is_empty())
    }
}

/// Song analysis with Gemini
pub struct GeminiAnalyzer {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl GeminiAnalyzer {
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

    async fn generate(&self, prompt: &str) -> Result<String, ServiceError> {
        let key = require_key(&self.api_key, "GEMINI_API_KEY")?;
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url,
            MODEL,
            urlencoding::encode(key)
        );

        let body = GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
        };

        let response = self.client.post(&url).json(&body).send().await?;
        let response: GenerateResponse = check_status(response).await?.json().await?;

        response
            .text()
            .ok_or_else(|| ServiceError::UnexpectedResponse("no candidate text".into()))
    }
}

/// Prompt asking for strict JSON song metadata
pub fn analysis_prompt(transcript: &str, genre: &str) -> String {
    format!(
        r#"You are a music producer AI assistant.

A musician recorded a rough voice memo. Transcription:
"{transcript}"

Genre: {genre}

Decide whether the memo contains real words (lyrics) or only wordless
vocalizing such as humming, "la la", "hmm" or scatting.

Respond with ONLY valid JSON (no markdown):

{{
  "contains_lyrics": true,
  "song_title": "short evocative title",
  "cleaned_lyrics": "polished singable version (1 verse + chorus max, short for 30s track); empty if no lyrics",
  "style_prompt": "detailed music generation prompt (genre, tempo BPM, mood, instruments, energy)",
  "detected_genre": "refined genre suggestion",
  "mood": "one word (e.g. melancholic, upbeat, nostalgic)",
  "bpm": 120,
  "key": "C minor"
}}"#
    )
}

/// Strip a surrounding markdown code fence (with or without a language tag)
pub fn unwrap_code_fence(text: &str) -> &str {
    let text = text.trim();
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    let inner = rest.split("```").next().unwrap_or(rest);
    let inner = match inner.get(..4) {
        Some(tag) if tag.eq_ignore_ascii_case("json") => &inner[4..],
        _ => inner,
    };
    inner.trim()
}

/// Decode model output into an analysis, rejecting anything malformed
pub fn parse_analysis(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let analysis: AnalysisResult =
        serde_json::from_str(unwrap_code_fence(text)).map_err(AnalysisError::Parse)?;

    if analysis.style_prompt.trim().is_empty() {
        return Err(AnalysisError::MissingField("style_prompt"));
    }
    Ok(analysis)
}

#[async_trait]
impl SongAnalyzer for GeminiAnalyzer {
    #[instrument(skip(self, transcript), fields(transcript_chars = transcript.len()))]
    async fn analyze(&self, transcript: &str, genre: &str) -> Result<AnalysisResult, AnalysisError> {
        let text = self.generate(&analysis_prompt(transcript, genre)).await?;
        debug!(chars = text.len(), "Analysis response received");
        parse_analysis(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::spawn_mock;
    use axum::{routing::post, Json, Router};

    const SAMPLE: &str = r#"{
        "contains_lyrics": true,
        "cleaned_lyrics": "Walking down the road today\nFeeling like I found my way",
        "style_prompt": "upbeat pop, 120 BPM, major key, acoustic guitar, light drums",
        "detected_genre": "indie pop",
        "mood": "upbeat",
        "bpm": 120,
        "key": "C major"
    }"#;

    #[test]
    fn test_parses_clean_json() {
        let analysis = parse_analysis(SAMPLE).unwrap();
        assert!(analysis.contains_lyrics);
        assert_eq!(analysis.mood, "upbeat");
        assert_eq!(analysis.bpm, 120);
        assert_eq!(analysis.detected_genre, "indie pop");
    }

    #[test]
    fn test_strips_json_fence() {
        let wrapped = format!("```json\n{}\n```", SAMPLE);
        assert_eq!(parse_analysis(&wrapped).unwrap().bpm, 120);
    }

    #[test]
    fn test_strips_plain_fence_and_whitespace() {
        let wrapped = format!("  \n```\n{}\n```\n ", SAMPLE);
        assert_eq!(parse_analysis(&wrapped).unwrap().mood, "upbeat");
        assert_eq!(unwrap_code_fence("  {}  "), "{}");
    }

    #[test]
    fn test_humming_flag() {
        let json = r#"{"contains_lyrics": false, "cleaned_lyrics": "", "style_prompt": "jazz smooth 90bpm", "bpm": 90}"#;
        let analysis = parse_analysis(json).unwrap();
        assert!(!analysis.contains_lyrics);
        assert!(analysis.cleaned_lyrics.is_empty());
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = parse_analysis("This is not JSON").unwrap_err();
        assert!(matches!(err, AnalysisError::Parse(_)));
    }

    #[test]
    fn test_blank_style_prompt_rejected() {
        let err = parse_analysis(r#"{"style_prompt": "  "}"#).unwrap_err();
        assert!(matches!(err, AnalysisError::MissingField("style_prompt")));
    }

    #[test]
    fn test_prompt_mentions_inputs() {
        let prompt = analysis_prompt("la la la", "jazz");
        assert!(prompt.contains("\"la la la\""));
        assert!(prompt.contains("Genre: jazz"));
        assert!(prompt.contains("contains_lyrics"));
    }

    #[tokio::test]
    async fn test_missing_key_fails_fast() {
        let analyzer = GeminiAnalyzer::new(Client::new(), None);
        let err = analyzer.analyze("hi", "pop").await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Service(ServiceError::MissingCredentials("GEMINI_API_KEY"))
        ));
    }

    #[tokio::test]
    async fn test_round_trip_against_mock() {
        let fenced = format!("```json\n{}\n```", SAMPLE);
        let router = Router::new().route(
            "/v1beta/models/:call",
            post(move || {
                let fenced = fenced.clone();
                async move {
                    Json(serde_json::json!({
                        "candidates": [{"content": {"parts": [{"text": fenced}]}}]
                    }))
                }
            }),
        );
        let base = spawn_mock(router).await;

        let analyzer = GeminiAnalyzer::new(Client::new(), Some("key".into())).with_base_url(base);
        let analysis = analyzer.analyze("walking down the road", "pop").await.unwrap();
        assert_eq!(analysis.key, "C major");
    }

    #[tokio::test]
    async fn test_http_error_is_service_error() {
        let router = Router::new().route(
            "/v1beta/models/:call",
            post(|| async { (axum::http::StatusCode::FORBIDDEN, "denied") }),
        );
        let base = spawn_mock(router).await;

        let analyzer = GeminiAnalyzer::new(Client::new(), Some("key".into())).with_base_url(base);
        let err = analyzer.analyze("x", "pop").await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Service(ServiceError::HttpStatus { .. })
        ));
    }
}
