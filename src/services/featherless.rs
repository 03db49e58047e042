use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::error::ServiceError;

use super::{require_key, LyricRefiner};

const BASE_URL: &str = "https://api.featherless.ai/v1";
const MODEL: &str = "Qwen/Qwen2.5-7B-Instruct";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

const SYSTEM_PROMPT: &str = "You are a professional songwriter. Refine lyrics to be singable \
     and genre-appropriate. 4-8 lines max. Return ONLY refined lyrics.";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage; 2],
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Lyric polishing through Featherless' OpenAI-compatible API
pub struct FeatherlessRefiner {
    client: Client,
    api_key: Option<String>,
    base_url: String,
}

impl FeatherlessRefiner {
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

fn user_prompt(lyrics: &str, genre: &str, mood: &str) -> String {
    format!("Genre: {genre}\nMood: {mood}\n\nOriginal:\n{lyrics}\n\nRefined:")
}

#[async_trait]
impl LyricRefiner for FeatherlessRefiner {
    #[instrument(skip(self, lyrics))]
    async fn refine(
        &self,
        lyrics: &str,
        genre: &str,
        mood: &str,
    ) -> Result<Option<String>, ServiceError> {
        let key = require_key(&self.api_key, "FEATHERLESS_API_KEY")?;

        let body = ChatRequest {
            model: MODEL,
            messages: [
                ChatMessage {
                    role: "system".into(),
                    content: SYSTEM_PROMPT.into(),
                },
                ChatMessage {
                    role: "user".into(),
                    content: user_prompt(lyrics, genre, mood),
                },
            ],
            max_tokens: 200,
            temperature: 0.7,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(key)
            .timeout(REQUEST_TIMEOUT)
            .json(&body)
            .send()
            .await?;

        // Any non-2xx answer means "keep the original"
        if !response.status().is_success() {
            debug!(status = %response.status(), "Refinement declined");
            return Ok(None);
        }

        let response: ChatResponse = response.json().await?;
        let refined = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content.trim().to_string())
            .filter(|c| !c.is_empty());

        debug!(refined = refined.is_some(), "Refinement complete");
        Ok(refined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::fakes::spawn_mock;
    use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
    use parking_lot::Mutex;
    use std::sync::Arc;

    type Captured = Arc<Mutex<Option<serde_json::Value>>>;

    async fn mock(status: StatusCode, content: &'static str) -> (String, Captured) {
        let captured: Captured = Arc::new(Mutex::new(None));
        let router = Router::new()
            .route(
                "/chat/completions",
                post(
                    move |State(captured): State<Captured>, Json(body): Json<serde_json::Value>| async move {
                        *captured.lock() = Some(body);
                        (
                            status,
                            Json(serde_json::json!({
                                "choices": [{"message": {"role": "assistant", "content": content}}]
                            })),
                        )
                    },
                ),
            )
            .with_state(Arc::clone(&captured));
        (spawn_mock(router).await, captured)
    }

    #[tokio::test]
    async fn test_successful_refinement_is_trimmed() {
        let (base, _) = mock(StatusCode::OK, "  Refined lyrics here  ").await;
        let refiner = FeatherlessRefiner::new(Client::new(), Some("k".into())).with_base_url(base);

        let refined = refiner.refine("rough lyrics", "pop", "upbeat").await.unwrap();
        assert_eq!(refined.as_deref(), Some("Refined lyrics here"));
    }

    #[tokio::test]
    async fn test_error_status_returns_none() {
        for status in [
            StatusCode::INTERNAL_SERVER_ERROR,
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::UNAUTHORIZED,
        ] {
            let (base, _) = mock(status, "ignored").await;
            let refiner =
                FeatherlessRefiner::new(Client::new(), Some("k".into())).with_base_url(base);
            assert_eq!(refiner.refine("x", "pop", "happy").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_blank_content_returns_none() {
        let (base, _) = mock(StatusCode::OK, "   ").await;
        let refiner = FeatherlessRefiner::new(Client::new(), Some("k".into())).with_base_url(base);
        assert_eq!(refiner.refine("x", "pop", "happy").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_payload_carries_model_and_context() {
        let (base, captured) = mock(StatusCode::OK, "refined").await;
        let refiner = FeatherlessRefiner::new(Client::new(), Some("k".into())).with_base_url(base);
        refiner
            .refine("walking down the street", "hip hop", "melancholic")
            .await
            .unwrap();

        let body = captured.lock().clone().unwrap();
        assert_eq!(body["model"], MODEL);
        assert_eq!(body["max_tokens"], 200);
        let user = body["messages"][1]["content"].as_str().unwrap();
        assert!(user.contains("hip hop"));
        assert!(user.contains("melancholic"));
        assert!(user.contains("walking down the street"));
    }

    #[tokio::test]
    async fn test_connection_failure_is_error() {
        // Nothing listens on port 9 locally
        let refiner = FeatherlessRefiner::new(Client::new(), Some("k".into()))
            .with_base_url("http://127.0.0.1:9");
        assert!(refiner.refine("x", "pop", "happy").await.is_err());
    }
}
