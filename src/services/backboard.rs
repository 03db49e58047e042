use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, info, instrument};

use crate::error::ServiceError;

use super::{check_status, require_key, SessionStore, SessionSummary};

const BASE_URL: &str = "https://app.backboard.io/api";
const ASSISTANT_NAME: &str = "MemoMuse Music Producer";
const ASSISTANT_PROMPT: &str = "You are a music production assistant. Remember user \
     preferences and musical style choices.";

#[derive(Debug, Deserialize)]
struct AssistantCreated {
    assistant_id: String,
}

#[derive(Debug, Deserialize)]
struct ThreadCreated {
    thread_id: String,
}

/// Session memory on Backboard.
///
/// One assistant and one thread are created per process on first use and
/// reused for every later session.
pub struct BackboardStore {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    assistant_id: OnceCell<String>,
    thread_id: OnceCell<String>,
}

impl BackboardStore {
    pub fn new(client: Client, api_key: Option<String>) -> Self {
        Self {
            client,
            api_key,
            base_url: BASE_URL.to_string(),
            assistant_id: OnceCell::new(),
            thread_id: OnceCell::new(),
        }
    }

    /// Point at a different API host
    #[cfg(test)]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn post<T: DeserializeOwned>(
        &self,
        key: &str,
        path: &str,
        body: serde_json::Value,
    ) -> Result<T, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(url, "Posting");

        let response = self.client.post(&url).bearer_auth(key).json(&body).send().await?;
        Ok(check_status(response).await?.json().await?)
    }

    async fn thread(&self, key: &str) -> Result<&str, ServiceError> {
        let assistant_id = self
            .assistant_id
            .get_or_try_init(|| async {
                let created: AssistantCreated = self
                    .post(
                        key,
                        "/assistants",
                        json!({
                            "name": ASSISTANT_NAME,
                            "system_prompt": ASSISTANT_PROMPT,
                            "llm_provider": "google",
                            "llm_model_name": "gemini-2.0-flash",
                        }),
                    )
                    .await?;
                info!(assistant_id = %created.assistant_id, "Created Backboard assistant");
                Ok::<_, ServiceError>(created.assistant_id)
            })
            .await?;

        let thread_id = self
            .thread_id
            .get_or_try_init(|| async {
                let created: ThreadCreated = self
                    .post(key, "/threads", json!({ "assistant_id": assistant_id }))
                    .await?;
                info!(thread_id = %created.thread_id, "Created Backboard thread");
                Ok::<_, ServiceError>(created.thread_id)
            })
            .await?;

        Ok(thread_id)
    }
}

/// Message body recorded for one session
pub fn context_message(summary: &SessionSummary) -> String {
    format!(
        "Voice memo. Genre: {}, Mood: {}. Transcript: {}. Lyrics: {}. Prompt: {}.",
        summary.genre, summary.mood, summary.transcript, summary.lyrics, summary.style_prompt
    )
}

#[async_trait]
impl SessionStore for BackboardStore {
    #[instrument(skip(self, summary))]
    async fn store(&self, summary: &SessionSummary) -> Result<(), ServiceError> {
        let key = require_key(&self.api_key, "BACKBOARD_API_KEY")?;
        let thread_id = self.thread(key).await?;

        let _: serde_json::Value = self
            .post(
                key,
                &format!("/threads/{}/messages", thread_id),
                json!({ "content": context_message(summary), "memory": "Auto" }),
            )
            .await?;

        debug!(thread_id, "Session stored");
        Ok(())
    }
}
